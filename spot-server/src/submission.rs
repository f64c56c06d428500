//! Anonymous submission workflow
//!
//! 1. [`AnonymousIntake::start`] validates the draft, opens a verification
//!    session and emails the code.
//! 2. [`AnonymousIntake::finalize`] consumes the session, resolves the
//!    reporter to a citizen identity, creates the issue in the anonymous
//!    zone and emails the ticket id.
//!
//! Email failures never undo a committed step; they come back as warnings.

use shared::error::Warning;
use shared::models::{AnonymousDraft, IssueCreate, OtpSent, SubmissionReceipt};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::identity::{IdentityResolver, is_valid_email};
use crate::lifecycle::IssueLifecycleManager;
use crate::notify::NotificationDispatcher;
use crate::verification::VerificationSessionStore;

/// Length of a title derived from the description
const DERIVED_TITLE_CHARS: usize = 50;

/// Stands in for the photo, which only arrives with the code
const IMAGE_NOT_YET_UPLOADED: &str = "uploads/pending";

pub struct AnonymousIntake {
    sessions: Arc<VerificationSessionStore>,
    identities: Arc<IdentityResolver>,
    lifecycle: Arc<IssueLifecycleManager>,
    notifier: NotificationDispatcher,
    zone: String,
}

impl AnonymousIntake {
    pub fn new(
        sessions: Arc<VerificationSessionStore>,
        identities: Arc<IdentityResolver>,
        lifecycle: Arc<IssueLifecycleManager>,
        notifier: NotificationDispatcher,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            identities,
            lifecycle,
            notifier,
            zone: zone.into(),
        }
    }

    /// Open a session for `draft` and send its code
    ///
    /// The draft goes through the same checks as `create`, in the anonymous
    /// zone, so a bad report fails before the reporter is asked for a code.
    pub async fn start(&self, draft: AnonymousDraft) -> CoreResult<(OtpSent, Vec<Warning>)> {
        check_draft(&draft)?;
        self.lifecycle.check(&to_payload(
            draft.clone(),
            self.zone.clone(),
            IMAGE_NOT_YET_UPLOADED.to_string(),
        ))?;
        let email = draft.contact.email.clone();

        let opened = self.sessions.open(draft);
        let warnings: Vec<Warning> = self
            .notifier
            .verification_code(&email, &opened.code)
            .await
            .into_iter()
            .collect();

        Ok((
            OtpSent {
                session_id: opened.session_id,
                expires_at: opened.expires_at,
            },
            warnings,
        ))
    }

    /// Turn a verified session into a durable issue
    pub async fn finalize(
        &self,
        session_id: &str,
        code: &str,
        issue_image_ref: String,
    ) -> CoreResult<(SubmissionReceipt, Vec<Warning>)> {
        let draft = self.sessions.verify_and_consume(session_id, code)?;
        let email = draft.contact.email.clone();

        // Credential hashing and redb writes block; keep them off the reactor
        let identities = self.identities.clone();
        let lifecycle = self.lifecycle.clone();
        let zone = self.zone.clone();
        let issue = tokio::task::spawn_blocking(move || {
            let contact = draft.contact.clone();
            let payload = to_payload(draft, zone, issue_image_ref);
            lifecycle.check(&payload)?;
            let reporter = identities.resolve(&contact)?;
            lifecycle.create(payload, &reporter.id)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("submission task failed: {e}")))??;

        let warnings: Vec<Warning> = self
            .notifier
            .ticket_id(&email, &issue.ticket_id)
            .await
            .into_iter()
            .collect();

        Ok((
            SubmissionReceipt {
                ticket_id: issue.ticket_id,
                status: issue.status,
            },
            warnings,
        ))
    }
}

/// Checks `create` cannot make: the contact email, and a description to
/// derive the title from
fn check_draft(draft: &AnonymousDraft) -> CoreResult<()> {
    if !is_valid_email(draft.contact.email.trim()) {
        return Err(CoreError::validation("A valid reporter email is required"));
    }
    if draft.description.trim().is_empty() {
        return Err(CoreError::validation("Description is required"));
    }
    Ok(())
}

fn to_payload(draft: AnonymousDraft, zone: String, issue_image_ref: String) -> IssueCreate {
    let title = draft
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| draft.description.trim().chars().take(DERIVED_TITLE_CHARS).collect());

    IssueCreate {
        issue_type: Some(draft.issue_type),
        title,
        description: draft.description,
        lat: draft.lat,
        lng: draft.lng,
        zone,
        issue_image_ref: Some(issue_image_ref),
        client_request_id: None,
    }
}
