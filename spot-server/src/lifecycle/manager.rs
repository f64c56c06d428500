//! Issue lifecycle manager
//!
//! Owns issue creation and every status change. Each change is one
//! read-modify-write inside a storage write transaction: authorization,
//! the transition table and the resolution-image rule are all evaluated
//! against the committed record, and a rejected change leaves it untouched.

use shared::models::{
    Issue, IssueCreate, IssueStatus, IssueSummary, IssueType, Location, Role,
};
use std::sync::Arc;

use super::actor::Actor;
use crate::clock::{SharedClock, format_date};
use crate::error::{CoreError, CoreResult};
use crate::identity::normalize_email;
use crate::storage::{InsertOutcome, Storage, StorageError};
use crate::ticket::TicketIdGenerator;

/// Ticket id allocation attempts before giving up
const MAX_TICKET_ATTEMPTS: usize = 5;

/// Pending issues older than this lead the authority dashboard
const OVERDUE_AFTER_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Extra data carried by a status change
#[derive(Debug, Clone, Default)]
pub struct TransitionExtra {
    pub resolution_image_ref: Option<String>,
    pub resolution_notes: Option<String>,
}

pub struct IssueLifecycleManager {
    storage: Storage,
    tickets: Arc<TicketIdGenerator>,
    clock: SharedClock,
}

impl IssueLifecycleManager {
    pub fn new(storage: Storage, tickets: Arc<TicketIdGenerator>, clock: SharedClock) -> Self {
        Self {
            storage,
            tickets,
            clock,
        }
    }

    /// Run the `create` checks without writing anything
    pub fn check(&self, payload: &IssueCreate) -> CoreResult<()> {
        validate(payload).map(|_| ())
    }

    /// Validate and persist a new `Pending` issue
    ///
    /// With a `client_request_id`, a repeat of the same request by the same
    /// reporter returns the issue created the first time.
    pub fn create(&self, payload: IssueCreate, reporter_id: &str) -> CoreResult<Issue> {
        let validated = validate(&payload)?;
        let request_key = payload
            .client_request_id
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| format!("{reporter_id}:{k}"));

        let now = self.clock.now_millis();
        for attempt in 1..=MAX_TICKET_ATTEMPTS {
            let issue = Issue {
                ticket_id: self.tickets.generate(validated.issue_type),
                issue_type: validated.issue_type,
                title: validated.title.clone(),
                description: validated.description.clone(),
                location: validated.location,
                zone: validated.zone.clone(),
                status: IssueStatus::Pending,
                reporter_id: reporter_id.to_string(),
                assigned_authority: None,
                issue_image_ref: validated.issue_image_ref.clone(),
                resolution_image_ref: None,
                resolution_notes: None,
                created_at: now,
                updated_at: now,
                resolution_date: None,
            };

            match self.storage.insert_issue(&issue, request_key.as_deref()) {
                Ok(InsertOutcome::Inserted) => {
                    tracing::info!(
                        ticket_id = %issue.ticket_id,
                        zone = %issue.zone,
                        issue_type = %issue.issue_type,
                        "Issue created"
                    );
                    crate::audit_log!(
                        format!("citizen:{reporter_id}"),
                        "create",
                        format!("issue:{}", issue.ticket_id)
                    );
                    return Ok(issue);
                }
                Ok(InsertOutcome::Replayed(existing)) => {
                    tracing::info!(
                        ticket_id = %existing.ticket_id,
                        "Create request replayed, returning existing issue"
                    );
                    return Ok(existing);
                }
                Err(StorageError::Duplicate(ticket_id)) => {
                    tracing::warn!(%ticket_id, attempt, "Ticket id collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::Internal(format!(
            "could not allocate a unique ticket id after {MAX_TICKET_ATTEMPTS} attempts"
        )))
    }

    /// Move an issue to `to` on behalf of `actor`
    pub fn transition(
        &self,
        ticket_id: &str,
        actor: &Actor,
        to: IssueStatus,
        extra: TransitionExtra,
    ) -> CoreResult<Issue> {
        let now = self.clock.now_millis();
        let result = self.storage.update_issue(ticket_id, |current| {
            let mut issue = current.ok_or_else(|| CoreError::issue_not_found(ticket_id))?;
            let from = issue.status;
            actor.authorize(&issue, to)?;

            let supplied_image = extra
                .resolution_image_ref
                .filter(|r| !r.trim().is_empty());
            if to == IssueStatus::AwaitingVerification
                && !actor.is_admin()
                && supplied_image.is_none()
            {
                return Err(CoreError::resolution_image_required());
            }

            match (&issue.resolution_image_ref, supplied_image) {
                (None, Some(image)) => issue.resolution_image_ref = Some(image),
                (Some(_), Some(_)) => {
                    tracing::debug!(%ticket_id, "Resolution image already recorded, keeping the first");
                }
                _ => {}
            }
            if let Some(notes) = extra.resolution_notes.filter(|n| !n.trim().is_empty()) {
                issue.resolution_notes = Some(notes);
            }
            if to == IssueStatus::Closed && issue.resolution_date.is_none() {
                issue.resolution_date = Some(now);
            }
            if let Actor::Authority { id, .. } = actor
                && issue.assigned_authority.is_none()
            {
                issue.assigned_authority = Some(id.clone());
            }

            issue.status = to;
            issue.updated_at = now;
            tracing::debug!(%ticket_id, %from, %to, "Applying status change");
            Ok(issue)
        });

        match &result {
            Ok(issue) => {
                tracing::info!(ticket_id = %issue.ticket_id, status = %issue.status, actor = %actor.role(), "Issue status changed");
                crate::audit_log!(
                    actor.label(),
                    "status_change",
                    format!("issue:{ticket_id}"),
                    issue.status.as_str()
                );
            }
            Err(CoreError::Forbidden { code, .. }) => {
                crate::security_log!(
                    WARN,
                    "transition_forbidden",
                    actor = %actor.label(),
                    ticket_id = %ticket_id,
                    code = %code
                );
            }
            Err(e) => {
                tracing::debug!(%ticket_id, error = %e, "Status change rejected");
            }
        }
        result
    }

    /// Reporter confirmation: `Awaiting Verification -> Closed`
    ///
    /// The claimed email is resolved to an existing citizen; an unknown
    /// email is treated like a mismatching one.
    pub fn verify_and_close(&self, ticket_id: &str, claimed_email: &str) -> CoreResult<Issue> {
        let email = normalize_email(claimed_email);
        if email.is_empty() {
            return Err(CoreError::validation("Reporter email is required"));
        }

        let reporter = self.storage.find_identity_by_email(Role::Citizen, &email)?;
        let Some(reporter) = reporter else {
            // Keep NotFound distinguishable for unknown tickets
            if self.storage.get_issue(ticket_id)?.is_none() {
                return Err(CoreError::issue_not_found(ticket_id));
            }
            crate::security_log!(WARN, "closure_unknown_reporter", ticket_id = %ticket_id);
            return Err(CoreError::not_reporter());
        };

        let actor = Actor::Citizen {
            identity_id: reporter.id,
        };
        self.transition(ticket_id, &actor, IssueStatus::Closed, TransitionExtra::default())
    }

    pub fn get(&self, ticket_id: &str) -> CoreResult<Issue> {
        self.storage
            .get_issue(ticket_id)?
            .ok_or_else(|| CoreError::issue_not_found(ticket_id))
    }

    /// Issues reported by one citizen, newest first
    pub fn my_reports(&self, reporter_id: &str) -> CoreResult<Vec<IssueSummary>> {
        let mut issues = self.storage.list_issues_by_reporter(reporter_id)?;
        issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(issues
            .into_iter()
            .map(|issue| IssueSummary {
                date: format_date(issue.created_at),
                ticket_id: issue.ticket_id,
                issue_type: issue.issue_type,
                status: issue.status,
                description: issue.description,
            })
            .collect())
    }

    /// Issues of one zone: overdue `Pending` first, then newest first
    pub fn zone_dashboard(&self, zone: &str) -> CoreResult<Vec<Issue>> {
        let now = self.clock.now_millis();
        let overdue =
            |i: &Issue| i.status == IssueStatus::Pending && now - i.created_at > OVERDUE_AFTER_MILLIS;

        let mut issues = self.storage.list_issues(Some(zone))?;
        issues.sort_by(|a, b| {
            overdue(b)
                .cmp(&overdue(a))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(issues)
    }

    /// Every issue, newest first
    pub fn list_all(&self) -> CoreResult<Vec<Issue>> {
        let mut issues = self.storage.list_issues(None)?;
        issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(issues)
    }
}

struct ValidatedIssue {
    issue_type: IssueType,
    title: String,
    description: String,
    location: Location,
    zone: String,
    issue_image_ref: String,
}

fn validate(payload: &IssueCreate) -> CoreResult<ValidatedIssue> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(CoreError::validation("Title is required"));
    }
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(CoreError::validation("Description is required"));
    }
    let zone = payload.zone.trim();
    if zone.is_empty() {
        return Err(CoreError::validation("Zone is required"));
    }

    let location = match (payload.lat, payload.lng) {
        (Some(lat), Some(lng))
            if lat.is_finite()
                && lng.is_finite()
                && (-90.0..=90.0).contains(&lat)
                && (-180.0..=180.0).contains(&lng) =>
        {
            Location { lat, lng }
        }
        _ => return Err(CoreError::invalid_location()),
    };

    let issue_image_ref = payload
        .issue_image_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| CoreError::validation("Issue image is required"))?;

    Ok(ValidatedIssue {
        issue_type: payload.issue_type.unwrap_or(IssueType::Other),
        title: title.to_string(),
        description: description.to_string(),
        location,
        zone: zone.to_string(),
        issue_image_ref: issue_image_ref.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use shared::error::ErrorCode;
    use shared::models::Identity;
    use std::time::Duration;

    const START: i64 = 1_750_000_000_000;

    struct Fixture {
        clock: Arc<ManualClock>,
        storage: Storage,
        manager: IssueLifecycleManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(START));
        let storage = Storage::open_in_memory().unwrap();
        let tickets = Arc::new(TicketIdGenerator::new(clock.clone()));
        let manager = IssueLifecycleManager::new(storage.clone(), tickets, clock.clone());
        Fixture {
            clock,
            storage,
            manager,
        }
    }

    fn payload(zone: &str) -> IssueCreate {
        IssueCreate {
            issue_type: Some(IssueType::Pothole),
            title: "Pothole on 5th".into(),
            description: "Large pothole near the school gate".into(),
            lat: Some(12.97),
            lng: Some(77.59),
            zone: zone.into(),
            issue_image_ref: Some("uploads/before.jpg".into()),
            client_request_id: None,
        }
    }

    fn citizen(storage: &Storage, id: &str, email: &str) -> Identity {
        let identity = Identity {
            id: id.into(),
            role: Role::Citizen,
            email: email.into(),
            name: "Citizen".into(),
            mobile: "N/A".into(),
            zone: "Central".into(),
            credential_hash: "x".into(),
            created_at: START,
        };
        storage.insert_identity(&identity).unwrap();
        identity
    }

    fn authority(zone: &str) -> Actor {
        Actor::Authority {
            id: format!("auth-{zone}"),
            zone: zone.into(),
        }
    }

    fn resolution(image: &str) -> TransitionExtra {
        TransitionExtra {
            resolution_image_ref: Some(image.into()),
            resolution_notes: Some("Filled and levelled".into()),
        }
    }

    #[test]
    fn test_create_persists_pending_issue() {
        let f = fixture();
        let issue = f.manager.create(payload("Central"), "citizen-1").unwrap();
        assert!(issue.ticket_id.starts_with("P-"));
        assert_eq!(issue.status, IssueStatus::Pending);
        assert_eq!(issue.created_at, START);
        assert!(issue.resolution_date.is_none());
        assert_eq!(f.manager.get(&issue.ticket_id).unwrap(), issue);
    }

    #[test]
    fn test_create_rejects_bad_payloads() {
        let f = fixture();

        let mut p = payload("Central");
        p.title = "   ".into();
        assert!(matches!(
            f.manager.create(p, "c"),
            Err(CoreError::Validation { code: ErrorCode::ValidationFailed, .. })
        ));

        let mut p = payload("Central");
        p.lat = Some(f64::NAN);
        assert_eq!(f.manager.create(p, "c").unwrap_err().code(), ErrorCode::InvalidLocation);

        let mut p = payload("Central");
        p.lng = None;
        assert_eq!(f.manager.create(p, "c").unwrap_err().code(), ErrorCode::InvalidLocation);

        let mut p = payload("Central");
        p.issue_image_ref = None;
        assert!(f.manager.create(p, "c").is_err());

        let mut p = payload("");
        p.zone = " ".into();
        assert!(f.manager.create(p, "c").is_err());

        assert_eq!(f.storage.issue_count().unwrap(), 0);
    }

    #[test]
    fn test_create_idempotency_key() {
        let f = fixture();
        let mut p = payload("Central");
        p.client_request_id = Some("form-42".into());

        let first = f.manager.create(p.clone(), "citizen-1").unwrap();
        let second = f.manager.create(p.clone(), "citizen-1").unwrap();
        assert_eq!(first.ticket_id, second.ticket_id);

        // Same key from another reporter is a different request
        let other = f.manager.create(p, "citizen-2").unwrap();
        assert_ne!(other.ticket_id, first.ticket_id);

        // Without a key every call is a new issue
        f.manager.create(payload("Central"), "citizen-1").unwrap();
        f.manager.create(payload("Central"), "citizen-1").unwrap();
        assert_eq!(f.storage.issue_count().unwrap(), 4);
    }

    #[test]
    fn test_resolve_sets_image_but_not_resolution_date() {
        let f = fixture();
        let issue = f.manager.create(payload("Central"), "citizen-1").unwrap();

        let resolved = f
            .manager
            .transition(
                &issue.ticket_id,
                &authority("Central"),
                IssueStatus::AwaitingVerification,
                resolution("uploads/after.jpg"),
            )
            .unwrap();
        assert_eq!(resolved.status, IssueStatus::AwaitingVerification);
        assert_eq!(resolved.resolution_image_ref.as_deref(), Some("uploads/after.jpg"));
        assert_eq!(resolved.assigned_authority.as_deref(), Some("auth-Central"));
        assert!(resolved.resolution_date.is_none());
    }

    #[test]
    fn test_resolve_without_image_is_rejected() {
        let f = fixture();
        let issue = f.manager.create(payload("Central"), "citizen-1").unwrap();
        let err = f
            .manager
            .transition(
                &issue.ticket_id,
                &authority("Central"),
                IssueStatus::AwaitingVerification,
                TransitionExtra::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResolutionImageRequired);
        assert_eq!(f.manager.get(&issue.ticket_id).unwrap().status, IssueStatus::Pending);
    }

    #[test]
    fn test_foreign_zone_authority_is_forbidden() {
        let f = fixture();
        let issue = f.manager.create(payload("South"), "citizen-1").unwrap();
        let err = f
            .manager
            .transition(
                &issue.ticket_id,
                &authority("North"),
                IssueStatus::InProgress,
                TransitionExtra::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));
        let stored = f.manager.get(&issue.ticket_id).unwrap();
        assert_eq!(stored.status, IssueStatus::Pending);
        assert!(stored.assigned_authority.is_none());
    }

    #[test]
    fn test_unknown_ticket_is_not_found() {
        let f = fixture();
        let err = f
            .manager
            .transition(
                "P-404",
                &authority("Central"),
                IssueStatus::InProgress,
                TransitionExtra::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::IssueNotFound);
    }

    #[test]
    fn test_reporter_closes_and_stranger_is_forbidden() {
        let f = fixture();
        let reporter = citizen(&f.storage, "citizen-1", "a@x.com");
        citizen(&f.storage, "citizen-2", "b@x.com");
        let issue = f.manager.create(payload("Central"), &reporter.id).unwrap();
        f.manager
            .transition(
                &issue.ticket_id,
                &authority("Central"),
                IssueStatus::AwaitingVerification,
                resolution("uploads/after.jpg"),
            )
            .unwrap();

        let err = f.manager.verify_and_close(&issue.ticket_id, "b@x.com").unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));
        let err = f.manager.verify_and_close(&issue.ticket_id, "nobody@x.com").unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));
        assert_eq!(
            f.manager.get(&issue.ticket_id).unwrap().status,
            IssueStatus::AwaitingVerification
        );

        f.clock.advance(Duration::from_secs(3600));
        let closed = f.manager.verify_and_close(&issue.ticket_id, " A@X.com ").unwrap();
        assert_eq!(closed.status, IssueStatus::Closed);
        assert_eq!(closed.resolution_date, Some(START + 3_600_000));

        // Second confirmation is not in the table
        let err = f.manager.verify_and_close(&issue.ticket_id, "a@x.com").unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_verify_unknown_ticket_is_not_found() {
        let f = fixture();
        citizen(&f.storage, "citizen-1", "a@x.com");
        assert_eq!(
            f.manager.verify_and_close("W-1", "a@x.com").unwrap_err().code(),
            ErrorCode::IssueNotFound
        );
        assert_eq!(
            f.manager.verify_and_close("W-1", "ghost@x.com").unwrap_err().code(),
            ErrorCode::IssueNotFound
        );
    }

    #[test]
    fn test_admin_override_keeps_write_once_fields() {
        let f = fixture();
        let reporter = citizen(&f.storage, "citizen-1", "a@x.com");
        let admin = Actor::Admin { id: "root".into() };
        let issue = f.manager.create(payload("South"), &reporter.id).unwrap();

        let closed = f
            .manager
            .transition(&issue.ticket_id, &admin, IssueStatus::Closed, TransitionExtra::default())
            .unwrap();
        let first_date = closed.resolution_date;
        assert!(first_date.is_some());

        f.clock.advance(Duration::from_secs(60));
        let reopened = f
            .manager
            .transition(&issue.ticket_id, &admin, IssueStatus::InProgress, TransitionExtra::default())
            .unwrap();
        assert_eq!(reopened.status, IssueStatus::InProgress);
        assert_eq!(reopened.resolution_date, first_date);

        let again = f
            .manager
            .transition(&issue.ticket_id, &admin, IssueStatus::Closed, TransitionExtra::default())
            .unwrap();
        assert_eq!(again.resolution_date, first_date);
        assert!(again.assigned_authority.is_none());
    }

    #[test]
    fn test_resolution_image_is_write_once() {
        let f = fixture();
        let admin = Actor::Admin { id: "root".into() };
        let issue = f.manager.create(payload("Central"), "citizen-1").unwrap();
        f.manager
            .transition(
                &issue.ticket_id,
                &authority("Central"),
                IssueStatus::AwaitingVerification,
                resolution("uploads/first.jpg"),
            )
            .unwrap();
        let reopened = f
            .manager
            .transition(&issue.ticket_id, &admin, IssueStatus::InProgress, TransitionExtra::default())
            .unwrap();
        assert_eq!(reopened.status, IssueStatus::InProgress);
        assert_eq!(reopened.resolution_image_ref.as_deref(), Some("uploads/first.jpg"));

        let again = f
            .manager
            .transition(
                &issue.ticket_id,
                &authority("Central"),
                IssueStatus::AwaitingVerification,
                resolution("uploads/second.jpg"),
            )
            .unwrap();
        assert_eq!(again.resolution_image_ref.as_deref(), Some("uploads/first.jpg"));
    }

    #[test]
    fn test_concurrent_transitions_have_one_winner() {
        let f = fixture();
        let issue = f.manager.create(payload("Central"), "citizen-1").unwrap();
        let manager = Arc::new(f.manager);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let ticket_id = issue.ticket_id.clone();
                std::thread::spawn(move || {
                    manager
                        .transition(
                            &ticket_id,
                            &authority("Central"),
                            IssueStatus::InProgress,
                            TransitionExtra::default(),
                        )
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(manager.get(&issue.ticket_id).unwrap().status, IssueStatus::InProgress);
    }

    #[test]
    fn test_my_reports_newest_first_with_dates() {
        let f = fixture();
        let first = f.manager.create(payload("Central"), "citizen-1").unwrap();
        f.clock.advance(Duration::from_secs(86_400));
        let second = f.manager.create(payload("North"), "citizen-1").unwrap();
        f.manager.create(payload("North"), "citizen-2").unwrap();

        let reports = f.manager.my_reports("citizen-1").unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].ticket_id, second.ticket_id);
        assert_eq!(reports[1].ticket_id, first.ticket_id);
        assert_eq!(reports[1].date, format_date(START));
    }

    #[test]
    fn test_zone_dashboard_puts_overdue_pending_first() {
        let f = fixture();
        let old = f.manager.create(payload("Central"), "c").unwrap();
        let old_started = f.manager.create(payload("Central"), "c").unwrap();
        f.manager
            .transition(
                &old_started.ticket_id,
                &authority("Central"),
                IssueStatus::InProgress,
                TransitionExtra::default(),
            )
            .unwrap();
        f.clock.advance(Duration::from_secs(8 * 86_400));
        let fresh = f.manager.create(payload("Central"), "c").unwrap();
        f.manager.create(payload("North"), "c").unwrap();

        let ids: Vec<String> = f
            .manager
            .zone_dashboard("Central")
            .unwrap()
            .into_iter()
            .map(|i| i.ticket_id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], old.ticket_id);
        assert_eq!(ids[1], fresh.ticket_id);
        assert_eq!(f.manager.list_all().unwrap().len(), 4);
    }
}
