//! Actors and transition rules
//!
//! | From | To | Allowed |
//! |------|----|---------|
//! | Pending | In Progress | authority (same zone), admin |
//! | Pending, In Progress | Awaiting Verification | authority (same zone), admin |
//! | Awaiting Verification | Closed | original reporter, admin |
//! | any | any other | admin |
//!
//! A change that is not in the table is an invalid transition. A change that
//! is in the table but not open to the actor is forbidden. For authorities
//! the zone is checked first, so a foreign-zone authority learns nothing
//! about the issue's state.
//!
//! The resolution image is recorded on the first entry into Awaiting
//! Verification and never replaced. An admin moving the issue back to
//! Pending or In Progress does not clear it, so a reopened issue keeps the
//! photo of its earlier fix.

use shared::models::{Issue, IssueStatus, Role};

use crate::error::{CoreError, CoreResult};

/// Caller of a lifecycle operation, with the identity its rules need
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Citizen { identity_id: String },
    Authority { id: String, zone: String },
    Admin { id: String },
}

/// Edge of the lifecycle table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    StartWork,
    SubmitResolution,
    ConfirmClosure,
}

impl Edge {
    pub fn between(from: IssueStatus, to: IssueStatus) -> Option<Self> {
        use IssueStatus::*;
        match (from, to) {
            (Pending, InProgress) => Some(Self::StartWork),
            (Pending | InProgress, AwaitingVerification) => Some(Self::SubmitResolution),
            (AwaitingVerification, Closed) => Some(Self::ConfirmClosure),
            _ => None,
        }
    }
}

impl Actor {
    pub fn role(&self) -> Role {
        match self {
            Self::Citizen { .. } => Role::Citizen,
            Self::Authority { .. } => Role::Authority,
            Self::Admin { .. } => Role::Admin,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Citizen { identity_id } => identity_id,
            Self::Authority { id, .. } | Self::Admin { id } => id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    /// Label for audit records, e.g. `authority:a-17`
    pub fn label(&self) -> String {
        format!("{}:{}", self.role(), self.id())
    }

    /// Decide whether this actor may move `issue` to `to`
    ///
    /// Evaluated against the committed record inside the write transaction.
    pub fn authorize(&self, issue: &Issue, to: IssueStatus) -> CoreResult<()> {
        let from = issue.status;
        if from == to {
            return Err(CoreError::InvalidTransition { from, to });
        }

        match self {
            Self::Admin { .. } => Ok(()),

            Self::Authority { zone, .. } => {
                if *zone != issue.zone {
                    return Err(CoreError::zone_mismatch(zone));
                }
                match Edge::between(from, to) {
                    Some(Edge::StartWork | Edge::SubmitResolution) => Ok(()),
                    Some(Edge::ConfirmClosure) => Err(CoreError::forbidden(
                        "Only the original reporter can confirm closure",
                    )),
                    None => Err(CoreError::InvalidTransition { from, to }),
                }
            }

            Self::Citizen { identity_id } => match Edge::between(from, to) {
                Some(Edge::ConfirmClosure) if *identity_id == issue.reporter_id => Ok(()),
                Some(Edge::ConfirmClosure) => Err(CoreError::not_reporter()),
                Some(_) => Err(CoreError::forbidden("Citizens cannot change issue status")),
                None => Err(CoreError::InvalidTransition { from, to }),
            },
        }
    }
}
