//! Core error type
//!
//! `CoreError` is the single failure taxonomy of the issue core. Each
//! variant is surfaced to HTTP callers as a distinct [`ErrorCode`]; storage
//! failures are logged and collapsed to `DatabaseError`.
//!
//! Duplicate-key conflicts never appear here: they stay inside
//! [`StorageError::Duplicate`] and are retried by the caller that hit them.

use shared::error::{AppError, ErrorCode};
use shared::models::IssueStatus;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing input
    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    /// Unknown ticket or session
    #[error("{message}")]
    NotFound { code: ErrorCode, message: String },

    /// Verification window elapsed (or retry budget exhausted)
    #[error("Verification session expired")]
    Expired,

    /// Wrong one-time code; the session is kept
    #[error("Invalid verification code")]
    InvalidCode { attempts_left: Option<u32> },

    /// Zone, role or ownership mismatch
    #[error("{message}")]
    Forbidden { code: ErrorCode, message: String },

    /// Status change not in the transition table
    #[error("Cannot move issue from {from} to {to}")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Unexpected failure outside storage (hashing, filesystem)
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::ValidationFailed,
            message: message.into(),
        }
    }

    pub fn invalid_location() -> Self {
        Self::Validation {
            code: ErrorCode::InvalidLocation,
            message: "Invalid GPS coordinates provided. Please re-pin the location.".into(),
        }
    }

    pub fn resolution_image_required() -> Self {
        Self::Validation {
            code: ErrorCode::ResolutionImageRequired,
            message: ErrorCode::ResolutionImageRequired.message().into(),
        }
    }

    pub fn issue_not_found(ticket_id: &str) -> Self {
        Self::NotFound {
            code: ErrorCode::IssueNotFound,
            message: format!("Ticket {ticket_id} not found"),
        }
    }

    pub fn session_not_found() -> Self {
        Self::NotFound {
            code: ErrorCode::SessionNotFound,
            message: "Verification session not found".into(),
        }
    }

    pub fn zone_mismatch(zone: &str) -> Self {
        Self::Forbidden {
            code: ErrorCode::ZoneMismatch,
            message: format!("Issue is not assigned to zone {zone}"),
        }
    }

    pub fn not_reporter() -> Self {
        Self::Forbidden {
            code: ErrorCode::NotReporter,
            message: "Reporter email not found or does not match this issue".into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: ErrorCode::PermissionDenied,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } | Self::NotFound { code, .. } => *code,
            Self::Forbidden { code, .. } => *code,
            Self::Expired => ErrorCode::VerificationCodeExpired,
            Self::InvalidCode { .. } => ErrorCode::VerificationCodeInvalid,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::Storage(_) => ErrorCode::DatabaseError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                AppError::new(ErrorCode::DatabaseError)
            }
            CoreError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                AppError::new(ErrorCode::InternalError)
            }
            CoreError::InvalidCode { attempts_left } => {
                let app = AppError::new(ErrorCode::VerificationCodeInvalid);
                match attempts_left {
                    Some(left) => app.with_detail("attempts_left", left),
                    None => app,
                }
            }
            CoreError::InvalidTransition { from, to } => AppError::with_message(
                ErrorCode::InvalidTransition,
                format!("Cannot move issue from {from} to {to}"),
            )
            .with_detail("from", from.as_str())
            .with_detail("to", to.as_str()),
            other => {
                let code = other.code();
                AppError::with_message(code, other.to_string())
            }
        }
    }
}

impl axum::response::IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        AppError::from(self).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
