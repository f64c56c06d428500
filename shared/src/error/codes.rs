//! Numeric error codes of the issue API
//!
//! Ranges: 0xxx general, 1xxx token, 2xxx permission, 3xxx anonymous
//! verification, 4xxx issue, 65xx upload, 9xxx system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialized as a bare number in the `code` field of every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    Success = 0,
    /// Malformed or missing input
    ValidationFailed = 2,
    /// Public route budget spent for this client
    TooManyRequests = 6,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Specific role required
    RoleRequired = 2002,
    /// Issue belongs to another authority zone
    ZoneMismatch = 2003,
    /// Caller is not the original reporter
    NotReporter = 2004,

    // ==================== 3xxx: Verification ====================
    /// Verification session not found
    SessionNotFound = 3001,
    /// Verification session expired
    VerificationCodeExpired = 3002,
    /// Verification code invalid
    VerificationCodeInvalid = 3003,

    // ==================== 4xxx: Issue ====================
    /// Issue not found
    IssueNotFound = 4001,
    /// Status change not allowed from the current status
    InvalidTransition = 4002,
    /// Resolution image required
    ResolutionImageRequired = 4003,
    /// Latitude/longitude missing or not finite
    InvalidLocation = 4004,

    // ==================== 65xx: File Upload ====================
    /// File too large
    FileTooLarge = 6501,
    /// Unsupported file format
    UnsupportedFileFormat = 6502,
    /// No file provided
    NoFileProvided = 6504,
    /// Empty file
    EmptyFile = 6505,
    /// File storage failed
    FileStorageFailed = 6509,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// redb failure
    DatabaseError = 9002,
    /// Outbound notification could not be delivered
    NotificationFailed = 9501,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::TooManyRequests => "Too many requests, please try again later",
            ErrorCode::RequiredField => "Required field is missing",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::RoleRequired => "Specific role is required",
            ErrorCode::ZoneMismatch => "Issue is not assigned to your zone",
            ErrorCode::NotReporter => "Only the original reporter may do this",

            // Verification
            ErrorCode::SessionNotFound => "Verification session not found",
            ErrorCode::VerificationCodeExpired => "Verification session has expired",
            ErrorCode::VerificationCodeInvalid => "Invalid verification code",

            // Issue
            ErrorCode::IssueNotFound => "Issue not found",
            ErrorCode::InvalidTransition => "Status change not allowed",
            ErrorCode::ResolutionImageRequired => "Resolution image is required",
            ErrorCode::InvalidLocation => "Invalid GPS coordinates",

            // File upload
            ErrorCode::FileTooLarge => "File too large",
            ErrorCode::UnsupportedFileFormat => "Unsupported file format",
            ErrorCode::NoFileProvided => "No file provided",
            ErrorCode::EmptyFile => "Empty file provided",
            ErrorCode::FileStorageFailed => "Failed to store file",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NotificationFailed => "Notification could not be delivered",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            6 => Ok(ErrorCode::TooManyRequests),
            7 => Ok(ErrorCode::RequiredField),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::RoleRequired),
            2003 => Ok(ErrorCode::ZoneMismatch),
            2004 => Ok(ErrorCode::NotReporter),

            // Verification
            3001 => Ok(ErrorCode::SessionNotFound),
            3002 => Ok(ErrorCode::VerificationCodeExpired),
            3003 => Ok(ErrorCode::VerificationCodeInvalid),

            // Issue
            4001 => Ok(ErrorCode::IssueNotFound),
            4002 => Ok(ErrorCode::InvalidTransition),
            4003 => Ok(ErrorCode::ResolutionImageRequired),
            4004 => Ok(ErrorCode::InvalidLocation),

            // File upload
            6501 => Ok(ErrorCode::FileTooLarge),
            6502 => Ok(ErrorCode::UnsupportedFileFormat),
            6504 => Ok(ErrorCode::NoFileProvided),
            6505 => Ok(ErrorCode::EmptyFile),
            6509 => Ok(ErrorCode::FileStorageFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9501 => Ok(ErrorCode::NotificationFailed),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::ZoneMismatch.code(), 2003);
        assert_eq!(ErrorCode::VerificationCodeExpired.code(), 3002);
        assert_eq!(ErrorCode::InvalidTransition.code(), 4002);
        assert_eq!(ErrorCode::NotificationFailed.code(), 9501);
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::IssueNotFound).unwrap();
        assert_eq!(json, "4001");
    }

    #[test]
    fn test_deserialize() {
        let code: ErrorCode = serde_json::from_str("3003").unwrap();
        assert_eq!(code, ErrorCode::VerificationCodeInvalid);

        let code: ErrorCode = serde_json::from_str("9001").unwrap();
        assert_eq!(code, ErrorCode::InternalError);
    }

    #[test]
    fn test_deserialize_invalid() {
        let result: Result<ErrorCode, _> = serde_json::from_str("999");
        assert!(result.is_err());

        let result: Result<ErrorCode, _> = serde_json::from_str("10000");
        assert!(result.is_err());

        // Unassigned slots in the general range
        assert_eq!(ErrorCode::try_from(3u16), Err(InvalidErrorCode(3)));
    }

    #[test]
    fn test_every_code_roundtrips_through_u16() {
        let codes = [
            ErrorCode::Success,
            ErrorCode::TooManyRequests,
            ErrorCode::RequiredField,
            ErrorCode::TokenInvalid,
            ErrorCode::NotReporter,
            ErrorCode::SessionNotFound,
            ErrorCode::InvalidLocation,
            ErrorCode::FileStorageFailed,
            ErrorCode::NotificationFailed,
        ];
        for code in codes {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::TooManyRequests), "6");
        assert_eq!(format!("{}", ErrorCode::IssueNotFound), "4001");
        assert_eq!(
            format!("{}", InvalidErrorCode(999)),
            "invalid error code: 999"
        );
    }
}
