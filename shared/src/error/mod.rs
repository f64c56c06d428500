//! Errors and the response envelope of the issue API
//!
//! Every failure reaches the client as an [`ErrorCode`] plus message inside
//! an [`ApiResponse`]; the code decides the HTTP status.
//!
//! ```
//! use shared::error::{ApiResponse, AppError, ErrorCode};
//!
//! let err = AppError::validation("Title is required").with_detail("field", "title");
//! assert_eq!(err.code, ErrorCode::ValidationFailed);
//!
//! let response = ApiResponse::<()>::from(err);
//! assert_eq!(response.code, Some(2));
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult, Warning};
