//! Shared types for Spot & Sort
//!
//! Common types used by the server and its clients: the issue, identity and
//! anonymous-draft models, plus the unified error and response structures.

pub mod error;
pub mod models;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode, Warning};
