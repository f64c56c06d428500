//! Data models
//!
//! Shared between the server and front-end clients (via API).
//! Timestamps are Unix milliseconds (`i64`).

pub mod draft;
pub mod identity;
pub mod issue;

// Re-exports
pub use draft::*;
pub use identity::*;
pub use issue::*;
