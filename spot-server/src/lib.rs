//! Spot Server - civic issue reporting service
//!
//! Citizens report local problems (potholes, waste) with a photo, either
//! signed in or anonymously through an emailed one-time code. Issues are
//! routed to the authority of their zone and tracked until the reporter
//! confirms the fix.
//!
//! # Module layout
//!
//! ```text
//! spot-server/src/
//! ├── api/           # axum routes and handlers
//! ├── auth/          # JWT gate, rate limiting
//! ├── lifecycle/     # issue creation and status transitions
//! ├── verification   # one-time-code sessions
//! ├── submission     # anonymous two-step workflow
//! ├── identity       # on-demand citizen identities
//! ├── notify         # outbound email (SES)
//! ├── media          # uploaded photos
//! ├── storage        # redb tables
//! └── logger         # tracing setup, audit/security macros
//! ```

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod logger;
pub mod media;
pub mod notify;
pub mod state;
pub mod storage;
pub mod submission;
pub mod ticket;
pub mod util;
pub mod verification;

pub use auth::{CurrentUser, JwtService};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use logger::init_logger_with_file;
pub use state::ServerState;
