//! Authorization gate: bearer-token validation, caller identity and
//! public-route throttling.

mod extractor;
pub mod jwt;
pub mod rate_limit;

pub use jwt::{Claims, CurrentUser, JwtConfig, JwtError, JwtService};
pub use rate_limit::RateLimiter;
