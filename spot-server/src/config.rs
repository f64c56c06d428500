//! Server configuration

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::verification::AttemptPolicy;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    /// Directory holding the redb file
    pub data_dir: PathBuf,
    /// Directory for uploaded images
    pub upload_dir: PathBuf,
    /// development | staging | production
    pub environment: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiration_minutes: i64,
    pub session_ttl: Duration,
    pub session_attempts: AttemptPolicy,
    pub session_sweep_interval: Duration,
    /// Zone given to citizens created on demand
    pub default_citizen_zone: String,
    /// Zone given to anonymously reported issues
    pub anonymous_zone: String,
    /// SES sender address; unset means log-only notifications
    pub ses_from_email: Option<String>,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    pub max_upload_bytes: usize,
    /// Requests per IP per window on public mutating routes
    pub public_rate_limit: u32,
    pub public_rate_window: Duration,
    /// Reverse proxies whose `X-Forwarded-For` is believed
    pub trusted_proxies: Vec<IpAddr>,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if environment != "development" && val.len() < 32 {
            return Err(format!("{name} must be at least 32 characters in {environment}").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            http_port: parse_env("HTTP_PORT", 5000),
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".into())
                .into(),
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".into())
                .into(),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "spot-server".into()),
            jwt_audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "spot-clients".into()),
            jwt_expiration_minutes: parse_env("JWT_EXPIRATION_MINUTES", 1440),
            session_ttl: Duration::from_secs(parse_env("SESSION_TTL_SECS", 600)),
            session_attempts: AttemptPolicy::from_limit(parse_env("SESSION_MAX_ATTEMPTS", 5)),
            session_sweep_interval: Duration::from_secs(parse_env("SESSION_SWEEP_SECS", 60).max(1)),
            default_citizen_zone: non_empty_env("DEFAULT_CITIZEN_ZONE")
                .unwrap_or_else(|| "Central".into()),
            anonymous_zone: non_empty_env("ANONYMOUS_ZONE").unwrap_or_else(|| "Central".into()),
            ses_from_email: non_empty_env("SES_FROM_EMAIL"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: environment != "development",
            log_dir: non_empty_env("LOG_DIR"),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 1_000_000),
            public_rate_limit: parse_env("PUBLIC_RATE_LIMIT", 10),
            public_rate_window: Duration::from_secs(parse_env("PUBLIC_RATE_WINDOW_SECS", 60).max(1)),
            trusted_proxies: parse_ip_list(&std::env::var("TRUSTED_PROXIES").unwrap_or_default())?,
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("spot.redb")
    }

    /// Development defaults, no environment access (tests, local tools)
    pub fn for_development(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            http_port: 5000,
            upload_dir: data_dir.join("uploads"),
            data_dir,
            environment: "development".into(),
            jwt_secret: "dev-JWT_SECRET-not-for-production".into(),
            jwt_issuer: "spot-server".into(),
            jwt_audience: "spot-clients".into(),
            jwt_expiration_minutes: 60,
            session_ttl: Duration::from_secs(600),
            session_attempts: AttemptPolicy::default(),
            session_sweep_interval: Duration::from_secs(60),
            default_citizen_zone: "Central".into(),
            anonymous_zone: "Central".into(),
            ses_from_email: None,
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            max_upload_bytes: 1_000_000,
            public_rate_limit: 10,
            public_rate_window: Duration::from_secs(60),
            trusted_proxies: Vec::new(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Comma-separated IP addresses; blank entries are skipped
fn parse_ip_list(raw: &str) -> Result<Vec<IpAddr>, BoxError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|e| format!("TRUSTED_PROXIES entry {s:?}: {e}").into())
        })
        .collect()
}
