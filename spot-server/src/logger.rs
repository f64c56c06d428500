//! Logging Infrastructure
//!
//! Console output plus, when a log directory is configured:
//! - `app/`      daily rotating application logs (deleted after 14 days)
//! - `audit/`    status changes and submissions (never deleted)
//! - `security/` verification and authorization failures (never deleted)

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const APP_LOG_RETENTION_DAYS: i64 = 14;

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console: BoxedLayer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter())
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter())
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        for sub in ["app", "audit", "security"] {
            fs::create_dir_all(log_dir.join(sub))?;
        }

        let app_log = RollingFileAppender::new(Rotation::DAILY, log_dir.join("app"), "app");
        layers.push(file_layer(app_log, json_format, |target| {
            target != "audit" && target != "security"
        }));

        let audit_log = RollingFileAppender::new(Rotation::DAILY, log_dir.join("audit"), "audit");
        layers.push(file_layer(audit_log, json_format, |target| target == "audit"));

        let security_log =
            RollingFileAppender::new(Rotation::DAILY, log_dir.join("security"), "security");
        layers.push(file_layer(security_log, json_format, |target| {
            target == "security"
        }));

        tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

fn file_layer(
    appender: RollingFileAppender,
    json_format: bool,
    accept: fn(&str) -> bool,
) -> BoxedLayer {
    let target_filter = tracing_subscriber::filter::filter_fn(move |meta| accept(meta.target()));
    let writer = std::sync::Mutex::new(appender);
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .with_filter(target_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(target_filter)
            .boxed()
    }
}

/// Delete `app.YYYY-MM-DD` files older than the retention window
fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let cutoff = (chrono::Utc::now() - chrono::Duration::days(APP_LOG_RETENTION_DAYS)).date_naive();
    let mut removed = 0;
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date_part) = name.strip_prefix("app.") else {
            continue;
        };
        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            removed += 1;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }
    Ok(removed)
}

async fn periodic_cleanup(log_dir: PathBuf) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        interval.tick().await;
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Audit log helper - records issue submissions and status changes
///
/// ```ignore
/// audit_log!("authority:42", "status_change", "issue:P-123", "Pending -> In Progress");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($actor:expr, $action:expr, $resource:expr) => {
        tracing::info!(
            target: "audit",
            actor = %$actor,
            action = %$action,
            resource = %$resource,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "AUDIT"
        );
    };
    ($actor:expr, $action:expr, $resource:expr, $details:expr) => {
        tracing::info!(
            target: "audit",
            actor = %$actor,
            action = %$action,
            resource = %$resource,
            details = %$details,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "AUDIT"
        );
    };
}

/// Security log helper - records security-related events
///
/// ```ignore
/// security_log!(WARN, "zone_mismatch", user_id = "a1", ticket_id = "P-1");
/// ```
#[macro_export]
macro_rules! security_log {
    (WARN, $event:expr, $($arg:tt)*) => {
        tracing::warn!(
            target: "security",
            event = $event,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            $($arg)*
        );
    };
    (INFO, $event:expr, $($arg:tt)*) => {
        tracing::info!(
            target: "security",
            event = $event,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            $($arg)*
        );
    };
}
