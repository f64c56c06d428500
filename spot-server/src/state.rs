//! Server state
//!
//! One [`ServerState`] is built at startup and cloned into every handler.
//! All members are `Arc`s (or cheap handles), so cloning is shallow.

use std::sync::Arc;

use crate::auth::{JwtConfig, JwtService, RateLimiter};
use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::identity::IdentityResolver;
use crate::lifecycle::IssueLifecycleManager;
use crate::media::MediaStore;
use crate::notify::{LogNotifier, NotificationDispatcher, Notifier, SesNotifier};
use crate::storage::{Storage, StorageError};
use crate::submission::AnonymousIntake;
use crate::ticket::TicketIdGenerator;
use crate::verification::VerificationSessionStore;

#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub jwt: Arc<JwtService>,
    pub sessions: Arc<VerificationSessionStore>,
    pub lifecycle: Arc<IssueLifecycleManager>,
    pub intake: Arc<AnonymousIntake>,
    pub media: Arc<MediaStore>,
    pub rate_limiter: RateLimiter,
}

impl ServerState {
    /// Production wiring: redb on disk, wall clock, SES when configured
    pub async fn initialize(config: Config) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.data_dir).map_err(redb::StorageError::Io)?;
        let storage = Storage::open(config.database_path())?;

        let notifier: Arc<dyn Notifier> = match &config.ses_from_email {
            Some(from) => {
                let aws_config =
                    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
                    let ses_config = aws_config
                        .to_builder()
                        .region(aws_config::Region::new(ses_region))
                        .build();
                    aws_sdk_sesv2::Client::new(&ses_config)
                } else {
                    aws_sdk_sesv2::Client::new(&aws_config)
                };
                tracing::info!(from = %from, "Email notifications via SES");
                Arc::new(SesNotifier::new(ses, from.clone()))
            }
            None => {
                tracing::warn!("SES_FROM_EMAIL not set, notifications are only logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::build(config, storage, Arc::new(SystemClock), notifier))
    }

    /// Assemble the components from explicit parts
    pub fn build(
        config: Config,
        storage: Storage,
        clock: SharedClock,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let jwt = JwtService::with_config(JwtConfig {
            secret: config.jwt_secret.clone(),
            expiration_minutes: config.jwt_expiration_minutes,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
        });

        let sessions = Arc::new(VerificationSessionStore::new(
            clock.clone(),
            config.session_ttl,
            config.session_attempts,
        ));
        let identities = Arc::new(IdentityResolver::new(
            storage.clone(),
            clock.clone(),
            config.default_citizen_zone.clone(),
        ));
        let tickets = Arc::new(TicketIdGenerator::new(clock.clone()));
        let lifecycle = Arc::new(IssueLifecycleManager::new(storage, tickets, clock));
        let intake = Arc::new(AnonymousIntake::new(
            sessions.clone(),
            identities,
            lifecycle.clone(),
            NotificationDispatcher::new(notifier),
            config.anonymous_zone.clone(),
        ));
        let media = Arc::new(MediaStore::new(
            config.upload_dir.clone(),
            config.max_upload_bytes,
        ));
        let rate_limiter = RateLimiter::new(
            config.public_rate_limit,
            config.public_rate_window,
            config.trusted_proxies.clone(),
        );

        Self {
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            sessions,
            lifecycle,
            intake,
            media,
            rate_limiter,
        }
    }

    /// Periodic housekeeping: expired sessions and stale rate-limit windows
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(state.config.session_sweep_interval);
            loop {
                interval.tick().await;
                let removed = state.sessions.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, remaining = state.sessions.len(), "Swept expired sessions");
                }
                state.rate_limiter.cleanup();
            }
        })
    }
}
