//! Anonymous verification sessions
//!
//! A session pairs an [`AnonymousDraft`] with a six-digit code and an
//! absolute expiry. Sessions live in process memory only; a restart drops
//! every pending draft.
//!
//! Each session is removed exactly once: by a successful
//! [`verify_and_consume`](VerificationSessionStore::verify_and_consume), by
//! an expired lookup, by exhausting the retry budget, or by
//! [`sweep_expired`](VerificationSessionStore::sweep_expired). The check and
//! the removal run under the shard lock of the session's map entry, so two
//! callers racing on one id can never both succeed.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::models::AnonymousDraft;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::{CoreError, CoreResult};
use crate::util::generate_code;

/// Default time-to-live for a session
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Wrong-code retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPolicy {
    /// Wrong codes never evict the session
    Unlimited,
    /// The n-th wrong code evicts the session and reports `Expired`
    Max(u32),
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self::Max(5)
    }
}

impl AttemptPolicy {
    /// `0` means unlimited
    pub fn from_limit(limit: u32) -> Self {
        if limit == 0 {
            Self::Unlimited
        } else {
            Self::Max(limit)
        }
    }
}

#[derive(Debug)]
struct Session {
    draft: AnonymousDraft,
    code: String,
    expires_at: i64,
    failed_attempts: u32,
}

/// Newly opened session
///
/// `code` goes to the notifier only; the HTTP caller gets `session_id` and
/// `expires_at`.
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub session_id: String,
    pub code: String,
    pub expires_at: i64,
}

pub struct VerificationSessionStore {
    sessions: DashMap<String, Session>,
    clock: SharedClock,
    ttl: Duration,
    policy: AttemptPolicy,
}

impl VerificationSessionStore {
    pub fn new(clock: SharedClock, ttl: Duration, policy: AttemptPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            ttl,
            policy,
        }
    }

    /// Store a draft under a fresh session id and code
    pub fn open(&self, draft: AnonymousDraft) -> OpenedSession {
        let session_id = uuid::Uuid::new_v4().to_string();
        let code = generate_code();
        let expires_at = self.clock.now_millis() + self.ttl.as_millis() as i64;

        self.sessions.insert(
            session_id.clone(),
            Session {
                draft,
                code: code.clone(),
                expires_at,
                failed_attempts: 0,
            },
        );
        tracing::debug!(session_id = %session_id, expires_at, "Verification session opened");

        OpenedSession {
            session_id,
            code,
            expires_at,
        }
    }

    /// Check the code and remove the session, returning its draft
    ///
    /// Expiry is checked before the code, so a correct code past the TTL
    /// still fails with `Expired`. A wrong code keeps the session unless
    /// the retry budget is exhausted.
    pub fn verify_and_consume(&self, session_id: &str, code: &str) -> CoreResult<AnonymousDraft> {
        let Entry::Occupied(mut entry) = self.sessions.entry(session_id.to_string()) else {
            return Err(CoreError::session_not_found());
        };

        if self.clock.now_millis() >= entry.get().expires_at {
            entry.remove();
            tracing::debug!(session_id = %session_id, "Verification session expired on lookup");
            return Err(CoreError::Expired);
        }

        if entry.get().code == code.trim() {
            let session = entry.remove();
            return Ok(session.draft);
        }

        let failed = {
            let session = entry.get_mut();
            session.failed_attempts += 1;
            session.failed_attempts
        };
        match self.policy {
            AttemptPolicy::Unlimited => Err(CoreError::InvalidCode {
                attempts_left: None,
            }),
            AttemptPolicy::Max(max) if failed >= max => {
                entry.remove();
                crate::security_log!(
                    WARN,
                    "otp_attempts_exhausted",
                    session_id = %session_id,
                    max_attempts = max
                );
                Err(CoreError::Expired)
            }
            AttemptPolicy::Max(max) => Err(CoreError::InvalidCode {
                attempts_left: Some(max - failed),
            }),
        }
    }

    /// Remove every session past its expiry; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use shared::models::{ContactInfo, IssueType};
    use std::sync::Arc;

    fn draft() -> AnonymousDraft {
        AnonymousDraft {
            contact: ContactInfo {
                name: Some("Asha".into()),
                email: "asha@example.com".into(),
                mobile: None,
            },
            issue_type: IssueType::Waste,
            title: None,
            description: "Overflowing bin near the market".into(),
            lat: Some(12.97),
            lng: Some(77.59),
        }
    }

    fn store(policy: AttemptPolicy) -> (Arc<ManualClock>, VerificationSessionStore) {
        let clock = Arc::new(ManualClock::new(1_750_000_000_000));
        let store = VerificationSessionStore::new(clock.clone(), DEFAULT_SESSION_TTL, policy);
        (clock, store)
    }

    #[test]
    fn test_correct_code_returns_draft_once() {
        let (_, store) = store(AttemptPolicy::default());
        let opened = store.open(draft());
        assert_eq!(opened.code.len(), 6);

        let consumed = store.verify_and_consume(&opened.session_id, &opened.code).unwrap();
        assert_eq!(consumed, draft());

        let err = store
            .verify_and_consume(&opened.session_id, &opened.code)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_even_with_correct_code() {
        let (clock, store) = store(AttemptPolicy::default());
        let opened = store.open(draft());

        clock.advance(DEFAULT_SESSION_TTL + Duration::from_secs(1));
        let err = store
            .verify_and_consume(&opened.session_id, &opened.code)
            .unwrap_err();
        assert!(matches!(err, CoreError::Expired));

        // Evicted: a second attempt sees nothing
        let err = store
            .verify_and_consume(&opened.session_id, &opened.code)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let (clock, store) = store(AttemptPolicy::default());
        let opened = store.open(draft());

        clock.advance(DEFAULT_SESSION_TTL - Duration::from_millis(1));
        assert!(store.verify_and_consume(&opened.session_id, &opened.code).is_ok());

        let opened = store.open(draft());
        clock.advance(DEFAULT_SESSION_TTL);
        assert!(matches!(
            store.verify_and_consume(&opened.session_id, &opened.code),
            Err(CoreError::Expired)
        ));
    }

    #[test]
    fn test_wrong_code_keeps_session() {
        let (_, store) = store(AttemptPolicy::Unlimited);
        let opened = store.open(draft());
        let wrong = if opened.code == "000000" { "111111" } else { "000000" };

        for _ in 0..20 {
            let err = store.verify_and_consume(&opened.session_id, wrong).unwrap_err();
            assert!(matches!(err, CoreError::InvalidCode { attempts_left: None }));
        }
        assert!(store.verify_and_consume(&opened.session_id, &opened.code).is_ok());
    }

    #[test]
    fn test_attempt_budget_evicts_on_last_wrong_code() {
        let (_, store) = store(AttemptPolicy::Max(3));
        let opened = store.open(draft());
        let wrong = if opened.code == "000000" { "111111" } else { "000000" };

        assert!(matches!(
            store.verify_and_consume(&opened.session_id, wrong),
            Err(CoreError::InvalidCode { attempts_left: Some(2) })
        ));
        assert!(matches!(
            store.verify_and_consume(&opened.session_id, wrong),
            Err(CoreError::InvalidCode { attempts_left: Some(1) })
        ));
        assert!(matches!(
            store.verify_and_consume(&opened.session_id, wrong),
            Err(CoreError::Expired)
        ));
        assert!(matches!(
            store.verify_and_consume(&opened.session_id, &opened.code),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (clock, store) = store(AttemptPolicy::default());
        store.open(draft());
        store.open(draft());
        clock.advance(Duration::from_secs(5 * 60));
        let fresh = store.open(draft());

        clock.advance(Duration::from_secs(6 * 60));
        assert_eq!(store.sweep_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.verify_and_consume(&fresh.session_id, &fresh.code).is_ok());
    }

    #[test]
    fn test_concurrent_consume_has_single_winner() {
        let (_, store) = store(AttemptPolicy::default());
        let store = Arc::new(store);

        for _ in 0..50 {
            let opened = store.open(draft());
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let id = opened.session_id.clone();
                    let code = opened.code.clone();
                    std::thread::spawn(move || store.verify_and_consume(&id, &code).is_ok())
                })
                .collect();
            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(wins, 1);
        }
    }

    #[test]
    fn test_policy_from_limit() {
        assert_eq!(AttemptPolicy::from_limit(0), AttemptPolicy::Unlimited);
        assert_eq!(AttemptPolicy::from_limit(4), AttemptPolicy::Max(4));
    }
}
