//! Ticket id generation
//!
//! Format: `<prefix>-<suffix>`, e.g. `P-8847360004217`.
//!
//! - prefix: `P` pothole, `W` waste, `X` anything else
//! - suffix: decimal, `seconds_since_2024 * 1000 + n`
//!
//! The suffix is strictly increasing within a process: each call takes
//! `max(last + 1, now_units)` through a CAS loop, so concurrent callers never
//! observe the same value. Bursts above 1000/s borrow from the next second.
//! Across restarts uniqueness rests on the clock; the storage layer still
//! rejects a duplicate and the caller regenerates.

use std::sync::atomic::{AtomicU64, Ordering};

use shared::models::IssueType;

use crate::clock::SharedClock;

/// 2024-01-01T00:00:00Z in Unix milliseconds
const EPOCH_MILLIS: i64 = 1_704_067_200_000;
const SLOTS_PER_SECOND: u64 = 1000;

pub fn type_prefix(issue_type: IssueType) -> &'static str {
    match issue_type {
        IssueType::Pothole => "P",
        IssueType::Waste => "W",
        IssueType::Other => "X",
    }
}

pub struct TicketIdGenerator {
    clock: SharedClock,
    last: AtomicU64,
}

impl TicketIdGenerator {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            last: AtomicU64::new(0),
        }
    }

    pub fn generate(&self, issue_type: IssueType) -> String {
        let suffix = self.next_suffix();
        format!("{}-{}", type_prefix(issue_type), suffix)
    }

    fn next_suffix(&self) -> u64 {
        let secs = (self.clock.now_millis() - EPOCH_MILLIS).max(0) as u64 / 1000;
        let floor = secs * SLOTS_PER_SECOND;

        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = floor.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}
