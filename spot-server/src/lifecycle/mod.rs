//! Issue lifecycle: who may move an issue where, and the manager that
//! applies those rules atomically against storage.

mod actor;
mod manager;

pub use actor::{Actor, Edge};
pub use manager::{IssueLifecycleManager, TransitionExtra};
