//! redb-based storage for issues and identities
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `issues` | `ticket_id` | `Issue` (JSON) | Issue records |
//! | `issues_by_reporter` | `(reporter_id, ticket_id)` | `()` | "My reports" index |
//! | `create_requests` | `client_request_id` | `ticket_id` | Create idempotency |
//! | `identities` | `identity_id` | `Identity` (JSON) | People |
//! | `identity_email` | `(role, email)` | `identity_id` | Uniqueness constraint |
//!
//! # Atomicity
//!
//! redb admits a single write transaction at a time. Every mutation below
//! reads, checks and writes inside one write transaction, so uniqueness
//! checks and status transitions are evaluated against the state they
//! commit over. A failed check aborts the transaction and leaves the store
//! untouched.

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use shared::models::{Identity, Issue, Role};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// key = ticket_id, value = JSON-serialized Issue
const ISSUES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("issues");

/// key = (reporter_id, ticket_id), value = empty (index)
const REPORTER_INDEX_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("issues_by_reporter");

/// key = client_request_id, value = ticket_id
const CREATE_REQUESTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("create_requests");

/// key = identity_id, value = JSON-serialized Identity
const IDENTITIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");

/// key = (role, email), value = identity_id
const IDENTITY_EMAIL_TABLE: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("identity_email");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unique key already taken
    #[error("Duplicate key: {0}")]
    Duplicate(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of [`Storage::insert_issue`]
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// The client request id was already used; holds the issue it created
    Replayed(Issue),
}

/// Issue and identity storage backed by redb
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests, ephemeral runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ISSUES_TABLE)?;
            let _ = write_txn.open_table(REPORTER_INDEX_TABLE)?;
            let _ = write_txn.open_table(CREATE_REQUESTS_TABLE)?;
            let _ = write_txn.open_table(IDENTITIES_TABLE)?;
            let _ = write_txn.open_table(IDENTITY_EMAIL_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Issues ==========

    /// Insert a new issue
    ///
    /// Fails with [`StorageError::Duplicate`] if the ticket id is taken.
    /// When `client_request_id` was seen before, nothing is written and the
    /// issue created by the first request is returned instead.
    pub fn insert_issue(
        &self,
        issue: &Issue,
        client_request_id: Option<&str>,
    ) -> StorageResult<InsertOutcome> {
        let txn = self.db.begin_write()?;

        if let Some(request_id) = client_request_id {
            let previous = {
                let requests = txn.open_table(CREATE_REQUESTS_TABLE)?;
                requests.get(request_id)?.map(|g| g.value().to_string())
            };
            if let Some(ticket_id) = previous {
                let existing = Self::read_issue(&txn, &ticket_id)?;
                txn.abort()?;
                return match existing {
                    Some(existing) => Ok(InsertOutcome::Replayed(existing)),
                    None => Err(StorageError::Duplicate(format!(
                        "request {request_id} points at missing ticket {ticket_id}"
                    ))),
                };
            }
        }

        let taken = {
            let issues = txn.open_table(ISSUES_TABLE)?;
            issues.get(issue.ticket_id.as_str())?.is_some()
        };
        if taken {
            txn.abort()?;
            return Err(StorageError::Duplicate(issue.ticket_id.clone()));
        }

        Self::write_issue(&txn, issue)?;
        {
            let mut index = txn.open_table(REPORTER_INDEX_TABLE)?;
            index.insert((issue.reporter_id.as_str(), issue.ticket_id.as_str()), ())?;
            if let Some(request_id) = client_request_id {
                let mut requests = txn.open_table(CREATE_REQUESTS_TABLE)?;
                requests.insert(request_id, issue.ticket_id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(InsertOutcome::Inserted)
    }

    /// Read-modify-write one issue inside a single write transaction
    ///
    /// `apply` receives the committed state (`None` if the ticket is unknown)
    /// and returns the record to store. If it returns `Err`, the transaction
    /// is aborted and nothing changes.
    pub fn update_issue<E, F>(&self, ticket_id: &str, apply: F) -> Result<Issue, E>
    where
        E: From<StorageError>,
        F: FnOnce(Option<Issue>) -> Result<Issue, E>,
    {
        let txn = self.db.begin_write().map_err(StorageError::from)?;
        let current = Self::read_issue(&txn, ticket_id)?;

        match apply(current) {
            Ok(updated) => {
                debug_assert_eq!(updated.ticket_id, ticket_id);
                Self::write_issue(&txn, &updated)?;
                txn.commit().map_err(StorageError::from)?;
                Ok(updated)
            }
            Err(e) => {
                txn.abort().map_err(StorageError::from)?;
                Err(e)
            }
        }
    }

    pub fn get_issue(&self, ticket_id: &str) -> StorageResult<Option<Issue>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ISSUES_TABLE)?;
        match table.get(ticket_id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Issues reported by one identity
    pub fn list_issues_by_reporter(&self, reporter_id: &str) -> StorageResult<Vec<Issue>> {
        let txn = self.db.begin_read()?;
        let ticket_ids: Vec<String> = {
            let index = txn.open_table(REPORTER_INDEX_TABLE)?;
            let mut ids = Vec::new();
            for entry in index.range((reporter_id, "")..)? {
                let (key, _) = entry?;
                let (owner, ticket_id) = key.value();
                if owner != reporter_id {
                    break;
                }
                ids.push(ticket_id.to_string());
            }
            ids
        };

        let table = txn.open_table(ISSUES_TABLE)?;
        let mut issues = Vec::with_capacity(ticket_ids.len());
        for ticket_id in ticket_ids {
            if let Some(guard) = table.get(ticket_id.as_str())? {
                issues.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(issues)
    }

    /// Every issue, optionally restricted to one zone
    pub fn list_issues(&self, zone: Option<&str>) -> StorageResult<Vec<Issue>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ISSUES_TABLE)?;
        let mut issues = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let issue: Issue = serde_json::from_slice(value.value())?;
            if zone.is_none_or(|z| issue.zone == z) {
                issues.push(issue);
            }
        }
        Ok(issues)
    }

    pub fn issue_count(&self) -> StorageResult<u64> {
        use redb::ReadableTableMetadata;
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ISSUES_TABLE)?;
        Ok(table.len()?)
    }

    // ========== Identities ==========

    /// Insert a new identity
    ///
    /// Fails with [`StorageError::Duplicate`] if `(role, email)` is taken.
    pub fn insert_identity(&self, identity: &Identity) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        let taken = {
            let mut by_email = txn.open_table(IDENTITY_EMAIL_TABLE)?;
            let key = (identity.role.as_str(), identity.email.as_str());
            if by_email.get(key)?.is_some() {
                true
            } else {
                by_email.insert(key, identity.id.as_str())?;
                let mut identities = txn.open_table(IDENTITIES_TABLE)?;
                let json = serde_json::to_vec(identity)?;
                identities.insert(identity.id.as_str(), json.as_slice())?;
                false
            }
        };

        if taken {
            txn.abort()?;
            return Err(StorageError::Duplicate(format!(
                "{}:{}",
                identity.role, identity.email
            )));
        }
        txn.commit()?;
        Ok(())
    }

    pub fn find_identity_by_email(
        &self,
        role: Role,
        email: &str,
    ) -> StorageResult<Option<Identity>> {
        let txn = self.db.begin_read()?;
        let id = {
            let by_email = txn.open_table(IDENTITY_EMAIL_TABLE)?;
            by_email
                .get((role.as_str(), email))?
                .map(|g| g.value().to_string())
        };
        match id {
            Some(id) => Self::read_identity(&txn, &id),
            None => Ok(None),
        }
    }

    // ========== Helpers ==========

    fn read_issue(txn: &WriteTransaction, ticket_id: &str) -> StorageResult<Option<Issue>> {
        let table = txn.open_table(ISSUES_TABLE)?;
        let issue = match table.get(ticket_id)? {
            Some(guard) => Some(serde_json::from_slice(guard.value())?),
            None => None,
        };
        Ok(issue)
    }

    fn write_issue(txn: &WriteTransaction, issue: &Issue) -> StorageResult<()> {
        let mut table = txn.open_table(ISSUES_TABLE)?;
        let json = serde_json::to_vec(issue)?;
        table.insert(issue.ticket_id.as_str(), json.as_slice())?;
        Ok(())
    }

    fn read_identity(txn: &ReadTransaction, id: &str) -> StorageResult<Option<Identity>> {
        let table = txn.open_table(IDENTITIES_TABLE)?;
        let identity = match table.get(id)? {
            Some(guard) => Some(serde_json::from_slice(guard.value())?),
            None => None,
        };
        Ok(identity)
    }
}
