//! Document store abstraction for creche.
//!
//! Records live as JSON documents addressed by `(collection, key)`. The store
//! is the only component that provides atomicity: [`DocumentStore::transact`]
//! reads one key, lets the caller decide what to do with it, and writes the
//! result without any other transaction on the same key interleaving.
//!
//! Two implementations are provided:
//! - [`SqliteStore`] — file-backed, safe across connections and processes.
//! - [`MemoryStore`] — in-process, sharded by a hash of the key.

pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors raised by a document store.
///
/// Every variant is an infrastructure failure from the caller's point of
/// view; key conflicts are reported through [`TxOutcome::Aborted`] instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    Open {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to create the directory holding the database.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A database statement failed.
    #[error("database query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A document body could not be encoded or decoded.
    #[error("invalid document body: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("database migration failed: {message}")]
    Migration {
        /// Description of what went wrong.
        message: String,
    },

    /// A stored row could not be turned back into a document.
    #[error("corrupt document {collection}/{key}: {message}")]
    Corrupt {
        /// Collection of the offending row.
        collection: String,
        /// Key of the offending row.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// A write was attempted with a body that is not a JSON object.
    #[error("document {collection}/{key} must be a JSON object")]
    NotAnObject {
        /// Target collection.
        collection: Collection,
        /// Target key.
        key: String,
    },

    /// The store refused a write that the caller expected to commit.
    #[error("transaction on {collection}/{key} was aborted by the store")]
    Conflict {
        /// Target collection.
        collection: Collection,
        /// Target key.
        key: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Named document collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Child profiles, keyed by the derived child key.
    Children,
    /// Daily attendance marks, keyed by child id and date.
    Attendance,
}

impl Collection {
    /// Name used for this collection in persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Children => "children",
            Self::Attendance => "attendance",
        }
    }

    /// Parse a persisted collection name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "children" => Some(Self::Children),
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document with its server-assigned timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Collection the document belongs to.
    pub collection: Collection,
    /// Unique key within the collection.
    pub key: String,
    /// JSON object body.
    pub body: Value,
    /// Set once, when the document is first written.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every write.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Get a top-level string field from the body.
    #[must_use]
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }
}

/// What a transaction should do with the document it read.
#[derive(Debug, Clone, PartialEq)]
pub enum TxAction {
    /// Leave the key untouched.
    Abort,
    /// Replace the body (or create the document).
    Write(Value),
    /// Merge top-level fields into the existing body (or create it).
    Merge(Value),
}

/// Result of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    /// The write was committed; holds the document as stored.
    Committed(Document),
    /// Nothing was written; holds the document that was current at the time.
    Aborted(Option<Document>),
}

/// A document store with single-key atomic read-modify-write.
pub trait DocumentStore: Send + Sync {
    /// Point read by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the row is corrupt.
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>>;

    /// Read `key`, pass the current document to `decide` and apply its action.
    ///
    /// The read and the write are atomic with respect to every other
    /// `transact` call on the same key, in this process or any other process
    /// sharing the backing storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the commit fails.
    fn transact(
        &self,
        collection: Collection,
        key: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> TxAction,
    ) -> StoreResult<TxOutcome>;

    /// All documents whose top-level string `field` equals `value`, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or a row is corrupt.
    fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<Document>>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
        (**self).get(collection, key)
    }

    fn transact(
        &self,
        collection: Collection,
        key: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> TxAction,
    ) -> StoreResult<TxOutcome> {
        (**self).transact(collection, key, decide)
    }

    fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<Document>> {
        (**self).find_by_field(collection, field, value)
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
        (**self).get(collection, key)
    }

    fn transact(
        &self,
        collection: Collection,
        key: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> TxAction,
    ) -> StoreResult<TxOutcome> {
        (**self).transact(collection, key, decide)
    }

    fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<Document>> {
        (**self).find_by_field(collection, field, value)
    }
}

/// Compute the document a transaction action produces.
///
/// Returns `None` for [`TxAction::Abort`]. `created_at` survives rewrites of
/// an existing document; `updated_at` is always `now`.
pub(crate) fn apply_action(
    collection: Collection,
    key: &str,
    existing: Option<&Document>,
    action: TxAction,
    now: DateTime<Utc>,
) -> StoreResult<Option<Document>> {
    let body = match action {
        TxAction::Abort => return Ok(None),
        TxAction::Write(body) => body,
        TxAction::Merge(patch) => match existing {
            Some(current) => merge_bodies(&current.body, patch),
            None => patch,
        },
    };

    if !body.is_object() {
        return Err(StoreError::NotAnObject {
            collection,
            key: key.to_string(),
        });
    }

    Ok(Some(Document {
        collection,
        key: key.to_string(),
        body,
        created_at: existing.map_or(now, |current| current.created_at),
        updated_at: now,
    }))
}

/// Shallow merge: top-level fields of `patch` replace those of `base`.
fn merge_bodies(base: &Value, patch: Value) -> Value {
    let Value::Object(patch_fields) = patch else {
        return patch;
    };
    let mut merged: Map<String, Value> = base.as_object().cloned().unwrap_or_default();
    for (field, value) in patch_fields {
        merged.insert(field, value);
    }
    Value::Object(merged)
}
