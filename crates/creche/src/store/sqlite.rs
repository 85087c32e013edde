//! `SQLite`-backed document store.
//!
//! Every `transact` call runs inside a `BEGIN IMMEDIATE` transaction, so the
//! write lock is held from the read until the commit. Writers on other
//! connections wait up to the configured busy timeout instead of racing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use super::{
    apply_action, migrations, Collection, Document, DocumentStore, StoreError, StoreResult,
    TxAction, TxOutcome,
};

/// Default time a writer waits for a competing transaction to finish.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const IN_MEMORY_PATH: &str = ":memory:";

/// File-backed document store.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// Creates parent directories as needed and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created, or
    /// schema initialization fails.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening document store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;

        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrations::initialize_schema(&conn)?;

        info!("Document store opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store, private to this instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(IN_MEMORY_PATH),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(IN_MEMORY_PATH),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count documents in a collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self, collection: Collection) -> StoreResult<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn read(conn: &Connection, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
        let row = conn
            .query_row(
                r"
                SELECT key, body, created_at, updated_at
                FROM documents WHERE collection = ?1 AND key = ?2
                ",
                params![collection.as_str(), key],
                Self::row_to_raw,
            )
            .optional()?;

        row.map(|raw| raw.into_document(collection)).transpose()
    }

    fn insert(conn: &Connection, doc: &Document) -> rusqlite::Result<usize> {
        conn.execute(
            r"
            INSERT INTO documents (collection, key, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                doc.collection.as_str(),
                doc.key,
                doc.body.to_string(),
                format_timestamp(doc.created_at),
                format_timestamp(doc.updated_at),
            ],
        )
    }

    fn update(conn: &Connection, doc: &Document) -> rusqlite::Result<usize> {
        conn.execute(
            r"
            UPDATE documents SET body = ?3, updated_at = ?4
            WHERE collection = ?1 AND key = ?2
            ",
            params![
                doc.collection.as_str(),
                doc.key,
                doc.body.to_string(),
                format_timestamp(doc.updated_at),
            ],
        )
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
        Ok(RawRow {
            key: row.get(0)?,
            body: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
        let conn = self.conn.lock();
        Self::read(&conn, collection, key)
    }

    fn transact(
        &self,
        collection: Collection,
        key: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> TxAction,
    ) -> StoreResult<TxOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = Self::read(&tx, collection, key)?;
        let action = decide(existing.as_ref());
        // Timestamps are persisted with microsecond precision.
        let now = Utc::now().trunc_subsecs(6);
        let Some(next) = apply_action(collection, key, existing.as_ref(), action, now)? else {
            debug!("Transaction on {}/{} aborted by caller", collection, key);
            return Ok(TxOutcome::Aborted(existing));
        };

        if existing.is_some() {
            Self::update(&tx, &next)?;
        } else {
            match Self::insert(&tx, &next) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.code == ErrorCode::ConstraintViolation =>
                {
                    let current = Self::read(&tx, collection, key)?;
                    debug!("Insert of {}/{} lost to a concurrent writer", collection, key);
                    return Ok(TxOutcome::Aborted(current));
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit()?;
        Ok(TxOutcome::Committed(next))
    }

    fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r"
            SELECT key, body, created_at, updated_at
            FROM documents
            WHERE collection = ?1 AND json_extract(body, ?2) = ?3
            ORDER BY key ASC
            ",
        )?;

        let path = format!("$.{field}");
        let rows = stmt
            .query_map(params![collection.as_str(), path, value], Self::row_to_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|raw| raw.into_document(collection))
            .collect()
    }
}

/// A row as read from `SQLite`, before parsing.
struct RawRow {
    key: String,
    body: String,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn into_document(self, collection: Collection) -> StoreResult<Document> {
        let corrupt = |key: &str, message: String| StoreError::Corrupt {
            collection: collection.as_str().to_string(),
            key: key.to_string(),
            message,
        };

        let body = serde_json::from_str(&self.body)
            .map_err(|e| corrupt(&self.key, format!("unreadable body: {e}")))?;
        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| corrupt(&self.key, format!("bad created_at `{}`", self.created_at)))?;
        let updated_at = parse_timestamp(&self.updated_at)
            .ok_or_else(|| corrupt(&self.key, format!("bad updated_at `{}`", self.updated_at)))?;

        Ok(Document {
            collection,
            key: self.key,
            body,
            created_at,
            updated_at,
        })
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test store")
    }

    fn write_if_absent(body: serde_json::Value) -> impl FnMut(Option<&Document>) -> TxAction {
        move |existing| {
            if existing.is_some() {
                TxAction::Abort
            } else {
                TxAction::Write(body.clone())
            }
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = SqliteStore::open_in_memory();
        assert!(store.is_ok());
        assert_eq!(store.unwrap().path(), Path::new(":memory:"));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = create_test_store();
        assert!(store.get(Collection::Children, "nope").unwrap().is_none());
    }

    #[test]
    fn test_transact_creates_then_aborts() {
        let store = create_test_store();
        let mut decide = write_if_absent(json!({"name": "Ana"}));

        let first = store
            .transact(Collection::Children, "k1", &mut decide)
            .unwrap();
        let TxOutcome::Committed(doc) = first else {
            panic!("expected first write to commit");
        };
        assert_eq!(doc.field_str("name"), Some("Ana"));

        let second = store
            .transact(Collection::Children, "k1", &mut decide)
            .unwrap();
        assert!(matches!(second, TxOutcome::Aborted(Some(ref d)) if d.key == "k1"));
        assert_eq!(store.count(Collection::Children).unwrap(), 1);
    }

    #[test]
    fn test_same_key_in_other_collection_is_independent() {
        let store = create_test_store();
        let mut decide = write_if_absent(json!({"v": 1}));

        store
            .transact(Collection::Children, "shared", &mut decide)
            .unwrap();
        let outcome = store
            .transact(Collection::Attendance, "shared", &mut decide)
            .unwrap();
        assert!(matches!(outcome, TxOutcome::Committed(_)));
    }

    #[test]
    fn test_roundtrip_preserves_timestamps() {
        let store = create_test_store();
        let TxOutcome::Committed(written) = store
            .transact(Collection::Children, "k", &mut |_| {
                TxAction::Write(json!({"a": 1}))
            })
            .unwrap()
        else {
            panic!("expected commit");
        };

        let read = store.get(Collection::Children, "k").unwrap().unwrap();
        assert_eq!(read.created_at, written.created_at);
        assert_eq!(read.updated_at, written.updated_at);
        assert_eq!(read.body, json!({"a": 1}));
    }

    #[test]
    fn test_merge_updates_existing_body() {
        let store = create_test_store();
        store
            .transact(Collection::Children, "k", &mut |_| {
                TxAction::Write(json!({"name": "Ana", "allergies": ["egg"]}))
            })
            .unwrap();
        store
            .transact(Collection::Children, "k", &mut |_| {
                TxAction::Merge(json!({"name": "Anna"}))
            })
            .unwrap();

        let read = store.get(Collection::Children, "k").unwrap().unwrap();
        assert_eq!(read.body, json!({"name": "Anna", "allergies": ["egg"]}));
        assert!(read.updated_at >= read.created_at);
    }

    #[test]
    fn test_find_by_field_filters_and_orders() {
        let store = create_test_store();
        for (key, parent) in [("b", "P1"), ("a", "P1"), ("c", "P2")] {
            store
                .transact(Collection::Children, key, &mut |_| {
                    TxAction::Write(json!({ "parentId": parent }))
                })
                .unwrap();
        }

        let found = store
            .find_by_field(Collection::Children, "parentId", "P1")
            .unwrap();
        let keys: Vec<&str> = found.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let store = create_test_store();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO documents VALUES ('children', 'bad', '{', 'x', 'y')",
                [],
            )
            .unwrap();

        let err = store.get(Collection::Children, "bad").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_open_file_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("creche.db");

        let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creche.db");

        {
            let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
            store
                .transact(Collection::Children, "k", &mut |_| {
                    TxAction::Write(json!({"name": "Ana"}))
                })
                .unwrap();
        }

        let reopened = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert!(reopened.get(Collection::Children, "k").unwrap().is_some());
    }

    #[test]
    fn test_concurrent_connections_create_exactly_once() {
        const WRITERS: usize = 6;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");

        let stores: Vec<SqliteStore> = (0..WRITERS)
            .map(|_| SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap())
            .collect();
        let barrier = Arc::new(Barrier::new(WRITERS));

        let handles: Vec<_> = stores
            .into_iter()
            .enumerate()
            .map(|(i, store)| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut decide = write_if_absent(json!({ "writer": i }));
                    barrier.wait();
                    store
                        .transact(Collection::Children, "contested", &mut decide)
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<TxOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let committed: Vec<&Document> = outcomes
            .iter()
            .filter_map(|o| match o {
                TxOutcome::Committed(doc) => Some(doc),
                TxOutcome::Aborted(_) => None,
            })
            .collect();
        assert_eq!(committed.len(), 1);

        let stored = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT)
            .unwrap()
            .get(Collection::Children, "contested")
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, committed[0].body);
    }
}
