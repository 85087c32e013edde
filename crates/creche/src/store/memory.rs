//! In-process document store.
//!
//! Documents are spread over a fixed number of shards, each behind its own
//! mutex. The shard for a key is picked from a BLAKE3 hash of
//! `collection/key`, so every transaction on one key serializes on one lock
//! while unrelated keys mostly proceed in parallel.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    apply_action, Collection, Document, DocumentStore, StoreResult, TxAction, TxOutcome,
};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

type Shard = HashMap<(Collection, String), Document>;

/// Sharded in-memory document store.
#[derive(Debug)]
pub struct MemoryStore {
    shards: Vec<Mutex<Shard>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with [`DEFAULT_SHARDS`] shards.
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create an empty store with `count` shards (at least one).
    #[must_use]
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Total number of documents across all collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Check if the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_index(&self, collection: Collection, key: &str) -> usize {
        let mut hasher = blake3::Hasher::new();
        hasher.update(collection.as_str().as_bytes());
        hasher.update(b"/");
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        let value = u64::from_le_bytes(prefix);
        let count = u64::try_from(self.shards.len()).unwrap_or(u64::MAX);
        usize::try_from(value % count).unwrap_or(0)
    }

    fn shard(&self, collection: Collection, key: &str) -> &Mutex<Shard> {
        &self.shards[self.shard_index(collection, key)]
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Document>> {
        let shard = self.shard(collection, key).lock();
        Ok(shard.get(&(collection, key.to_string())).cloned())
    }

    fn transact(
        &self,
        collection: Collection,
        key: &str,
        decide: &mut dyn FnMut(Option<&Document>) -> TxAction,
    ) -> StoreResult<TxOutcome> {
        let map_key = (collection, key.to_string());
        let mut shard = self.shard(collection, key).lock();

        let existing = shard.get(&map_key);
        let action = decide(existing);
        let Some(next) = apply_action(collection, key, existing, action, Utc::now())? else {
            debug!("Transaction on {}/{} aborted by caller", collection, key);
            return Ok(TxOutcome::Aborted(existing.cloned()));
        };

        shard.insert(map_key, next.clone());
        Ok(TxOutcome::Committed(next))
    }

    fn find_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> StoreResult<Vec<Document>> {
        let mut found: Vec<Document> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .values()
                    .filter(|doc| doc.collection == collection && doc.field_str(field) == Some(value))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }
}
