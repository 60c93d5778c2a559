//! Poll Registry - Live Poll Storage
//!
//! This module owns the set of live polls. The `PollRegistry` allows the
//! lifecycle manager and the tally engine to:
//!
//! - Register a poll once its message exists
//! - Look a poll up by its message id
//! - Swap the backing store (in-memory by default, JSON file for durability)
//!
//! # Architecture
//!
//! ```text
//!                        PollRegistry (Clone)
//!                     ┌──────────────────────────────┐
//!                     │      Arc<dyn PollStore>      │
//!                     └──────────────┬───────────────┘
//!                                    │
//!                 ┌──────────────────┴──────────────────┐
//!                 │                                     │
//!          ┌──────▼──────┐                      ┌───────▼───────┐
//!          │ MemoryStore │                      │ JsonFileStore │
//!          │  (default)  │                      │ (polls.json)  │
//!          └─────────────┘                      └───────────────┘
//! ```
//!
//! # Thread Safety
//!
//! Records are immutable `Arc<Poll>`s, so the only contention is on the map
//! itself. `MemoryStore` uses `RwLock` so lookups (results requests) run in
//! parallel while inserts (new polls) are serialized.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::poll::{Poll, PollId};

/// Errors from poll storage
#[derive(Debug, Error)]
pub enum StoreError {
    /// A poll with this id is already registered
    #[error("Poll {0} is already registered")]
    DuplicatePoll(PollId),

    /// The store file could not be read
    #[error("Failed to read poll store at {path}: {source}")]
    Read {
        /// Store file path
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// The store file could not be written
    #[error("Failed to write poll store at {path}: {source}")]
    Write {
        /// Store file path
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// The store file does not contain valid polls
    #[error("Corrupt poll store at {path}: {source}")]
    Corrupt {
        /// Store file path
        path: PathBuf,
        /// The underlying parse error
        source: serde_json::Error,
    },
}

/// Backing storage for live polls
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Store name for logging (e.g., "memory")
    fn name(&self) -> &str;

    /// Insert a new poll
    ///
    /// Fails with [`StoreError::DuplicatePoll`] if the id is taken.
    async fn insert(&self, poll: Arc<Poll>) -> Result<(), StoreError>;

    /// Look a poll up by id
    async fn get(&self, id: PollId) -> Result<Option<Arc<Poll>>, StoreError>;

    /// Ids of all stored polls
    async fn ids(&self) -> Result<Vec<PollId>, StoreError>;

    /// Number of stored polls
    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.ids().await?.len())
    }
}

/// Process-memory store; contents are lost on restart
#[derive(Default)]
pub struct MemoryStore {
    polls: RwLock<HashMap<PollId, Arc<Poll>>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, poll: Arc<Poll>) -> Result<(), StoreError> {
        let mut polls = self.polls.write();
        if polls.contains_key(&poll.id) {
            return Err(StoreError::DuplicatePoll(poll.id));
        }
        polls.insert(poll.id, poll);
        Ok(())
    }

    async fn get(&self, id: PollId) -> Result<Option<Arc<Poll>>, StoreError> {
        Ok(self.polls.read().get(&id).cloned())
    }

    async fn ids(&self) -> Result<Vec<PollId>, StoreError> {
        Ok(self.polls.read().keys().copied().collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.polls.read().len())
    }
}

/// Store that mirrors every poll to a JSON file
///
/// The whole file is rewritten through a temporary file and a rename after
/// each insert, so a crash leaves either the old or the new contents.
pub struct JsonFileStore {
    path: PathBuf,
    polls: Mutex<HashMap<PollId, Arc<Poll>>>,
}

impl JsonFileStore {
    /// Open a store, loading any polls already saved at `path`
    ///
    /// A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] or [`StoreError::Corrupt`] if the file
    /// exists but cannot be loaded.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let polls = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let saved: Vec<Poll> =
                    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                saved.into_iter().map(|p| (p.id, Arc::new(p))).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };

        tracing::info!(
            path = %path.display(),
            polls = polls.len(),
            "Opened poll store"
        );

        Ok(Self {
            path,
            polls: Mutex::new(polls),
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, polls: &HashMap<PollId, Arc<Poll>>) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let mut snapshot: Vec<&Poll> = polls.values().map(AsRef::as_ref).collect();
        snapshot.sort_by_key(|p| p.id);
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        Ok(())
    }
}

#[async_trait]
impl PollStore for JsonFileStore {
    fn name(&self) -> &'static str {
        "json-file"
    }

    async fn insert(&self, poll: Arc<Poll>) -> Result<(), StoreError> {
        let mut polls = self.polls.lock().await;
        if polls.contains_key(&poll.id) {
            return Err(StoreError::DuplicatePoll(poll.id));
        }
        let id = poll.id;
        polls.insert(id, poll);

        if let Err(e) = self.persist(&polls).await {
            // Keep memory and disk in agreement
            polls.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, id: PollId) -> Result<Option<Arc<Poll>>, StoreError> {
        Ok(self.polls.lock().await.get(&id).cloned())
    }

    async fn ids(&self) -> Result<Vec<PollId>, StoreError> {
        Ok(self.polls.lock().await.keys().copied().collect())
    }
}

/// Registry of live polls
///
/// Constructed once at start-up and cloned into every component that needs
/// it; clones share the same store.
#[derive(Clone)]
pub struct PollRegistry {
    store: Arc<dyn PollStore>,
}

impl Default for PollRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl PollRegistry {
    /// Create a registry backed by a fresh [`MemoryStore`]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Create a registry over any store
    #[must_use]
    pub fn with_store(store: Arc<dyn PollStore>) -> Self {
        Self { store }
    }

    /// Name of the backing store
    #[must_use]
    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Register a new poll
    ///
    /// Returns the shared record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicatePoll`] if the id is already registered,
    /// or a store-specific IO error.
    pub async fn register(&self, poll: Poll) -> Result<Arc<Poll>, StoreError> {
        let poll = Arc::new(poll);
        self.store.insert(Arc::clone(&poll)).await?;
        tracing::info!(
            poll_id = %poll.id,
            channel = %poll.channel,
            options = poll.options.len(),
            store = self.store.name(),
            "Poll registered"
        );
        Ok(poll)
    }

    /// Look a poll up by id
    ///
    /// # Errors
    ///
    /// Returns a store-specific error if the store cannot be read.
    pub async fn lookup(&self, id: PollId) -> Result<Option<Arc<Poll>>, StoreError> {
        self.store.get(id).await
    }

    /// Number of registered polls
    ///
    /// # Errors
    ///
    /// Returns a store-specific error if the store cannot be read.
    pub async fn count(&self) -> Result<usize, StoreError> {
        self.store.len().await
    }

    /// Ids of all registered polls
    ///
    /// # Errors
    ///
    /// Returns a store-specific error if the store cannot be read.
    pub async fn poll_ids(&self) -> Result<Vec<PollId>, StoreError> {
        self.store.ids().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::{ChannelId, GuildId, MessageId, PollDraft};

    fn make_poll(id: u64) -> Poll {
        let draft = PollDraft::validate(
            "Best fruit?",
            [Some("Apple"), Some("Banana"), Some("Cherry")],
        )
        .unwrap();
        Poll::from_draft(MessageId(id), draft, ChannelId(10), Some(GuildId(20)))
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = PollRegistry::in_memory();
        assert_eq!(registry.count().await.unwrap(), 0);

        let poll = registry.register(make_poll(1)).await.unwrap();
        assert_eq!(registry.count().await.unwrap(), 1);

        let found = registry.lookup(MessageId(1)).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&poll, &found));
        assert!(registry.lookup(MessageId(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let registry = PollRegistry::in_memory();
        registry.register(make_poll(1)).await.unwrap();

        let result = registry.register(make_poll(1)).await;
        assert!(matches!(result, Err(StoreError::DuplicatePoll(MessageId(1)))));
        assert_eq!(registry.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_store() {
        let registry = PollRegistry::in_memory();
        let clone = registry.clone();
        registry.register(make_poll(5)).await.unwrap();
        assert!(clone.lookup(MessageId(5)).await.unwrap().is_some());
        assert_eq!(clone.store_name(), "memory");
    }

    #[tokio::test]
    async fn test_separate_registries_are_isolated() {
        let a = PollRegistry::in_memory();
        let b = PollRegistry::in_memory();
        a.register(make_poll(1)).await.unwrap();
        assert!(b.lookup(MessageId(1)).await.unwrap().is_none());
    }

    // ========================================
    // Concurrent Registration Tests
    // ========================================

    #[tokio::test]
    async fn test_concurrent_register_and_lookup() {
        use tokio::task::JoinSet;

        let registry = PollRegistry::in_memory();
        let mut join_set = JoinSet::new();

        for id in 0..20 {
            let registry = registry.clone();
            join_set.spawn(async move {
                registry.register(make_poll(id)).await.unwrap();
                registry.lookup(MessageId(id)).await.unwrap().is_some()
            });
        }

        while let Some(result) = join_set.join_next().await {
            assert!(result.unwrap());
        }

        let mut ids = registry.poll_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, (0..20).map(MessageId).collect::<Vec<_>>());
    }

    // ========================================
    // JSON File Store Tests
    // ========================================

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("polls.json");

        {
            let store = JsonFileStore::open(&path).await.unwrap();
            let registry = PollRegistry::with_store(Arc::new(store));
            registry.register(make_poll(7)).await.unwrap();
            registry.register(make_poll(3)).await.unwrap();
        }

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        let poll = reopened.get(MessageId(7)).await.unwrap().unwrap();
        assert_eq!(*poll, make_poll(7));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polls.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = JsonFileStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_file_store_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("polls.json"))
            .await
            .unwrap();
        store.insert(Arc::new(make_poll(1))).await.unwrap();
        let result = store.insert(Arc::new(make_poll(1))).await;
        assert!(matches!(result, Err(StoreError::DuplicatePoll(_))));
    }
}
