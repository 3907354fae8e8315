use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::{LinkEntry, NewQueueItem, QueueItem, RegisteredFeed};

#[derive(Debug, Clone)]
pub struct InsertOutcome {
    pub entry: LinkEntry,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub item: QueueItem,
    pub already_queued: bool,
}

/// Queryable store of processed links, deduplicated by normalized URL.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn find_by_normalized(&self, key: &str) -> Result<Option<LinkEntry>, StoreError>;

    /// Insert an entry unless one with the same normalized URL already
    /// exists; on a hit the existing entry is returned untouched.
    async fn insert(&self, entry: LinkEntry) -> Result<InsertOutcome, StoreError>;

    /// All entries, most recent first.
    async fn list(&self, limit: Option<i64>) -> Result<Vec<LinkEntry>, StoreError>;
}

/// Holding area for submissions that could not be evaluated immediately.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Enqueue unless an item with the same normalized URL is already
    /// waiting; on a hit the existing item is returned untouched.
    async fn enqueue(&self, item: NewQueueItem) -> Result<EnqueueOutcome, StoreError>;

    /// Bump the attempt counter and stamp the latest error.
    async fn record_attempt(&self, id: &str, error: &str)
    -> Result<Option<QueueItem>, StoreError>;

    async fn remove(&self, id: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<QueueItem>, StoreError>;
}

/// Registry of feeds revisited by the scheduled poller.
#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// Register a feed URL, refreshing the stored title when the live
    /// feed's title has drifted.
    async fn upsert(&self, url: &str, title: &str) -> Result<RegisteredFeed, StoreError>;

    async fn list(&self) -> Result<Vec<RegisteredFeed>, StoreError>;
}
