use crate::domain::{DocumentBatch, DocumentKind};
use crate::error::Result;
use crate::types::{FeedPage, PageQuery};
use async_trait::async_trait;
use std::collections::HashSet;

// Feed-side port
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch one page of results. Implementations own their retry policy.
    async fn fetch_page(&self, query: &PageQuery) -> Result<FeedPage>;
}

// Storage-side port
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn index_exists(&self, kind: DocumentKind) -> Result<bool>;

    async fn create_index(&self, kind: DocumentKind, mapping: &serde_json::Value) -> Result<()>;

    /// The subset of `ids` already stored for `kind`.
    async fn existing_ids(&self, kind: DocumentKind, ids: &[String]) -> Result<HashSet<String>>;

    /// True when every document of a non-empty batch is already stored.
    async fn batch_exists(&self, batch: &DocumentBatch) -> Result<bool> {
        if batch.is_empty() {
            return Ok(false);
        }
        let ids = batch.ids();
        let existing = self.existing_ids(batch.kind(), &ids).await?;
        Ok(ids.iter().all(|id| existing.contains(id)))
    }

    /// Create-only insert. Documents another writer stored first are left
    /// out of the returned batch.
    async fn insert_batch(&self, batch: &DocumentBatch) -> Result<InsertOutcome>;
}

/// What one `insert_batch` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The documents this call created.
    Created(DocumentBatch),
    /// The store refused the batch.
    Rejected,
}

// Notification port
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, batch: &DocumentBatch) -> Result<()>;
}
