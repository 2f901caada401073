use crate::app::ports::{DocumentRepository, InsertOutcome, Publisher};
use crate::domain::{DocumentBatch, DocumentKind};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::task_queue::Job;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Terminal state of one write-and-publish unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Nothing new to store; nothing published.
    Skipped,
    /// Stored and announced; carries the number of documents written.
    Published(usize),
    /// Store rejected the batch or was unreachable; nothing published.
    WriteFailed,
    /// Stored, but the notification could not be sent.
    PublishFailed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitReport {
    pub kind: DocumentKind,
    pub page: u32,
    pub outcome: UnitOutcome,
}

/// Ensures the index, filters out stored documents, inserts the rest and
/// publishes exactly what was inserted.
pub struct WriteAndPublish {
    page: u32,
    batch: DocumentBatch,
    repository: Arc<dyn DocumentRepository>,
    publisher: Arc<dyn Publisher>,
}

impl WriteAndPublish {
    pub fn new(
        page: u32,
        batch: DocumentBatch,
        repository: Arc<dyn DocumentRepository>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self { page, batch, repository, publisher }
    }

    #[instrument(
        skip(self),
        fields(page = self.page, kind = %self.batch.kind(), size = self.batch.len())
    )]
    pub async fn execute(&self) -> UnitOutcome {
        let kind = self.batch.kind();

        if let Err(e) = self.ensure_index(kind).await {
            error!("Failed to ensure {} index: {}", kind, e);
            metrics::writer::write_failed(kind);
            return UnitOutcome::WriteFailed;
        }

        let fresh = match self.new_documents().await {
            Ok(fresh) => fresh,
            Err(e) => {
                error!("Existence check failed for {} batch: {}", kind, e);
                metrics::writer::write_failed(kind);
                return UnitOutcome::WriteFailed;
            }
        };

        if fresh.is_empty() {
            debug!("All {} documents already stored, skipping", kind);
            metrics::writer::skipped(kind);
            return UnitOutcome::Skipped;
        }

        let created = match self.repository.insert_batch(&fresh).await {
            Ok(InsertOutcome::Created(created)) => created,
            Ok(InsertOutcome::Rejected) => {
                warn!("Repository rejected {} batch of {}", kind, fresh.len());
                metrics::writer::write_failed(kind);
                return UnitOutcome::WriteFailed;
            }
            Err(e) => {
                error!("Insert of {} batch failed: {}", kind, e);
                metrics::writer::write_failed(kind);
                return UnitOutcome::WriteFailed;
            }
        };

        if created.is_empty() {
            debug!("Every {} document was stored by another writer, skipping", kind);
            metrics::writer::skipped(kind);
            return UnitOutcome::Skipped;
        }

        let written = created.len();
        match self.publisher.publish(kind.topic(), &created).await {
            Ok(()) => {
                info!("Wrote and published {} {} documents", written, kind);
                metrics::writer::published(kind, written);
                UnitOutcome::Published(written)
            }
            Err(e) => {
                error!("Wrote {} {} documents but publish failed: {}", written, kind, e);
                metrics::writer::publish_failed(kind, written);
                UnitOutcome::PublishFailed(written)
            }
        }
    }

    async fn ensure_index(&self, kind: DocumentKind) -> Result<()> {
        if !self.repository.index_exists(kind).await? {
            info!("Creating {} index", kind);
            self.repository.create_index(kind, &kind.mapping()).await?;
        }
        Ok(())
    }

    async fn new_documents(&self) -> Result<DocumentBatch> {
        if self.batch.is_empty() {
            return Ok(self.batch.clone());
        }
        let existing = self
            .repository
            .existing_ids(self.batch.kind(), &self.batch.ids())
            .await?;
        Ok(self.batch.without_ids(&existing))
    }
}

#[async_trait]
impl Job for WriteAndPublish {
    type Output = UnitReport;

    async fn run(&self) -> UnitReport {
        UnitReport {
            kind: self.batch.kind(),
            page: self.page,
            outcome: self.execute().await,
        }
    }
}
