use crate::app::ports::{DocumentRepository, InsertOutcome};
use crate::domain::{DocumentBatch, DocumentKind};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory document store for dry runs and tests.
#[derive(Default)]
pub struct InMemoryRepository {
    indexes: Arc<Mutex<HashMap<DocumentKind, serde_json::Value>>>,
    documents: Arc<Mutex<HashMap<DocumentKind, HashMap<String, serde_json::Value>>>>,
    failing_kinds: Arc<Mutex<HashSet<DocumentKind>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later insert of `kind` report failure.
    pub fn fail_inserts_for(&self, kind: DocumentKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    pub fn count(&self, kind: DocumentKind) -> usize {
        self.documents
            .lock()
            .unwrap()
            .get(&kind)
            .map_or(0, |docs| docs.len())
    }

    pub fn get(&self, kind: DocumentKind, id: &str) -> Option<serde_json::Value> {
        self.documents
            .lock()
            .unwrap()
            .get(&kind)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn mapping(&self, kind: DocumentKind) -> Option<serde_json::Value> {
        self.indexes.lock().unwrap().get(&kind).cloned()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn index_exists(&self, kind: DocumentKind) -> Result<bool> {
        Ok(self.indexes.lock().unwrap().contains_key(&kind))
    }

    async fn create_index(&self, kind: DocumentKind, mapping: &serde_json::Value) -> Result<()> {
        // Concurrent creators race harmlessly; the first mapping wins.
        self.indexes
            .lock()
            .unwrap()
            .entry(kind)
            .or_insert_with(|| mapping.clone());
        debug!("Created in-memory index for {}", kind);
        Ok(())
    }

    async fn existing_ids(&self, kind: DocumentKind, ids: &[String]) -> Result<HashSet<String>> {
        let documents = self.documents.lock().unwrap();
        let Some(docs) = documents.get(&kind) else {
            return Ok(HashSet::new());
        };
        Ok(ids.iter().filter(|id| docs.contains_key(*id)).cloned().collect())
    }

    async fn insert_batch(&self, batch: &DocumentBatch) -> Result<InsertOutcome> {
        let kind = batch.kind();
        if self.failing_kinds.lock().unwrap().contains(&kind) {
            return Ok(InsertOutcome::Rejected);
        }
        let docs = batch.to_documents()?;
        let mut documents = self.documents.lock().unwrap();
        let store = documents.entry(kind).or_default();
        let mut created = HashSet::new();
        for (id, doc) in docs {
            if let Entry::Vacant(slot) = store.entry(id.clone()) {
                slot.insert(doc);
                created.insert(id);
            }
        }
        debug!("Inserted {} of {} {} documents in memory", created.len(), batch.len(), kind);
        Ok(InsertOutcome::Created(batch.only_ids(&created)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Indicator, IocCategory};

    fn indicators(ids: &[&str]) -> DocumentBatch {
        DocumentBatch::Indicators(
            ids.iter()
                .map(|id| Indicator {
                    ioc_id: id.to_string(),
                    ioc: "1.1.1.1".into(),
                    ioc_type: IocCategory::IpAddress,
                    created_time: String::new(),
                    crawled_time: String::new(),
                    source: "otx".into(),
                    category: vec![],
                    post_id: "p".into(),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn index_lifecycle() {
        let repo = InMemoryRepository::new();
        assert!(!repo.index_exists(DocumentKind::Indicator).await.unwrap());
        let mapping = DocumentKind::Indicator.mapping();
        repo.create_index(DocumentKind::Indicator, &mapping).await.unwrap();
        repo.create_index(DocumentKind::Indicator, &serde_json::json!({})).await.unwrap();
        assert!(repo.index_exists(DocumentKind::Indicator).await.unwrap());
        assert!(!repo.index_exists(DocumentKind::Pulse).await.unwrap());
        assert_eq!(repo.mapping(DocumentKind::Indicator), Some(mapping));
    }

    #[tokio::test]
    async fn batch_exists_requires_every_document() {
        let repo = InMemoryRepository::new();
        let outcome = repo.insert_batch(&indicators(&["1", "2"])).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Created(indicators(&["1", "2"])));

        assert!(repo.batch_exists(&indicators(&["1", "2"])).await.unwrap());
        assert!(!repo.batch_exists(&indicators(&["1", "3"])).await.unwrap());
        assert!(!repo.batch_exists(&indicators(&[])).await.unwrap());
        assert_eq!(repo.get(DocumentKind::Indicator, "1").unwrap()["ioc_type"], "ipaddress");
    }

    #[tokio::test]
    async fn kinds_are_stored_independently() {
        let repo = InMemoryRepository::new();
        repo.insert_batch(&indicators(&["1"])).await.unwrap();
        let ids = vec!["1".to_string()];
        assert!(repo.existing_ids(DocumentKind::Pulse, &ids).await.unwrap().is_empty());
        assert_eq!(repo.count(DocumentKind::Indicator), 1);
    }

    #[tokio::test]
    async fn failing_kind_reports_rejection() {
        let repo = InMemoryRepository::new();
        repo.fail_inserts_for(DocumentKind::Indicator);
        let outcome = repo.insert_batch(&indicators(&["1"])).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Rejected);
        assert_eq!(repo.count(DocumentKind::Indicator), 0);
    }

    #[tokio::test]
    async fn insert_is_create_only() {
        let repo = InMemoryRepository::new();
        repo.insert_batch(&indicators(&["1"])).await.unwrap();

        let outcome = repo.insert_batch(&indicators(&["1", "2"])).await.unwrap();

        assert_eq!(outcome, InsertOutcome::Created(indicators(&["2"])));
        assert_eq!(repo.count(DocumentKind::Indicator), 2);
    }
}
