use crate::app::ports::{DocumentRepository, InsertOutcome};
use crate::config::RepositoryConfig;
use crate::domain::{DocumentBatch, DocumentKind};
use crate::error::{CrawlerError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Document repository backed by the Elasticsearch REST API.
pub struct ElasticRepository {
    client: reqwest::Client,
    base_url: String,
    post_index: String,
    ioc_index: String,
}

#[derive(Debug, Deserialize)]
struct MgetResponse {
    docs: Vec<MgetDoc>,
}

#[derive(Debug, Deserialize)]
struct MgetDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl ElasticRepository {
    pub fn new(config: &RepositoryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            post_index: config.post_index.clone(),
            ioc_index: config.ioc_index.clone(),
        })
    }

    pub fn index_name(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Pulse => &self.post_index,
            DocumentKind::Indicator => &self.ioc_index,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn bulk_body(&self, batch: &DocumentBatch) -> Result<String> {
        let index = self.index_name(batch.kind());
        let mut body = String::new();
        for (id, doc) in batch.to_documents()? {
            let action = json!({ "create": { "_index": index, "_id": id } });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&doc)?);
            body.push('\n');
        }
        Ok(body)
    }
}

async fn error_body(resp: reqwest::Response) -> String {
    resp.text().await.unwrap_or_default()
}

#[async_trait]
impl DocumentRepository for ElasticRepository {
    async fn index_exists(&self, kind: DocumentKind) -> Result<bool> {
        let resp = self.client.head(self.url(self.index_name(kind))).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(CrawlerError::Repository(format!(
                "index check for '{}' returned {}",
                self.index_name(kind),
                other.as_u16()
            ))),
        }
    }

    async fn create_index(&self, kind: DocumentKind, mapping: &serde_json::Value) -> Result<()> {
        let index = self.index_name(kind);
        let resp = self.client.put(self.url(index)).json(mapping).send().await?;
        let status = resp.status();
        if status.is_success() {
            debug!("Created index '{}'", index);
            return Ok(());
        }
        let body = error_body(resp).await;
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            debug!("Index '{}' was created concurrently", index);
            return Ok(());
        }
        Err(CrawlerError::Repository(format!(
            "creating index '{}' returned {}: {}",
            index,
            status.as_u16(),
            body
        )))
    }

    async fn existing_ids(&self, kind: DocumentKind, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let index = self.index_name(kind);
        let resp = self
            .client
            .post(self.url(&format!("{}/_mget?_source=false", index)))
            .json(&json!({ "ids": ids }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CrawlerError::Repository(format!(
                "mget on '{}' returned {}: {}",
                index,
                status.as_u16(),
                error_body(resp).await
            )));
        }
        let parsed: MgetResponse = resp.json().await?;
        Ok(parsed.docs.into_iter().filter(|d| d.found).map(|d| d.id).collect())
    }

    async fn insert_batch(&self, batch: &DocumentBatch) -> Result<InsertOutcome> {
        if batch.is_empty() {
            return Ok(InsertOutcome::Created(batch.clone()));
        }
        let body = self.bulk_body(batch)?;
        let resp = self
            .client
            .post(self.url("_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            warn!("Bulk insert returned {}: {}", status.as_u16(), error_body(resp).await);
            return Ok(InsertOutcome::Rejected);
        }

        let parsed: BulkResponse = resp.json().await?;
        if !parsed.errors {
            return Ok(InsertOutcome::Created(batch.clone()));
        }

        let index = self.index_name(batch.kind());
        let mut created = HashSet::new();
        let mut conflicts = 0;
        let mut failed = 0;
        for result in parsed.items.iter().filter_map(|item| item.values().next()) {
            let id = result.get("_id").and_then(|id| id.as_str());
            match (result.get("status").and_then(|s| s.as_u64()), id) {
                (Some(200..=299), Some(id)) => {
                    created.insert(id.to_string());
                }
                // Another writer stored this document first.
                (Some(409), _) => conflicts += 1,
                _ => failed += 1,
            }
        }
        if failed > 0 {
            warn!("Bulk insert into '{}' had {} failed items", index, failed);
            return Ok(InsertOutcome::Rejected);
        }
        if conflicts > 0 {
            debug!(
                "Bulk insert into '{}' skipped {} documents stored concurrently",
                index, conflicts
            );
        }
        Ok(InsertOutcome::Created(batch.only_ids(&created)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Indicator, IocCategory};
    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(server: &MockServer) -> ElasticRepository {
        ElasticRepository::new(&RepositoryConfig {
            url: server.uri(),
            ..RepositoryConfig::default()
        })
        .unwrap()
    }

    fn indicators(ids: &[&str]) -> DocumentBatch {
        DocumentBatch::Indicators(
            ids.iter()
                .map(|id| Indicator {
                    ioc_id: id.to_string(),
                    ioc: "http://bad.example/".into(),
                    ioc_type: IocCategory::Url,
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
    async fn index_exists_maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD")).and(path("/otx-post"))
            .respond_with(ResponseTemplate::new(200)).mount(&server).await;
        Mock::given(method("HEAD")).and(path("/otx-ioc"))
            .respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let repo = repo(&server);
        assert!(repo.index_exists(DocumentKind::Pulse).await.unwrap());
        assert!(!repo.index_exists(DocumentKind::Indicator).await.unwrap());
    }

    #[tokio::test]
    async fn create_index_tolerates_concurrent_creation() {
        let server = MockServer::start().await;
        Mock::given(method("PUT")).and(path("/otx-ioc"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "type": "resource_already_exists_exception" }, "status": 400
            })))
            .mount(&server).await;

        let repo = repo(&server);
        let mapping = DocumentKind::Indicator.mapping();
        repo.create_index(DocumentKind::Indicator, &mapping).await.unwrap();
    }

    #[tokio::test]
    async fn existing_ids_reads_mget_found_flags() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/otx-ioc/_mget"))
            .and(body_json(json!({ "ids": ["1", "2"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "docs": [
                    { "_index": "otx-ioc", "_id": "1", "found": true },
                    { "_index": "otx-ioc", "_id": "2", "found": false }
                ]
            })))
            .mount(&server).await;

        let repo = repo(&server);
        let ids = vec!["1".to_string(), "2".to_string()];
        let existing = repo.existing_ids(DocumentKind::Indicator, &ids).await.unwrap();
        assert_eq!(existing, ["1".to_string()].into_iter().collect());
        assert!(!repo.batch_exists(&indicators(&["1", "2"])).await.unwrap());
    }

    #[tokio::test]
    async fn bulk_insert_sends_create_actions() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/_bulk"))
            .and(header("content-type", "application/x-ndjson"))
            .and(body_string_contains(r#"{"create":{"#))
            .and(body_string_contains(r#""_index":"otx-ioc""#))
            .and(body_string_contains(r#""_id":"7""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": false,
                "items": [{ "create": { "_id": "7", "status": 201 } }]
            })))
            .expect(1)
            .mount(&server).await;

        let outcome = repo(&server).insert_batch(&indicators(&["7"])).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Created(indicators(&["7"])));
    }

    #[tokio::test]
    async fn bulk_item_failure_rejects_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": true,
                "items": [{ "create": { "_id": "2", "status": 400 } }]
            })))
            .mount(&server)
            .await;

        let outcome = repo(&server).insert_batch(&indicators(&["2"])).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Rejected);
    }

    #[tokio::test]
    async fn conflicting_items_are_left_out_of_created_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": true,
                "items": [
                    { "create": { "_id": "1", "status": 201 } },
                    { "create": { "_id": "2", "status": 409 } }
                ]
            })))
            .mount(&server)
            .await;

        let outcome = repo(&server).insert_batch(&indicators(&["1", "2"])).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Created(indicators(&["1"])));
    }

    #[tokio::test]
    async fn all_conflicts_create_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": true,
                "items": [{ "create": { "_id": "p1", "status": 409 } }]
            })))
            .mount(&server)
            .await;

        let outcome = repo(&server).insert_batch(&indicators(&["p1"])).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Created(indicators(&[])));
    }
}
