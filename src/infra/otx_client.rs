use crate::app::ports::FeedClient;
use crate::config::FeedConfig;
use crate::constants::{OTX_API_KEY_HEADER, SUBSCRIBED_PATH};
use crate::error::{CrawlerError, Result};
use crate::observability::metrics;
use crate::types::{FeedPage, PageQuery};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// OTX feed client with bounded retries and exponential backoff.
pub struct OtxClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

enum Attempt {
    Done(Vec<u8>),
    Retry(CrawlerError),
    Fail(CrawlerError),
}

impl OtxClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), SUBSCRIBED_PATH),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    async fn attempt(&self, query: &PageQuery) -> Attempt {
        let mut request = self.client.get(&self.endpoint).query(&query.query_pairs());
        if let Some(key) = &self.api_key {
            request = request.header(OTX_API_KEY_HEADER, key);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => return Attempt::Retry(CrawlerError::Http(e)),
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Attempt::Fail(CrawlerError::Unauthorized { status: status.as_u16() });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            let err = CrawlerError::Api { status: status.as_u16(), message };
            return if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                Attempt::Retry(err)
            } else {
                Attempt::Fail(err)
            };
        }

        match resp.bytes().await {
            Ok(bytes) => Attempt::Done(bytes.to_vec()),
            Err(e) => Attempt::Retry(CrawlerError::Http(e)),
        }
    }

    async fn get_with_retries(&self, query: &PageQuery) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            let t0 = Instant::now();
            let result = self.attempt(query).await;
            metrics::feed::request_duration(t0.elapsed().as_secs_f64());

            match result {
                Attempt::Done(bytes) => {
                    metrics::feed::request_success();
                    return Ok(bytes);
                }
                Attempt::Fail(e) => {
                    metrics::feed::request_error();
                    return Err(e);
                }
                Attempt::Retry(e) if attempt >= self.max_retries => {
                    metrics::feed::request_error();
                    return Err(e);
                }
                Attempt::Retry(e) => {
                    let delay = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        "Feed request for page {:?} failed ({}); retry {}/{} in {:?}",
                        query.page, e, attempt, self.max_retries, delay
                    );
                    metrics::feed::request_retry();
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl FeedClient for OtxClient {
    #[instrument(skip(self), fields(page = ?query.page))]
    async fn fetch_page(&self, query: &PageQuery) -> Result<FeedPage> {
        let body = self.get_with_retries(query).await?;
        match serde_json::from_slice::<FeedPage>(&body) {
            Ok(page) => {
                debug!("Fetched {} results (count={})", page.results.len(), page.count);
                Ok(page)
            }
            Err(e) => {
                warn!("Undecodable feed response ({} bytes), treating as empty: {}", body.len(), e);
                metrics::feed::decode_error();
                Ok(FeedPage::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, retries: u32) -> OtxClient {
        OtxClient::new(&FeedConfig {
            base_url: server.uri(),
            api_key: Some("k3y".into()),
            max_retries: retries,
            retry_backoff_ms: 1,
            ..FeedConfig::default()
        })
        .unwrap()
    }

    fn query(page: Option<u32>) -> PageQuery {
        PageQuery { page_size: 50, modified_since: "2019-01-01T00:00:00".into(), page }
    }

    #[tokio::test]
    async fn sends_filter_page_and_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pulses/subscribed"))
            .and(query_param("limit", "50"))
            .and(query_param("modified_since", "2019-01-01T00:00:00"))
            .and(query_param("page", "2"))
            .and(header("X-OTX-API-KEY", "k3y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 51,
                "results": [{ "id": "p", "indicators": [] }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server, 0).fetch_page(&query(Some(2))).await.unwrap();
        assert_eq!(page.count, 51);
        assert_eq!(page.results[0].id, "p");
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "count": 3, "results": [] })),
            )
            .mount(&server)
            .await;

        let page = client(&server, 3).fetch_page(&query(None)).await.unwrap();
        assert_eq!(page.count, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 2).fetch_page(&query(None)).await.unwrap_err();
        assert!(matches!(err, CrawlerError::Api { status: 500, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn rejected_key_is_fatal_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 5).fetch_page(&query(None)).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn malformed_body_is_an_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let page = client(&server, 0).fetch_page(&query(Some(1))).await.unwrap();
        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());
    }
}
