use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ioc_crawler::config::{Config, FeedConfig};
use ioc_crawler::domain::DocumentKind;
use ioc_crawler::infra::{InMemoryRepository, OtxClient, RecordingPublisher};
use ioc_crawler::pipeline::{Coordinator, CrawlSettings, FixedClock};

fn feed_config(server: &MockServer) -> FeedConfig {
    FeedConfig {
        base_url: server.uri(),
        api_key: Some("secret".into()),
        max_retries: 1,
        retry_backoff_ms: 1,
        ..FeedConfig::default()
    }
}

fn run_against(
    server: &MockServer,
    repository: Arc<InMemoryRepository>,
    publisher: Arc<RecordingPublisher>,
) -> Coordinator {
    let mut config = Config::default();
    config.feed = feed_config(server);
    config.crawl.workers = Some(2);
    config.crawl.gate_multiplier = 1;

    Coordinator::new(
        Arc::new(OtxClient::new(&config.feed).unwrap()),
        repository,
        publisher,
        Arc::new(FixedClock("2024-03-01T12:00:00".into())),
        CrawlSettings::from_config(&config),
    )
}

#[tokio::test]
async fn crawls_subscribed_feed_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/pulses/subscribed"))
        .and(query_param("page", "1"))
        .and(header("X-OTX-API-KEY", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 40,
            "results": [{
                "id": "5f1",
                "name": "Botnet C2",
                "author_name": "analyst",
                "tags": ["c2"],
                "targeted_countries": null,
                "indicators": [
                    { "id": 11, "indicator": "203.0.113.9", "type": "IPv4" },
                    { "id": 12, "indicator": "CVE-2024-0001", "type": "CVE" }
                ]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/pulses/subscribed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "count": 40, "results": [] })),
        )
        .mount(&server)
        .await;

    let repository = Arc::new(InMemoryRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let summary = run_against(&server, repository.clone(), publisher.clone()).run().await;

    assert!(!summary.failed());
    assert_eq!(summary.total_pages, 1);
    assert_eq!(summary.indicators, 1);
    assert_eq!(summary.rejected_indicators, 1);

    let ioc = repository.get(DocumentKind::Indicator, "11").unwrap();
    assert_eq!(ioc["ioc_type"], "ipaddress");
    assert_eq!(ioc["source"], "otx");
    assert_eq!(ioc["crawled_time"], "2024-03-01T12:00:00");
    assert_eq!(ioc["category"], json!(["c2"]));

    let pulse = repository.get(DocumentKind::Pulse, "5f1").unwrap();
    assert_eq!(pulse["targeted_countries"], json!([]));

    assert_eq!(publisher.events_for("post").len(), 1);
    assert_eq!(publisher.events_for("ioc").len(), 1);
}

#[tokio::test]
async fn rejected_api_key_fails_the_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "count": 10, "results": [] })),
        )
        .mount(&server)
        .await;

    let publisher = Arc::new(RecordingPublisher::new());
    let summary = run_against(&server, Arc::new(InMemoryRepository::new()), publisher.clone())
        .run()
        .await;

    assert!(summary.failed());
    assert_eq!(summary.pages_processed, 0);
    assert!(publisher.events().is_empty());
}
