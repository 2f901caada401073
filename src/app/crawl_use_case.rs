use std::sync::Arc;

use tracing::info;

use crate::app::ports::{DocumentRepository, FeedClient, Publisher};
use crate::config::{Config, PublisherBackend, RepositoryBackend};
use crate::error::Result;
use crate::infra::{
    ElasticRepository, InMemoryRepository, LogPublisher, OtxClient, RabbitHttpPublisher,
};
use crate::pipeline::clock::{CrawlClock, SystemClock};
use crate::pipeline::coordinator::{Coordinator, CrawlSettings, CrawlSummary};

/// Use case for crawling the subscribed pulse feed with configured adapters
pub struct CrawlUseCase {
    coordinator: Coordinator,
}

impl CrawlUseCase {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Build the adapters named by `config`. A dry run keeps documents in
    /// memory and only logs publications.
    pub fn from_config(config: &Config, dry_run: bool) -> Result<Self> {
        let feed: Arc<dyn FeedClient> = Arc::new(OtxClient::new(&config.feed)?);

        let repository: Arc<dyn DocumentRepository> = match (dry_run, &config.repository.backend) {
            (false, RepositoryBackend::Elasticsearch) => {
                Arc::new(ElasticRepository::new(&config.repository)?)
            }
            _ => Arc::new(InMemoryRepository::new()),
        };

        let publisher: Arc<dyn Publisher> = match (dry_run, &config.publisher.backend) {
            (false, PublisherBackend::Rabbitmq) => {
                Arc::new(RabbitHttpPublisher::new(&config.publisher)?)
            }
            _ => Arc::new(LogPublisher),
        };

        let clock: Arc<dyn CrawlClock> = Arc::new(SystemClock::new(config.crawl.tz()?));

        info!(
            repository = ?config.repository.backend,
            publisher = ?config.publisher.backend,
            dry_run,
            "Crawl adapters ready"
        );

        Ok(Self::new(Coordinator::new(
            feed,
            repository,
            publisher,
            clock,
            CrawlSettings::from_config(config),
        )))
    }

    pub async fn crawl(&self) -> CrawlSummary {
        self.coordinator.run().await
    }

    /// Report the page count without crawling.
    pub async fn count_pages(&self) -> u32 {
        self.coordinator.discover_total_pages().await
    }

    pub fn settings(&self) -> &CrawlSettings {
        self.coordinator.settings()
    }
}
