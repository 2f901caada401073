//! Drives a full crawl: discovers the page count, fans pages out behind an
//! admission gate, and folds every page's results into one summary.

use crate::app::ports::{DocumentRepository, FeedClient, Publisher};
use crate::config::Config;
use crate::domain::DocumentBatch;
use crate::error::{CrawlerError, Result};
use crate::observability::metrics;
use crate::pipeline::clock::CrawlClock;
use crate::pipeline::page_processor::process_page;
use crate::pipeline::task_queue::TaskQueue;
use crate::pipeline::write_publish::{UnitOutcome, UnitReport, WriteAndPublish};
use crate::types::{FeedPage, PageQuery};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Number of pages needed to cover `count` results.
pub fn total_pages(count: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = count.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub page_size: u32,
    pub modified_since: String,
    /// Page tasks allowed past admission at once.
    pub gate_capacity: usize,
    /// Worker count of each per-page task queue.
    pub workers: usize,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.feed.page_size,
            modified_since: config.feed.modified_since.clone(),
            gate_capacity: config.crawl.gate_capacity(),
            workers: config.crawl.workers(),
        }
    }

    fn query(&self, page: Option<u32>) -> PageQuery {
        PageQuery {
            page_size: self.page_size,
            modified_since: self.modified_since.clone(),
            page,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitTally {
    pub published: usize,
    pub skipped: usize,
    pub write_failed: usize,
    pub publish_failed: usize,
    pub documents_written: usize,
}

/// Final report of a crawl. Pulse and indicator counts are taken after
/// classification and before deduplication.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub total_pages: u32,
    pub pages_processed: usize,
    pub pulses: usize,
    pub indicators: usize,
    pub rejected_indicators: usize,
    pub units: UnitTally,
    pub error: Option<String>,
    pub duration_secs: f64,
}

impl CrawlSummary {
    /// True when a page task failed fatally.
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Default)]
struct CrawlTotals {
    pages: AtomicUsize,
    pulses: AtomicUsize,
    indicators: AtomicUsize,
    rejected: AtomicUsize,
    published: AtomicUsize,
    skipped: AtomicUsize,
    write_failed: AtomicUsize,
    publish_failed: AtomicUsize,
    documents_written: AtomicUsize,
}

impl CrawlTotals {
    fn record_unit(&self, report: &UnitReport) {
        debug!(page = report.page, kind = %report.kind, "Unit finished: {:?}", report.outcome);
        match report.outcome {
            UnitOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            UnitOutcome::Published(n) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                self.documents_written.fetch_add(n, Ordering::Relaxed);
            }
            UnitOutcome::WriteFailed => {
                self.write_failed.fetch_add(1, Ordering::Relaxed);
            }
            UnitOutcome::PublishFailed(n) => {
                self.publish_failed.fetch_add(1, Ordering::Relaxed);
                self.documents_written.fetch_add(n, Ordering::Relaxed);
            }
        }
    }

    fn tally(&self) -> UnitTally {
        UnitTally {
            published: self.published.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            write_failed: self.write_failed.load(Ordering::Relaxed),
            publish_failed: self.publish_failed.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
        }
    }
}

/// State shared by every page task of one crawl.
struct PageContext {
    feed: Arc<dyn FeedClient>,
    repository: Arc<dyn DocumentRepository>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn CrawlClock>,
    settings: CrawlSettings,
    write_budget: Arc<Semaphore>,
    totals: CrawlTotals,
    first_error: OnceLock<String>,
    cancel: CancellationToken,
}

impl PageContext {
    /// Records the first failure and stops further admission.
    fn fail(&self, page: u32, err: &CrawlerError) {
        error!("Page {} task failed: {}", page, err);
        metrics::crawl::page_task_failed();
        let _ = self.first_error.set(format!("page {}: {}", page, err));
        self.cancel.cancel();
    }
}

pub struct Coordinator {
    feed: Arc<dyn FeedClient>,
    repository: Arc<dyn DocumentRepository>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn CrawlClock>,
    settings: CrawlSettings,
}

impl Coordinator {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        repository: Arc<dyn DocumentRepository>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn CrawlClock>,
        settings: CrawlSettings,
    ) -> Self {
        Self { feed, repository, publisher, clock, settings }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Queries the feed once for its result count. A failed call means no
    /// pages are crawled.
    #[instrument(skip(self))]
    pub async fn discover_total_pages(&self) -> u32 {
        match self.feed.fetch_page(&self.settings.query(None)).await {
            Ok(page) => {
                let pages = total_pages(page.count, self.settings.page_size);
                info!("Feed reports {} results across {} pages", page.count, pages);
                pages
            }
            Err(e) => {
                warn!("Page count discovery failed, crawling nothing: {}", e);
                0
            }
        }
    }

    /// Crawls every page of the subscribed feed.
    #[instrument(
        skip(self),
        fields(gate = self.settings.gate_capacity, workers = self.settings.workers)
    )]
    pub async fn run(&self) -> CrawlSummary {
        let started = Instant::now();
        let total_pages = self.discover_total_pages().await;

        let capacity = self.settings.gate_capacity.max(1);
        let gate = Arc::new(Semaphore::new(capacity));
        let ctx = Arc::new(PageContext {
            feed: Arc::clone(&self.feed),
            repository: Arc::clone(&self.repository),
            publisher: Arc::clone(&self.publisher),
            clock: Arc::clone(&self.clock),
            settings: self.settings.clone(),
            write_budget: Arc::new(Semaphore::new(capacity)),
            totals: CrawlTotals::default(),
            first_error: OnceLock::new(),
            cancel: CancellationToken::new(),
        });

        let mut tasks = JoinSet::new();
        let mut task_pages: HashMap<task::Id, u32> = HashMap::new();
        for page in 1..=total_pages {
            let permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    warn!("Crawl cancelled, not admitting page {} or later", page);
                    break;
                }
                permit = Arc::clone(&gate).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let ctx = Arc::clone(&ctx);
            let handle = tasks.spawn(async move { run_page(&ctx, page, permit).await });
            task_pages.insert(handle.id(), page);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                let page = task_pages.get(&e.id()).copied().unwrap_or_default();
                ctx.fail(page, &CrawlerError::Task(e.to_string()));
            }
        }

        let duration_secs = started.elapsed().as_secs_f64();
        metrics::crawl::duration(duration_secs);

        let summary = CrawlSummary {
            total_pages,
            pages_processed: ctx.totals.pages.load(Ordering::Relaxed),
            pulses: ctx.totals.pulses.load(Ordering::Relaxed),
            indicators: ctx.totals.indicators.load(Ordering::Relaxed),
            rejected_indicators: ctx.totals.rejected.load(Ordering::Relaxed),
            units: ctx.totals.tally(),
            error: ctx.first_error.get().cloned(),
            duration_secs,
        };
        info!(
            "Crawl finished: {} pages, {} pulses, {} indicators, failed={}",
            summary.pages_processed,
            summary.pulses,
            summary.indicators,
            summary.failed()
        );
        summary
    }
}

/// Fetch, classify and hand one page to its own task queue. The admission
/// permit is released once both units are submitted; the queue is drained
/// afterwards.
#[instrument(skip(ctx, permit))]
async fn run_page(ctx: &PageContext, page: u32, permit: OwnedSemaphorePermit) -> Result<()> {
    let feed_page = match ctx.feed.fetch_page(&ctx.settings.query(Some(page))).await {
        Ok(feed_page) => feed_page,
        Err(e) if e.is_fatal() => {
            ctx.fail(page, &e);
            return Err(e);
        }
        Err(e) => {
            warn!("Fetching page {} failed, treating as empty: {}", page, e);
            FeedPage::default()
        }
    };

    let processed = process_page(&feed_page, ctx.clock.as_ref());
    ctx.totals.pulses.fetch_add(processed.pulses.len(), Ordering::Relaxed);
    ctx.totals.indicators.fetch_add(processed.indicators.len(), Ordering::Relaxed);
    ctx.totals.rejected.fetch_add(processed.rejected_indicators, Ordering::Relaxed);
    metrics::classify::page_processed(
        processed.pulses.len(),
        processed.indicators.len(),
        processed.rejected_indicators,
    );

    let queue = TaskQueue::start(ctx.settings.workers, Some(Arc::clone(&ctx.write_budget)));
    let batches = [
        DocumentBatch::Pulses(processed.pulses),
        DocumentBatch::Indicators(processed.indicators),
    ];
    for batch in batches {
        let unit = WriteAndPublish::new(
            page,
            batch,
            Arc::clone(&ctx.repository),
            Arc::clone(&ctx.publisher),
        );
        if let Err(e) = queue.submit(unit) {
            ctx.fail(page, &e);
            return Err(e);
        }
    }
    drop(permit);

    let reports = match queue.stop().await {
        Ok(reports) => reports,
        Err(e) => {
            ctx.fail(page, &e);
            return Err(e);
        }
    };
    for report in &reports {
        ctx.totals.record_unit(report);
    }
    ctx.totals.pages.fetch_add(1, Ordering::Relaxed);
    metrics::crawl::page_processed();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(total_pages(237, 50), 5);
        assert_eq!(total_pages(250, 50), 5);
        assert_eq!(total_pages(251, 50), 6);
        assert_eq!(total_pages(1, 50), 1);
    }

    #[test]
    fn zero_results_means_zero_pages() {
        assert_eq!(total_pages(0, 50), 0);
        assert_eq!(total_pages(10, 0), 0);
    }

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.crawl.workers = Some(2);
        let settings = CrawlSettings::from_config(&config);
        assert_eq!(settings.gate_capacity, 50);
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.query(Some(3)).page, Some(3));
        assert_eq!(settings.query(None).page_size, 50);
    }
}
