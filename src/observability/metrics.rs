//! Metrics for the crawler
//!
//! Recording goes through the `metrics` facade; nothing is exported unless
//! `init()` installed a Prometheus recorder.

use std::fmt;
use tracing::{info, warn};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Feed metrics
    FeedRequestsSuccess,
    FeedRequestsError,
    FeedRequestRetries,
    FeedRequestDuration,
    FeedDecodeErrors,

    // Classification metrics
    PulsesProcessed,
    IndicatorsAccepted,
    IndicatorsRejected,

    // Write-and-publish metrics
    UnitsSkipped,
    UnitsPublished,
    UnitsWriteFailed,
    UnitsPublishFailed,
    DocumentsWritten,

    // Crawl metrics
    PagesProcessed,
    PageTaskFailures,
    CrawlDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FeedRequestsSuccess => "ioc_feed_requests_success_total",
            MetricName::FeedRequestsError => "ioc_feed_requests_error_total",
            MetricName::FeedRequestRetries => "ioc_feed_request_retries_total",
            MetricName::FeedRequestDuration => "ioc_feed_request_duration_seconds",
            MetricName::FeedDecodeErrors => "ioc_feed_decode_errors_total",

            MetricName::PulsesProcessed => "ioc_pulses_processed_total",
            MetricName::IndicatorsAccepted => "ioc_indicators_accepted_total",
            MetricName::IndicatorsRejected => "ioc_indicators_rejected_total",

            MetricName::UnitsSkipped => "ioc_units_skipped_total",
            MetricName::UnitsPublished => "ioc_units_published_total",
            MetricName::UnitsWriteFailed => "ioc_units_write_failed_total",
            MetricName::UnitsPublishFailed => "ioc_units_publish_failed_total",
            MetricName::DocumentsWritten => "ioc_documents_written_total",

            MetricName::PagesProcessed => "ioc_pages_processed_total",
            MetricName::PageTaskFailures => "ioc_page_task_failures_total",
            MetricName::CrawlDuration => "ioc_crawl_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder. Starts an HTTP listener when
/// `IOC_METRICS_ADDR` holds a socket address.
pub fn init() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    let listen_addr = std::env::var("IOC_METRICS_ADDR").ok().and_then(|addr_str| {
        match addr_str.parse::<std::net::SocketAddr>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!("Ignoring invalid IOC_METRICS_ADDR '{}': {}", addr_str, e);
                None
            }
        }
    });

    let installed = match listen_addr {
        Some(addr) => builder.with_http_listener(addr).install().map(|_| {
            info!("Prometheus HTTP exporter listening at http://{}/metrics", addr);
        }),
        // Recorder only; values stay in-process.
        None => builder.install_recorder().map(|_| ()),
    };

    match installed {
        Ok(()) => info!("Metrics recorder installed"),
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

// ============================================================================
// Feed Metrics
// ============================================================================

pub mod feed {
    use super::MetricName;

    pub fn request_success() {
        ::metrics::counter!(MetricName::FeedRequestsSuccess.as_str()).increment(1);
    }

    pub fn request_error() {
        ::metrics::counter!(MetricName::FeedRequestsError.as_str()).increment(1);
    }

    pub fn request_retry() {
        ::metrics::counter!(MetricName::FeedRequestRetries.as_str()).increment(1);
    }

    pub fn request_duration(secs: f64) {
        ::metrics::histogram!(MetricName::FeedRequestDuration.as_str()).record(secs);
    }

    pub fn decode_error() {
        ::metrics::counter!(MetricName::FeedDecodeErrors.as_str()).increment(1);
    }
}

// ============================================================================
// Classification Metrics
// ============================================================================

pub mod classify {
    use super::MetricName;

    pub fn page_processed(pulses: usize, accepted: usize, rejected: usize) {
        ::metrics::counter!(MetricName::PulsesProcessed.as_str()).increment(pulses as u64);
        ::metrics::counter!(MetricName::IndicatorsAccepted.as_str()).increment(accepted as u64);
        ::metrics::counter!(MetricName::IndicatorsRejected.as_str()).increment(rejected as u64);
    }
}

// ============================================================================
// Write-and-Publish Metrics
// ============================================================================

pub mod writer {
    use super::MetricName;
    use crate::domain::DocumentKind;

    pub fn skipped(kind: DocumentKind) {
        ::metrics::counter!(MetricName::UnitsSkipped.as_str(), "kind" => kind.as_str())
            .increment(1);
    }

    pub fn published(kind: DocumentKind, documents: usize) {
        ::metrics::counter!(MetricName::UnitsPublished.as_str(), "kind" => kind.as_str())
            .increment(1);
        ::metrics::counter!(MetricName::DocumentsWritten.as_str(), "kind" => kind.as_str())
            .increment(documents as u64);
    }

    pub fn write_failed(kind: DocumentKind) {
        ::metrics::counter!(MetricName::UnitsWriteFailed.as_str(), "kind" => kind.as_str())
            .increment(1);
    }

    pub fn publish_failed(kind: DocumentKind, documents: usize) {
        ::metrics::counter!(MetricName::UnitsPublishFailed.as_str(), "kind" => kind.as_str())
            .increment(1);
        ::metrics::counter!(MetricName::DocumentsWritten.as_str(), "kind" => kind.as_str())
            .increment(documents as u64);
    }
}

// ============================================================================
// Crawl Metrics
// ============================================================================

pub mod crawl {
    use super::MetricName;

    pub fn page_processed() {
        ::metrics::counter!(MetricName::PagesProcessed.as_str()).increment(1);
    }

    pub fn page_task_failed() {
        ::metrics::counter!(MetricName::PageTaskFailures.as_str()).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::CrawlDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_follow_prometheus_conventions() {
        for name in [
            MetricName::FeedRequestsSuccess,
            MetricName::IndicatorsRejected,
            MetricName::UnitsPublished,
            MetricName::PagesProcessed,
        ] {
            assert!(name.as_str().starts_with("ioc_"));
            assert!(name.as_str().ends_with("_total"));
        }
        assert!(MetricName::CrawlDuration.to_string().ends_with("_seconds"));
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        feed::request_success();
        classify::page_processed(1, 2, 3);
        writer::skipped(crate::domain::DocumentKind::Pulse);
        crawl::duration(0.5);
    }
}
