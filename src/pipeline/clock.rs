use crate::constants::CRAWLED_TIME_FORMAT;
use chrono::Utc;
use chrono_tz::Tz;

/// Source of the `crawled_time` stamp put on every pulse and indicator.
pub trait CrawlClock: Send + Sync {
    fn now(&self) -> String;
}

/// Wall clock rendered in a fixed timezone, without a zone designator.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl CrawlClock for SystemClock {
    fn now(&self) -> String {
        Utc::now().with_timezone(&self.tz).format(CRAWLED_TIME_FORMAT).to_string()
    }
}

/// Always returns the same stamp.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl CrawlClock for FixedClock {
    fn now(&self) -> String {
        self.0.clone()
    }
}
