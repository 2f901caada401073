use crate::constants::*;
use crate::domain::DocumentKind;
use crate::error::{CrawlerError, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub crawl: CrawlConfig,
    pub repository: RepositoryConfig,
    pub publisher: PublisherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_size: u32,
    /// Only pulses modified after this instant are requested.
    pub modified_since: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OTX_BASE_URL.to_string(),
            api_key: None,
            page_size: DEFAULT_PAGE_SIZE,
            modified_since: DEFAULT_MODIFIED_SINCE.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Admission gate capacity is `gate_multiplier * workers`.
    pub gate_multiplier: usize,
    /// Defaults to the number of available processing units.
    pub workers: Option<usize>,
    pub timezone: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            gate_multiplier: DEFAULT_GATE_MULTIPLIER,
            workers: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl CrawlConfig {
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn gate_capacity(&self) -> usize {
        self.gate_multiplier * self.workers()
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| {
                CrawlerError::Config(format!("Invalid timezone '{}': {}", self.timezone, e))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryBackend {
    #[default]
    Memory,
    Elasticsearch,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub backend: RepositoryBackend,
    pub url: String,
    pub post_index: String,
    pub ioc_index: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: RepositoryBackend::Memory,
            url: DEFAULT_ELASTIC_URL.to_string(),
            post_index: DocumentKind::Pulse.default_index().to_string(),
            ioc_index: DocumentKind::Indicator.default_index().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherBackend {
    #[default]
    Log,
    Rabbitmq,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub backend: PublisherBackend,
    pub url: String,
    pub vhost: String,
    pub exchange: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            backend: PublisherBackend::Log,
            url: DEFAULT_RABBIT_URL.to_string(),
            vhost: DEFAULT_RABBIT_VHOST.to_string(),
            exchange: DEFAULT_RABBIT_EXCHANGE.to_string(),
            username: None,
            password: None,
        }
    }
}

impl Config {
    /// Loads `path` (or the default config file when present), then applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Config::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CrawlerError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(v) = lookup("OTX_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.feed.api_key = Some(v);
        }
        if let Some(v) = lookup("OTX_BASE_URL") {
            self.feed.base_url = v;
        }
        if let Some(v) = lookup("ELASTIC_URL") {
            self.repository.url = v;
        }
        if let Some(v) = lookup("RABBIT_URL") {
            self.publisher.url = v;
        }
        if let Some(v) = lookup("RABBIT_USERNAME") {
            self.publisher.username = Some(v);
        }
        if let Some(v) = lookup("RABBIT_PASSWORD") {
            self.publisher.password = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.feed.page_size == 0 {
            return Err(CrawlerError::Config("feed.page_size must be at least 1".into()));
        }
        if self.crawl.gate_multiplier == 0 {
            return Err(CrawlerError::Config("crawl.gate_multiplier must be at least 1".into()));
        }
        if self.crawl.workers == Some(0) {
            return Err(CrawlerError::Config("crawl.workers must be at least 1".into()));
        }
        self.crawl.tz()?;
        Ok(())
    }
}
