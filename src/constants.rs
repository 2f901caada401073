/// Defaults for the OTX subscribed-pulses crawl.
/// Every value here is overridable through `Config`.

// Feed
pub const OTX_SOURCE: &str = "otx";
pub const DEFAULT_OTX_BASE_URL: &str = "https://otx.alienvault.com";
pub const SUBSCRIBED_PATH: &str = "/api/v1/pulses/subscribed";
pub const OTX_API_KEY_HEADER: &str = "X-OTX-API-KEY";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_MODIFIED_SINCE: &str = "2019-01-01T00:00:00";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

// Crawl
pub const DEFAULT_GATE_MULTIPLIER: usize = 25;
pub const DEFAULT_TIMEZONE: &str = "Europe/London";
pub const CRAWLED_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// Repository
pub const DEFAULT_POST_INDEX: &str = "otx-post";
pub const DEFAULT_IOC_INDEX: &str = "otx-ioc";
pub const DEFAULT_ELASTIC_URL: &str = "http://localhost:9200";

// Publisher
pub const POST_TOPIC: &str = "post";
pub const IOC_TOPIC: &str = "ioc";
pub const DEFAULT_RABBIT_URL: &str = "http://localhost:15672";
pub const DEFAULT_RABBIT_VHOST: &str = "/";
pub const DEFAULT_RABBIT_EXCHANGE: &str = "amq.topic";

pub const DEFAULT_CONFIG_PATH: &str = "ioc_crawler.toml";
