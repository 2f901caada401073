use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Feed rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Task queue error: {0}")]
    Queue(String),

    #[error("Page task failed: {0}")]
    Task(String),
}

impl CrawlerError {
    /// Errors that must stop the crawl instead of degrading a page to empty.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlerError::Unauthorized { .. })
    }
}

pub type Result<T> = std::result::Result<T, CrawlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rejected_credentials_are_fatal() {
        assert!(CrawlerError::Unauthorized { status: 403 }.is_fatal());
        assert!(!CrawlerError::Api { status: 500, message: "boom".into() }.is_fatal());
        assert!(!CrawlerError::Repository("down".into()).is_fatal());
    }
}
