pub mod crawl_use_case;
pub mod ports;

pub use crawl_use_case::CrawlUseCase;
