// Crawl pipeline: classify, process pages, write and publish, coordinate

pub mod classifier;
pub mod clock;
pub mod coordinator;
pub mod page_processor;
pub mod task_queue;
pub mod write_publish;

pub use classifier::classify;
pub use clock::{CrawlClock, FixedClock, SystemClock};
pub use coordinator::{total_pages, Coordinator, CrawlSettings, CrawlSummary, UnitTally};
pub use page_processor::{process_page, ProcessedPage};
pub use task_queue::{Job, TaskQueue};
pub use write_publish::{UnitOutcome, UnitReport, WriteAndPublish};
