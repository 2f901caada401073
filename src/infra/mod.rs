// Adapters for the feed, document store, and notification ports

pub mod elastic_repository;
pub mod memory_repository;
pub mod otx_client;
pub mod publishers;

pub use elastic_repository::ElasticRepository;
pub use memory_repository::InMemoryRepository;
pub use otx_client::OtxClient;
pub use publishers::{LogPublisher, RabbitHttpPublisher, RecordingPublisher};
