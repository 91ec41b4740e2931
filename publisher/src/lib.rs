pub mod config;
pub mod delay;
pub mod error;
pub mod incident;
pub mod memory;
pub mod metrics;
pub mod processor;
pub mod queue;
pub mod sink;
pub mod types;

pub use config::PublisherConfig;
pub use error::PublisherError;
pub use incident::{IncidentState, MEMORY_THRESHOLD_EXCEEDED};
pub use memory::{MemorySampler, ProcessRssSampler};
pub use processor::MarketDataProcessor;
pub use sink::{Sink, TracingSink};
pub use types::{HealthStatus, HeartbeatSnapshot, IncidentRecord, ProcessedRecord, ProcessorStatus};
