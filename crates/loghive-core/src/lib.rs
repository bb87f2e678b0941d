//! loghive core
//!
//! Core types, configuration and the shared ingestion model.

pub mod config;
pub mod error;
pub mod gauge;
pub mod model;
pub mod record;
pub mod resources;
pub mod traits;

// Re-export commonly used types
pub use config::Config;
pub use error::{FrameError, IngestionError, LogHiveError, Result, StorageError};
pub use gauge::{ConnectionGauge, ConnectionGuard};
pub use model::{format_uptime, IngestionModel, IngestionSnapshot};
pub use record::{Record, SinkKey};
pub use resources::{DiskIoTimes, ResourceUsage};
pub use traits::{MemoryHandler, RecordHandler};
