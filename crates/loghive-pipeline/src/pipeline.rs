use loghive_core::config::Config;
use loghive_core::{IngestionModel, Record, RecordHandler, StorageError};
use loghive_output::SinkRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared ingestion context handed to every connection
///
/// Each record's trimmed line is appended to its source's sink, then its raw
/// payload is counted in the model. The model counts every decoded record,
/// including those whose write failed.
pub struct Pipeline {
    registry: Arc<SinkRegistry>,
    model: Arc<IngestionModel>,
    write_errors: AtomicU64,
}

impl Pipeline {
    /// Create a pipeline over an existing registry and model
    pub fn new(registry: Arc<SinkRegistry>, model: Arc<IngestionModel>) -> Self {
        Self {
            registry,
            model,
            write_errors: AtomicU64::new(0),
        }
    }

    /// Create a pipeline from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(SinkRegistry::from_config(&config.storage)),
            Arc::new(IngestionModel::new(config.status.window_size)),
        )
    }

    pub fn registry(&self) -> &Arc<SinkRegistry> {
        &self.registry
    }

    pub fn model(&self) -> &Arc<IngestionModel> {
        &self.model
    }

    /// Records whose sink write failed
    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }
}

impl RecordHandler for Pipeline {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn handle(&self, record: Record) -> Result<(), StorageError> {
        let key = record.sink_key();
        let line = record.line();

        let written = self.registry.write(&key, line);
        if let Err(ref e) = written {
            self.write_errors.fetch_add(1, Ordering::Relaxed);
            warn!(sink = %key, error = %e, "Sink write failed");
        } else {
            debug!(sink = %key, sequence = record.sequence, "Stored record");
        }

        self.model.record(record.data);
        written
    }
}
