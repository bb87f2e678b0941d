use std::sync::Mutex;
use crate::record::Record;
use crate::error::StorageError;

/// Consumer of decoded records
///
/// Called once per record, in arrival order for a given connection, from any
/// number of connections concurrently. Implementations may block on file I/O.
pub trait RecordHandler: Send + Sync {
    /// Returns the name of the handler (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Persist and account for one record
    fn handle(&self, record: Record) -> Result<(), StorageError>;
}

/// A handler that keeps every record in memory
///
/// Useful for testing ingestion without touching the file system
#[derive(Debug, Default)]
pub struct MemoryHandler {
    records: Mutex<Vec<Record>>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records handled so far, in the order they arrived
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl RecordHandler for MemoryHandler {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn handle(&self, record: Record) -> Result<(), StorageError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
        Ok(())
    }
}
