use thiserror::Error;

/// Core error types for loghive
#[derive(Debug, Error)]
pub enum LogHiveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Status server error: {0}")]
    Status(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while turning a byte stream into records
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload is not a JSON object of string fields
    #[error("Malformed frame payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame size {size} exceeds limit {limit}")]
    TooLarge { size: usize, limit: usize },
}

impl FrameError {
    /// Whether the stream can no longer be decoded after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::TooLarge { .. })
    }
}

/// Errors specific to TCP ingestion
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TCP connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection held a partial frame for longer than {0:?}")]
    PartialFrameTimeout(std::time::Duration),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Record handler failed: {0}")]
    Handler(String),
}

/// Errors specific to on-disk sinks
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid {field} '{value}': {reason}")]
    InvalidKey {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rotate {path}: {source}")]
    Rotate {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for loghive operations
pub type Result<T> = std::result::Result<T, LogHiveError>;
