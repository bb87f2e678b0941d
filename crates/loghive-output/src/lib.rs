//! loghive output
//!
//! Rotating per-source file sinks, the registry routing records to them, and
//! the HTTP status server.

pub mod file;
pub mod registry;
pub mod status;

pub use file::RotatingFile;
pub use registry::{Sink, SinkRegistry};
pub use status::{StatusServer, StatusState};
