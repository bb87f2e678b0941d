//! loghive pipeline
//!
//! Routes decoded records to their per-source sinks and the ingestion model.

pub mod pipeline;

pub use pipeline::Pipeline;
