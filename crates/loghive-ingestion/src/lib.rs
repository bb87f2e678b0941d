//! loghive ingestion
//!
//! Recovers framed JSON records from TCP byte streams and hands them to a
//! [`RecordHandler`](loghive_core::RecordHandler).

pub mod frame;
pub mod tcp;

pub use frame::{encode_frame, frame_payload, FrameDecoder, Frames, DEFAULT_MAX_FRAME_SIZE};
pub use tcp::{ConnectionSettings, TcpIngestion};
