//! Length-prefixed frame decoding
//!
//! # Protocol
//!
//! Each record is framed with a 4-byte big-endian length prefix:
//! ```text
//! [4 bytes: length L (big-endian)][L bytes: UTF-8 JSON object]
//! ```
//!
//! The JSON object carries `token`, `type`, `name` and `data` string fields.
//! A zero-length payload is accepted and decodes like `{}`.
//!
//! The decoder is independent of any socket: bytes go in through
//! [`FrameDecoder::feed`], complete records come out of the returned iterator.

use bytes::{Buf, BytesMut};
use loghive_core::{FrameError, Record};

/// Length prefix size (4 bytes, big-endian u32)
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size (16MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Per-connection frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Payload length of the frame at the head of the buffer, once parsed
    pending: Option<usize>,
    next_sequence: u64,
    max_frame_size: usize,
    /// Set after an oversized length prefix; the stream cannot be resynchronised
    poisoned: bool,
}

impl FrameDecoder {
    /// Create a decoder rejecting payloads larger than `max_frame_size`
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            pending: None,
            next_sequence: 0,
            max_frame_size,
            poisoned: false,
        }
    }

    /// Append bytes and iterate over every record they complete
    ///
    /// Records left unconsumed when the iterator is dropped are returned by
    /// the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        if !self.poisoned {
            self.buf.extend_from_slice(bytes);
        }
        Frames { decoder: self }
    }

    /// Iterate over complete records already buffered
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Buffer for reading directly from a socket; follow with [`frames`](Self::frames)
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Decode the next complete record, if one is buffered
    pub fn next_record(&mut self) -> Option<Result<Record, FrameError>> {
        if self.poisoned {
            return None;
        }

        let len = match self.pending {
            Some(len) => len,
            None => {
                if self.buf.len() < LENGTH_PREFIX_SIZE {
                    return None;
                }
                let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
                    as usize;
                if len > self.max_frame_size {
                    self.poisoned = true;
                    self.buf.clear();
                    return Some(Err(FrameError::TooLarge {
                        size: len,
                        limit: self.max_frame_size,
                    }));
                }
                self.pending = Some(len);
                len
            }
        };

        if self.buf.len() < LENGTH_PREFIX_SIZE + len {
            return None;
        }

        self.buf.advance(LENGTH_PREFIX_SIZE);
        let payload = self.buf.split_to(len);
        self.pending = None;

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let decoded = if payload.is_empty() {
            Ok(Record::default())
        } else {
            serde_json::from_slice::<Record>(&payload).map_err(FrameError::from)
        };
        Some(decoded.map(|mut record| {
            record.sequence = sequence;
            record
        }))
    }

    /// Bytes held that do not yet form a complete frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether an incomplete frame is waiting for more bytes
    pub fn has_partial(&self) -> bool {
        !self.poisoned && !self.buf.is_empty()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

/// Lazy iterator over the records completed by the buffered bytes
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Record, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_record()
    }
}

/// Frame a record for the wire
pub fn encode_frame(record: &Record) -> Result<Vec<u8>, serde_json::Error> {
    let payload = serde_json::to_vec(record)?;
    Ok(frame_payload(&payload))
}

/// Prefix an already serialized payload with its length
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
