//! zlib-stream decompression
//!
//! The gateway compresses the whole connection as one continuous zlib stream
//! and sync-flushes after every payload. Binary frames are buffered until the
//! buffer ends with the sync-flush marker, then inflated with the connection's
//! single inflate context.

use crate::error::DecodeError;
use flate2::{Decompress, FlushDecompress, Status};

/// Trailing bytes of a sync flush; marks the end of one payload
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Buffering inflater for one connection
///
/// Must be [`reset`](Self::reset) whenever a new connection is opened; the
/// server starts a new compression stream for every connection.
pub struct StreamInflater {
    buffer: Vec<u8>,
    inflate: Decompress,
}

impl StreamInflater {
    /// Create an inflater with an empty buffer and a fresh context
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            inflate: Decompress::new(true),
        }
    }

    /// Drop any buffered bytes and start a fresh inflate context
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.inflate = Decompress::new(true);
    }

    /// Number of bytes waiting for a sync-flush marker
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one binary fragment
    ///
    /// Returns `Ok(None)` until the accumulated buffer ends with
    /// [`ZLIB_SUFFIX`], then the decoded text of the complete payload.
    pub fn push(&mut self, fragment: &[u8]) -> Result<Option<String>, DecodeError> {
        self.buffer.extend_from_slice(fragment);
        if !self.buffer.ends_with(&ZLIB_SUFFIX) {
            return Ok(None);
        }

        let result = self.inflate_buffer();
        self.buffer.clear();
        let bytes = result?;

        Ok(Some(String::from_utf8(bytes)?))
    }

    fn inflate_buffer(&mut self) -> Result<Vec<u8>, DecodeError> {
        let input = &self.buffer;
        let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(256));
        let mut consumed = 0usize;

        loop {
            let in_before = self.inflate.total_in();
            let out_before = output.len();

            let status =
                self.inflate
                    .decompress_vec(&input[consumed..], &mut output, FlushDecompress::Sync)?;
            consumed += (self.inflate.total_in() - in_before) as usize;

            if status == Status::StreamEnd {
                break;
            }
            if output.len() == output.capacity() {
                // Output filled up; there may be more pending.
                output.reserve(output.capacity());
                continue;
            }
            if consumed >= input.len() {
                break;
            }
            if output.len() == out_before && self.inflate.total_in() == in_before {
                break;
            }
        }

        Ok(output)
    }
}

impl Default for StreamInflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamInflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInflater")
            .field("buffered", &self.buffer.len())
            .field("total_in", &self.inflate.total_in())
            .field("total_out", &self.inflate.total_out())
            .finish()
    }
}
