//! Newline-delimited codec for executor streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so that
//! an unterminated or oversized packet cannot exhaust memory on either side.
//!
//! # Usage
//!
//! Use [`LineCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`]. Partial lines stay buffered inside the
//! codec until their `\n` arrives, however the reads happen to be chunked.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use farside::protocol::codec::LineCodec;
//!
//! let lines = FramedRead::new(child_stdout, LineCodec::new());
//! ```
//!
//! Over-long lines are reported as a frame of their own instead of a decode
//! error: `FramedRead` ends its stream after any decoder error, and that would
//! leave complete lines stranded in the read buffer.

use bytes::BytesMut;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{BridgeError, Result};

/// Default maximum line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A complete line, without its terminator.
    Text(String),
    /// A line longer than the limit. Its bytes were dropped up to the next
    /// newline.
    TooLong,
}

/// Line codec for bidirectional executor streams.
///
/// Each newline-terminated UTF-8 string is one packet. Inbound lines longer
/// than the configured limit decode as [`Line::TooLong`] rather than as an
/// error, so a [`tokio_util::codec::FramedRead`] keeps going after them.
#[derive(Debug)]
pub struct LineCodec {
    inner: LinesCodec,
    max_line_bytes: usize,
}

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_bytes),
            max_line_bytes,
        }
    }

    /// Longest accepted line in bytes.
    #[must_use]
    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    fn frame(decoded: std::result::Result<Option<String>, LinesCodecError>) -> Result<Option<Line>> {
        match decoded {
            Ok(line) => Ok(line.map(Line::Text)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Line::TooLong)),
            Err(LinesCodecError::Io(io_err)) => Err(BridgeError::Io(io_err.to_string())),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Line;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Self::frame(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Self::frame(self.inner.decode_eof(src))
    }
}

impl Encoder<String> for LineCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // The limit applies only to decoding.
        self.inner
            .encode(item, dst)
            .map_err(|e| BridgeError::Io(e.to_string()))
    }
}

/// Serialize `packet` as one compact JSON line, newline included.
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] if serialization fails.
pub fn encode_line<T: Serialize>(packet: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(packet)
        .map_err(|e| BridgeError::Protocol(format!("failed to serialise packet: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}
