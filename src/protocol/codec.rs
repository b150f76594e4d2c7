//! Framing for the CLI's stdio pipes
//!
//! Pipe reads arrive in arbitrary chunks: one record may span several reads
//! and one read may hold several records. [`RecordCodec`] keeps the trailing
//! partial line in the read buffer until its newline arrives.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::parser::{decode, encode_record};
use crate::error::{RelayError, Result};
use crate::types::records::{ProtocolRecord, UserTurn};

/// Default maximum length of a single line (1MB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Newline-delimited `stream-json` codec
///
/// Decoding yields one item per complete line that carries a record:
/// `Ok(record)` or `Err(RelayError::Protocol)`. Protocol errors are items,
/// not stream errors, so one bad line never ends the stream.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    max_line_length: usize,
    /// Bytes already scanned for a newline
    next_index: usize,
    /// Dropping the remainder of an oversized line
    discarding: bool,
}

impl RecordCodec {
    /// Create a codec with the default line length limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec that rejects lines longer than `max_line_length` bytes
    #[must_use]
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Configured line length limit
    #[must_use]
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    fn oversized(&self, head: &[u8]) -> RelayError {
        let head = &head[..head.len().min(64)];
        RelayError::protocol(
            format!(
                "Line exceeded maximum length of {} bytes",
                self.max_line_length
            ),
            String::from_utf8_lossy(head).into_owned(),
        )
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one complete line, `None` when it carries nothing
fn decode_line(line: &[u8]) -> Option<Result<ProtocolRecord>> {
    match std::str::from_utf8(line) {
        Ok(text) => decode(text).transpose(),
        Err(_) => {
            let lossy = String::from_utf8_lossy(line);
            Some(Err(RelayError::protocol(
                "Line is not valid UTF-8",
                lossy.trim(),
            )))
        }
    }
}

impl Decoder for RecordCodec {
    type Item = Result<ProtocolRecord>;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<Self::Item>> {
        loop {
            let start = self.next_index.min(buf.len());
            let Some(offset) = buf[start..].iter().position(|b| *b == b'\n') else {
                if buf.len() > self.max_line_length {
                    let was_discarding = self.discarding;
                    let err = self.oversized(buf);
                    buf.clear();
                    self.next_index = 0;
                    self.discarding = true;
                    if !was_discarding {
                        return Ok(Some(Err(err)));
                    }
                    return Ok(None);
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let end = start + offset;
            let line = buf.split_to(end + 1);
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let line = &line[..end];
            if line.len() > self.max_line_length {
                return Ok(Some(Err(self.oversized(line))));
            }

            if let Some(item) = decode_line(line) {
                return Ok(Some(item));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<Self::Item>> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        // Unterminated final fragment
        let line = buf.split_to(buf.len());
        self.next_index = 0;
        if std::mem::take(&mut self.discarding) {
            return Ok(None);
        }
        Ok(decode_line(&line))
    }
}

impl Encoder<UserTurn> for RecordCodec {
    type Error = RelayError;

    fn encode(&mut self, item: UserTurn, dst: &mut BytesMut) -> Result<()> {
        let line = encode_record(&item)?;
        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}
