//! Accumulation of not-yet-delimited stream text.
//!
//! Chunks are concatenated before scanning, so a delimiter split across two
//! chunks is still found. A UTF-8 sequence cut by a chunk boundary is carried
//! over to the next chunk instead of being treated as invalid.

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::event::Event;
use crate::scanner::{boundary, resume_point, DELIMITER};

/// What was left in the buffer when the stream ended.
///
/// A trailing block without its closing delimiter is not a well-formed event
/// and is never delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remnant {
    pub text: String,
    /// Bytes of an unfinished UTF-8 sequence.
    pub undecoded: usize,
}

impl Remnant {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.undecoded == 0
    }
}

#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// Decoded text that does not yet contain a delimiter.
    pending: String,
    /// Leading bytes of a character whose remaining bytes are still in flight.
    carry: Vec<u8>,
    /// Total bytes accepted so far, for error offsets.
    consumed: usize,
    skip_empty_events: bool,
    max_pending_bytes: Option<usize>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &StreamConfig) -> Self {
        Self {
            skip_empty_events: config.skip_empty_events,
            max_pending_bytes: config.max_pending_bytes,
            ..Self::default()
        }
    }

    /// Append one chunk and drain every event it completes, in arrival order.
    ///
    /// On a decoding error nothing is appended.
    pub fn append(&mut self, chunk: &[u8]) -> StreamResult<Vec<Event>> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        // Text already pending was scanned by earlier appends.
        let mut from = resume_point(&self.pending);
        self.decode(chunk)?;

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(pos) = boundary(&self.pending, from) {
            let event = &self.pending[start..pos];
            if !(self.skip_empty_events && event.is_empty()) {
                events.push(Event::from(event));
            }
            start = pos + DELIMITER.len();
            from = start;
        }
        self.pending.drain(..start);

        Ok(events)
    }

    /// Fails once `pending` outgrows the configured limit.
    pub fn ensure_capacity(&self) -> StreamResult<()> {
        match self.max_pending_bytes {
            Some(limit) if self.pending.len() > limit => Err(StreamError::BufferOverflow { limit }),
            _ => Ok(()),
        }
    }

    /// End of stream: hand back (and forget) whatever never got a delimiter.
    pub fn finish(&mut self) -> Remnant {
        Remnant {
            text: std::mem::take(&mut self.pending),
            undecoded: std::mem::take(&mut self.carry).len(),
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.carry.is_empty()
    }

    fn decode(&mut self, chunk: &[u8]) -> StreamResult<()> {
        // Stream offset of the first byte we are about to decode.
        let base = self.consumed - self.carry.len();

        let joined;
        let bytes: &[u8] = if self.carry.is_empty() {
            chunk
        } else {
            let mut buf = self.carry.clone();
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        let (text, tail) = match std::str::from_utf8(bytes) {
            Ok(text) => (text, &[][..]),
            Err(err) => {
                let valid = err.valid_up_to();
                if err.error_len().is_some() {
                    return Err(StreamError::Decoding {
                        offset: base + valid,
                    });
                }
                let (head, tail) = bytes.split_at(valid);
                let text = std::str::from_utf8(head).map_err(|_| StreamError::Decoding {
                    offset: base + valid,
                })?;
                (text, tail)
            }
        };

        self.pending.push_str(text);
        self.carry = tail.to_vec();
        self.consumed += chunk.len();
        Ok(())
    }
}
