//! Incremental decoder for the chat event stream.
//!
//! The body arrives in arbitrary chunks. A chunk may end in the middle of a
//! line, or in the middle of a multi-byte UTF-8 character, so the decoder
//! keeps two pieces of carry-over state between calls: undecoded trailing
//! bytes and the trailing incomplete line.

use chat_core::{StreamEvent, DONE_SENTINEL};
use tracing::{debug, warn};

/// Prefix of lines that carry an event payload.
pub const DATA_PREFIX: &str = "data:";

/// One item produced by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete, well-formed event.
    Event(StreamEvent),
    /// The end-of-stream sentinel was seen.
    Done,
}

/// Rolling line decoder.
#[derive(Debug, Default)]
pub struct EventDecoder {
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk.
    pending: Vec<u8>,
    /// Text after the last newline seen.
    buffer: String,
    done: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the end-of-stream sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one chunk of the body and return the items it completes.
    ///
    /// Once [`Decoded::Done`] has been returned, further input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Decoded> {
        if self.done {
            return Vec::new();
        }

        self.decode_utf8(chunk);

        let mut items = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].find('\n') {
            let end = start + offset;
            let item = process_line(&self.buffer[start..end]);
            start = end + 1;

            match item {
                Some(Decoded::Done) => {
                    self.finish_with_done(&mut items);
                    return items;
                }
                Some(item) => items.push(item),
                None => {}
            }
        }
        self.buffer.drain(..start);

        items
    }

    /// Flush state at end of input.
    ///
    /// Any carried bytes are decoded lossily and a final unterminated line is
    /// processed as if it had been terminated.
    pub fn finish(&mut self) -> Vec<Decoded> {
        if self.done {
            return Vec::new();
        }

        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push_str(&tail);
            self.pending.clear();
        }

        let line = std::mem::take(&mut self.buffer);
        let mut items = Vec::new();
        match process_line(&line) {
            Some(Decoded::Done) => self.finish_with_done(&mut items),
            Some(item) => items.push(item),
            None => {}
        }
        items
    }

    fn finish_with_done(&mut self, items: &mut Vec<Decoded>) {
        self.done = true;
        self.buffer.clear();
        self.pending.clear();
        items.push(Decoded::Done);
    }

    /// Append `chunk` to the text buffer, carrying an incomplete trailing
    /// sequence over to the next call. Invalid sequences become U+FFFD.
    fn decode_utf8(&mut self, chunk: &[u8]) {
        let bytes = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            joined
        };

        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    self.buffer
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());

                    match err.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Interpret one complete line.
fn process_line(line: &str) -> Option<Decoded> {
    let data = line.trim().strip_prefix(DATA_PREFIX)?.trim();
    if data.is_empty() {
        return None;
    }
    if data == DONE_SENTINEL {
        debug!("Received end-of-stream sentinel");
        return Some(Decoded::Done);
    }

    match StreamEvent::from_json(data) {
        Ok(event) => Some(Decoded::Event(event)),
        Err(e) => {
            warn!("Failed to parse stream event: {}", e);
            debug!("Raw data: {}", data);
            None
        }
    }
}
