//! Incremental decoder for `text/event-stream` bodies.
//!
//! The response body arrives in arbitrary byte chunks: a chunk may hold several
//! events, or end in the middle of a line (or of a multi-byte character).
//! [`SseDecoder`] buffers partial lines and yields the `data` payload of each
//! complete event.
//!
//! Only the subset of the format the job service emits is interpreted:
//!
//! - `data:` lines (one optional leading space stripped) accumulate, joined by
//!   `\n`;
//! - a blank line dispatches the event;
//! - comment lines (leading `:`) and other fields are ignored;
//! - lines may end in `\n`, `\r\n` or `\r`.

use bytes::{Buf, BytesMut};

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    data: Option<String>,
    // A chunk ended right after `\r`; a leading `\n` in the next chunk
    // belongs to the same line break.
    pending_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of the body and returns the data of every event it
    /// completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.pending_cr {
            self.pending_cr = false;
            if let Some(rest) = chunk.strip_prefix(b"\n") {
                chunk = rest;
            }
        }
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| matches!(b, b'\n' | b'\r')) {
            let line = self.buf.split_to(pos);
            let terminator = self.buf[0];
            self.buf.advance(1);
            if terminator == b'\r' {
                match self.buf.first() {
                    Some(b'\n') => self.buf.advance(1),
                    Some(_) => {}
                    None => self.pending_cr = true,
                }
            }

            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes an event left undispatched when the body ended without a
    /// trailing blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buf.is_empty() {
            let line = self.buf.split();
            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                return Some(event);
            }
        }
        self.data.take()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.data.take();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        None
    }
}
