//! Streaming reply line codec
//!
//! Bytes arrive from the serial port in arbitrary chunks. The codec buffers
//! them and hands back complete lines, split on LF with any CR stripped.

use crate::command::Response;
use crate::ReplyCodec;

/// Maximum line length (reasonable limit to prevent buffer overflow)
const MAX_LINE_LEN: usize = 128;

/// Streaming CRLF line splitter
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyCodec for LineCodec {
    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Unterminated garbage: keep only the tail
        if self.buffer.len() > MAX_LINE_LEN * 4 && !self.buffer.contains(&b'\n') {
            let start = self.buffer.len() - MAX_LINE_LEN;
            tracing::warn!("Discarding {} unterminated bytes", start);
            self.buffer.drain(..start);
        }
    }

    fn next_line(&mut self) -> Option<String> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == b'\n')?;
            let line_bytes: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\r', '\n']).trim();

            if line.is_empty() {
                continue;
            }
            return Some(line.to_string());
        }
    }

    fn next_response(&mut self) -> Option<Response> {
        self.next_line().map(|line| Response::parse(&line))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}
