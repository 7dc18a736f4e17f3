//! Line reassembly for chunked child-process output.

use std::collections::VecDeque;

/// Lines kept by a default [`LineTail`]
pub const DEFAULT_TAIL_LINES: usize = 64;

/// Reassembles text lines from byte chunks that need not align with line
/// boundaries.
///
/// Bytes are split on `\n` or `\r` (tqdm-style progress bars redraw with a
/// bare carriage return). The trailing fragment is held back until the next
/// chunk arrives or [`LineBuffer::finish`] is called, so a multi-byte UTF-8
/// character split across two reads decodes correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, trimmed.
    /// Blank lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for (idx, byte) in self.pending.iter().enumerate() {
            if *byte == b'\n' || *byte == b'\r' {
                if let Some(line) = decode_line(&self.pending[start..idx]) {
                    lines.push(line);
                }
                start = idx + 1;
            }
        }
        self.pending.drain(..start);

        lines
    }

    /// Flush the held-back fragment at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// The most recent lines of a stream. Older lines are dropped once
/// `capacity` is reached, so a chatty process costs bounded memory.
#[derive(Debug, Clone)]
pub struct LineTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LineTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    /// The last `count` lines joined with `\n`, or `None` if nothing was kept.
    pub fn last(&self, count: usize) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let skip = self.lines.len().saturating_sub(count);
        let tail: Vec<&str> = self.lines.iter().skip(skip).map(String::as_str).collect();
        Some(tail.join("\n"))
    }

    /// Every kept line joined with `\n`.
    pub fn join(&self) -> String {
        self.last(self.capacity).unwrap_or_default()
    }
}

impl Default for LineTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LINES)
    }
}
