// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tail-preserving capture buffer for process output streams.

use fx_core::{ELISION_MARKER, STREAM_CAP_BYTES};

/// Ring-style byte buffer that keeps at most `cap` trailing bytes.
///
/// Bounds agent memory under pathological output floods; the tail is what
/// users need for diagnosing failures, so the head is what gets dropped.
#[derive(Debug)]
pub struct TailBuffer {
    cap: usize,
    buf: Vec<u8>,
    truncated: bool,
}

impl TailBuffer {
    pub fn new(cap: usize) -> Self {
        Self { cap, buf: Vec::new(), truncated: false }
    }

    /// Buffer with the standard per-stream cap.
    pub fn stream() -> Self {
        Self::new(STREAM_CAP_BYTES)
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if chunk.len() >= self.cap {
            // Chunk alone exceeds the cap: keep only its tail.
            self.truncated = self.truncated || !self.buf.is_empty() || chunk.len() > self.cap;
            self.buf.clear();
            self.buf.extend_from_slice(&chunk[chunk.len() - self.cap..]);
            return;
        }
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.cap);
        if overflow > 0 {
            self.buf.drain(..overflow);
            self.truncated = true;
        }
        self.buf.extend_from_slice(chunk);
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Render the captured tail, prepending the elision marker when earlier
    /// bytes were dropped.
    pub fn into_string(self) -> String {
        let tail = String::from_utf8_lossy(&self.buf);
        if self.truncated {
            format!("{}{}", ELISION_MARKER, tail)
        } else {
            tail.into_owned()
        }
    }
}

#[cfg(test)]
#[path = "tail_tests.rs"]
mod tests;
