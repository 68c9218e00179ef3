//! Receive-side byte buffering and line extraction
//!
//! The board terminates every response with `\n`, but bytes arrive from the
//! serial port in arbitrary chunks. The assembler buffers raw bytes and hands
//! out complete lines (or fixed-size byte runs) on demand, leaving partial
//! input untouched until the terminator shows up.

/// Accumulates raw serial bytes and extracts newline-terminated lines.
///
/// One assembler exists per device handle, owned by its reader thread.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    /// Assembler with an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    /// Appends a chunk of received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extracts the next complete line, if one is buffered.
    ///
    /// Consumes everything up to and including the first `\n` and returns the
    /// line with trailing whitespace (including `\r`) stripped. A line that
    /// is empty after stripping is still consumed but yields `None`, exactly
    /// like a buffer with no terminator in it. Invalid UTF-8 is replaced
    /// rather than rejected; the board only ever sends ASCII.
    pub fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buf.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
        let line = line.trim_end();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }

    /// Extracts exactly `n` raw bytes.
    ///
    /// Succeeds only when more than `n` bytes are buffered, so a run that is
    /// still in flight is never split; otherwise the buffer is left alone.
    pub fn take_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.buf.len() > n {
            Some(self.buf.drain(..n).collect())
        } else {
            None
        }
    }
}
