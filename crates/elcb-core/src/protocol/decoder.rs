//! Streaming newline-delimited JSON frame decoder.
//!
//! A serial port is a *byte stream*: a single read may return half a line,
//! or three lines and the start of a fourth.  [`FrameDecoder`] accumulates
//! bytes across reads and yields one [`DeviceFrame`] per complete line.
//!
//! # Discard policy
//!
//! Lines are dropped without surfacing an error when they:
//!
//! - are empty after trimming,
//! - do not start with `{` (bootloader banners, debug prints),
//! - are not valid UTF-8 or not valid JSON (partial writes after a reset).
//!
//! Parse failures are expected during boot and are logged at `debug` only.
//!
//! # Bounded buffering
//!
//! A device emitting garbage without newlines must not grow the buffer
//! forever.  Once `max_line_bytes` accumulate without a newline, the buffer
//! is cleared and the decoder skips everything up to and including the next
//! newline, so the tail of the oversized line is never parsed as a fresh one.

use serde::Deserialize;
use tracing::{debug, trace};

use crate::protocol::telemetry::{DeviceFrame, TelemetryRecord};

/// Default upper bound on a single line, in bytes.
///
/// The longest record the firmware prints (`data`) is under 128 bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4096;

/// Incremental line decoder for the device's serial stream.
///
/// # Examples
///
/// ```rust
/// use elcb_core::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// assert_eq!(decoder.push(b"{\"type\":\"boot\",").count(), 0);
/// let frames: Vec<_> = decoder.push(b"\"status\":\"ready\"}\r\n").collect();
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].raw, r#"{"type":"boot","status":"ready"}"#);
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_line_bytes: usize,
    /// Set after an overflow; cleared by the next newline.
    skipping: bool,
}

impl FrameDecoder {
    /// Creates a decoder bounded by [`DEFAULT_MAX_LINE_BYTES`].
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    /// Creates a decoder that discards any line longer than `max_line_bytes`.
    ///
    /// A bound of zero is raised to one byte.
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        let max_line_bytes = max_line_bytes.max(1);
        Self {
            buffer: Vec::with_capacity(max_line_bytes.min(1024)),
            max_line_bytes,
            skipping: false,
        }
    }

    /// Feeds a chunk of bytes and returns the frames completed by it.
    ///
    /// Bytes after the last newline stay buffered for the next call.  The
    /// returned iterator borrows the chunk, not the decoder's buffer, so it
    /// is cheap to drop early; frames it has not yielded are simply lost.
    pub fn push<'a>(&'a mut self, bytes: &'a [u8]) -> Frames<'a> {
        Frames {
            decoder: self,
            input: bytes,
        }
    }

    /// Discards any partial line and overflow state.
    ///
    /// Called whenever the underlying transport is reopened: bytes left over
    /// from the previous session belong to a line that will never finish.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.skipping = false;
    }

    /// Number of bytes currently buffered for an incomplete line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// The configured line bound.
    pub fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Consumes one byte; returns a frame when it completes a valid line.
    fn accept(&mut self, byte: u8) -> Option<DeviceFrame> {
        if byte == b'\n' {
            if self.skipping {
                self.skipping = false;
                self.buffer.clear();
                return None;
            }
            let frame = match std::str::from_utf8(&self.buffer) {
                Ok(line) => decode_line(line),
                Err(_) => {
                    debug!("discarding non-UTF-8 line ({} bytes)", self.buffer.len());
                    None
                }
            };
            self.buffer.clear();
            return frame;
        }

        if self.skipping {
            return None;
        }

        if self.buffer.len() >= self.max_line_bytes {
            debug!(
                "no newline within {} bytes; dropping buffered line",
                self.max_line_bytes
            );
            self.buffer.clear();
            self.skipping = true;
            return None;
        }

        self.buffer.push(byte);
        None
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the frames completed by one [`FrameDecoder::push`] call.
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    input: &'a [u8],
}

impl Iterator for Frames<'_> {
    type Item = DeviceFrame;

    fn next(&mut self) -> Option<DeviceFrame> {
        while let Some((&byte, rest)) = self.input.split_first() {
            self.input = rest;
            if let Some(frame) = self.decoder.accept(byte) {
                return Some(frame);
            }
        }
        None
    }
}

impl Drop for Frames<'_> {
    /// Buffers the unread remainder so an early drop never loses the start of
    /// a partial line.
    fn drop(&mut self) {
        for &byte in self.input {
            // Completed frames in the remainder are dropped with the iterator.
            let _ = self.decoder.accept(byte);
        }
    }
}

/// Decodes a single line (without its newline) into a [`DeviceFrame`].
///
/// Returns `None` for lines that should be discarded: empty, not starting
/// with `{`, or not a valid JSON object.  A valid object whose shape is not
/// one of the known records yields [`TelemetryRecord::Unrecognized`].
pub fn decode_line(line: &str) -> Option<DeviceFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('{') {
        debug!("discarding non-JSON line: {:?}", truncate_for_log(trimmed));
        return None;
    }

    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            debug!("discarding malformed JSON line ({e}): {:?}", truncate_for_log(trimmed));
            return None;
        }
    };

    let record = TelemetryRecord::deserialize(&value).unwrap_or(TelemetryRecord::Unrecognized);
    trace!("decoded {} frame", record.kind());

    Some(DeviceFrame {
        raw: trimmed.to_string(),
        record,
    })
}

fn truncate_for_log(line: &str) -> &str {
    match line.char_indices().nth(80) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
