//! Rendering of captured argument buffers.
//!
//! Key material and ciphertext are high-entropy and almost never pass the
//! printable check, so they come out as hex while plaintext stays readable.

use crate::error::{ProbeError, Result};
use crate::host::{MemoryReader, NativePointer};
use log::debug;
use std::fmt::Write;
use std::sync::Arc;

/// Value recorded for a field whose buffer could not be read.
pub const UNREADABLE: &str = "<unreadable>";

/// Separates the captured hex from the count of bytes past the cap.
pub const TRUNCATION_MARKER: &str = "…";

/// Default upper bound on bytes read for a single argument.
pub const DEFAULT_MAX_CAPTURE_LEN: usize = 4096;

/// Returns true when every byte is printable ASCII (32..=126).
pub fn is_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| (32..=126).contains(b))
}

/// Lowercase, zero-padded hex pairs with no prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Formats already-read bytes: printable text as-is, anything else as `0x` + hex.
///
/// An empty buffer formats as `0x`.
pub fn format_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() || !is_printable(bytes) {
        return format!("0x{}", to_hex(bytes));
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Reads argument buffers out of the target and formats them.
pub struct BufferFormatter {
    memory: Arc<dyn MemoryReader>,
    max_len: usize,
}

impl BufferFormatter {
    pub fn new(memory: Arc<dyn MemoryReader>, max_len: usize) -> Self {
        Self { memory, max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Reads `length` bytes at `pointer` and formats them.
    ///
    /// A buffer longer than `max_len` is only partly read, so its printable
    /// check cannot be trusted: the captured prefix always comes out as hex,
    /// followed by `TRUNCATION_MARKER` and the number of bytes left out.
    pub fn format(&self, pointer: NativePointer, length: usize) -> Result<String> {
        if length <= self.max_len {
            let bytes = self.memory.read_bytes(pointer, length)?;
            return Ok(format_bytes(&bytes));
        }

        debug!(
            "Capping capture at {} from {} bytes ({} bytes requested)",
            pointer, self.max_len, length
        );
        let bytes = self.memory.read_bytes(pointer, self.max_len)?;
        Ok(format!(
            "0x{}{}(+{} bytes)",
            to_hex(&bytes),
            TRUNCATION_MARKER,
            length - self.max_len
        ))
    }

    /// Like `format`, but takes the length as the raw argument value and
    /// interprets its low 32 bits as a signed integer.
    pub fn format_raw(&self, pointer: NativePointer, raw_length: u64) -> Result<String> {
        let length = raw_length as u32 as i32;
        if length < 0 {
            return Err(ProbeError::InvalidLength(length));
        }
        self.format(pointer, length as usize)
    }
}
