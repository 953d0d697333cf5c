//! Buffer module - Growable big-endian byte buffer.
//!
//! One type serves both ends of the pipeline: source files are loaded
//! into a [`ByteBuffer`] before lexing, and the emitter builds the
//! output image in one before it is written to disk. All multi-byte
//! writes are big-endian, matching the Glulx container format.
//!
//! Keeping every byte-order-sensitive write in this module lets the
//! encoders be tested without a full assembly run.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Growable byte buffer with big-endian writers.
///
/// # Examples
///
/// ```
/// use gasm_util::buffer::ByteBuffer;
///
/// let mut buffer = ByteBuffer::new();
/// buffer.push_word(0x476C756C);
/// assert_eq!(buffer.as_slice(), &[0x47, 0x6C, 0x75, 0x6C]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a file's entire contents (in binary mode).
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self { data })
    }

    /// Load everything available on standard input.
    pub fn from_stdin() -> io::Result<Self> {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        Ok(Self { data })
    }

    /// Current length in bytes. During emission this doubles as the
    /// code position: the offset the next byte will land at.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Append one byte.
    pub fn push_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Append a 16-bit value, big-endian.
    pub fn push_short(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a 32-bit value, big-endian.
    pub fn push_word(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a raw byte slice.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append `value` at the given width: 1, 2, or 4 bytes, big-endian,
    /// truncating from the low end.
    pub fn push_variable(&mut self, value: u32, width: u32) {
        match width {
            1 => self.push_byte(value as u8),
            2 => self.push_short(value as u16),
            4 => self.push_word(value),
            _ => unreachable!("variable write width {} is not 1, 2, or 4", width),
        }
    }

    /// Append `count` zero bytes.
    pub fn push_zeroes(&mut self, count: usize) {
        self.data.resize(self.data.len() + count, 0);
    }

    /// Append zero bytes until the length is a multiple of `boundary`.
    ///
    /// `boundary` must be non-zero.
    pub fn pad_to(&mut self, boundary: usize) {
        while self.data.len() % boundary != 0 {
            self.data.push(0);
        }
    }

    /// Overwrite one byte at a fixed offset. The offset must already
    /// have been written.
    pub fn set_byte(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Overwrite a 32-bit big-endian value at a fixed offset.
    pub fn set_word(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Overwrite `value` at the given offset and width (1, 2, or 4
    /// bytes, big-endian).
    pub fn set_variable(&mut self, offset: usize, value: u32, width: u32) {
        match width {
            1 => self.set_byte(offset, value as u8),
            2 => self.data[offset..offset + 2].copy_from_slice(&(value as u16).to_be_bytes()),
            4 => self.set_word(offset, value),
            _ => unreachable!("variable write width {} is not 1, 2, or 4", width),
        }
    }

    /// Sum of the buffer's big-endian 32-bit words, modulo 2^32.
    /// A trailing partial word is ignored.
    pub fn checksum_words(&self) -> u32 {
        self.data
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .fold(0u32, u32::wrapping_add)
    }

    /// Write the buffer to a file, creating or truncating it.
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(&self.data)
    }
}
