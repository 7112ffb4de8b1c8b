//! Little-endian cursor for writing image data.

use std::io::Write;

use widestring::U16String;

use crate::Result;

/// Sequential writer that tracks how many bytes it has emitted.
#[derive(Debug)]
pub struct DataWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> DataWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a 4- or 8-byte value depending on the image width.
    pub fn write_word(&mut self, value: u64, wide: bool) -> Result<()> {
        if wide {
            self.write_u64(value)
        } else {
            self.write_u32(value as u32)
        }
    }

    pub fn write_zeros(&mut self, count: u64) -> Result<()> {
        const CHUNK: [u8; 512] = [0; 512];
        let mut left = count;
        while left > 0 {
            let n = left.min(CHUNK.len() as u64) as usize;
            self.write_bytes(&CHUNK[..n])?;
            left -= n as u64;
        }
        Ok(())
    }

    /// Write a single-byte string into exactly `len` bytes, NUL-padded or truncated.
    pub fn write_fixed_str(&mut self, value: &str, len: usize) -> Result<()> {
        let mut bytes = string_to_latin1(value);
        bytes.resize(len, 0);
        self.write_bytes(&bytes)
    }

    /// Write a single-byte string followed by a NUL.
    pub fn write_cstr(&mut self, value: &str) -> Result<()> {
        self.write_bytes(&string_to_latin1(value))?;
        self.write_u8(0)
    }

    /// Write a UTF-16 string followed by a NUL unit.
    pub fn write_wide_cstr(&mut self, value: &str) -> Result<()> {
        self.write_fixed_wide(value)?;
        self.write_u16(0)
    }

    /// Write a UTF-16 string with no terminator.
    pub fn write_fixed_wide(&mut self, value: &str) -> Result<()> {
        for unit in U16String::from_str(value).as_slice() {
            self.write_u16(*unit)?;
        }
        Ok(())
    }
}

/// Inverse of the reader's byte-to-char mapping. Chars above U+00FF become `?`.
pub(crate) fn string_to_latin1(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Number of UTF-16 code units `value` encodes to.
pub(crate) fn wide_len(value: &str) -> usize {
    value.encode_utf16().count()
}
