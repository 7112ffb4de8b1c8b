//! Little-endian cursors for reading image data.
//!
//! [`StreamReader`] wraps any [`Read`] source and only moves forward, which is
//! how the image parser walks a file. [`SliceReader`] works over a borrowed
//! buffer and additionally supports random access, which the resource and
//! bound-import decoders need to follow internal offsets.

use std::io::{self, Read};

use widestring::U16String;

use crate::{Error, Result};

/// Trait for sequential little-endian decoding.
pub trait DataReader {
    /// Current offset from the start of the data.
    fn position(&self) -> u64;

    /// Fill `buf` completely or fail with [`Error::EndOfData`].
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Advance `count` bytes without returning them.
    fn skip(&mut self, count: u64) -> Result<()>;

    /// Read everything up to the end of the data. Returns an empty vector at EOF.
    fn read_remaining(&mut self) -> Result<Vec<u8>>;

    /// Move forward to an absolute offset. Moving backwards is an error.
    fn jump_to(&mut self, target: u64) -> Result<()> {
        let position = self.position();
        if target < position {
            return Err(Error::BackwardJump { position, target });
        }
        self.skip(target - position)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_into(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact_into(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_into(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact_into(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a 4- or 8-byte value depending on the image width.
    fn read_word(&mut self, wide: bool) -> Result<u64> {
        if wide {
            self.read_u64()
        } else {
            self.read_u32().map(u64::from)
        }
    }

    /// Read an exact number of bytes into an owned buffer.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_into(&mut buf)?;
        Ok(buf)
    }

    /// Read a fixed-width single-byte string, trimmed at the first NUL.
    fn read_fixed_str(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
        Ok(latin1_to_string(&bytes[..end]))
    }

    /// Read a NUL-terminated single-byte string.
    fn read_cstr(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                b => bytes.push(b),
            }
        }
        Ok(latin1_to_string(&bytes))
    }

    /// Read a NUL-terminated UTF-16 string. `None` if the first unit is NUL.
    fn read_wide_cstr(&mut self) -> Result<Option<String>> {
        let mut units = Vec::new();
        loop {
            match self.read_u16()? {
                0 => break,
                unit => units.push(unit),
            }
        }
        if units.is_empty() {
            return Ok(None);
        }
        Ok(Some(U16String::from_vec(units).to_string_lossy()))
    }

    /// Read exactly `units` UTF-16 code units.
    fn read_fixed_wide(&mut self, units: usize) -> Result<String> {
        let mut buf = Vec::with_capacity(units);
        for _ in 0..units {
            buf.push(self.read_u16()?);
        }
        Ok(U16String::from_vec(buf).to_string_lossy())
    }
}

/// Map bytes to chars one-to-one, so the text can be written back unchanged.
pub(crate) fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Forward-only reader over any byte stream.
#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> DataReader for StreamReader<R> {
    fn position(&self) -> u64 {
        self.position
    }

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::EndOfData {
                        offset: self.position + filled as u64,
                        needed: (buf.len() - filled) as u64,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.position += filled as u64;
        Ok(())
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(count), &mut io::sink())?;
        self.position += copied;
        if copied < count {
            return Err(Error::EndOfData {
                offset: self.position,
                needed: count - copied,
            });
        }
        Ok(())
    }

    fn read_remaining(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner.read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        Ok(buf)
    }

    // Grows the buffer as bytes arrive, so a bogus length in a header cannot
    // force a huge allocation up front.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        self.position += buf.len() as u64;
        if buf.len() < len {
            return Err(Error::EndOfData {
                offset: self.position,
                needed: (len - buf.len()) as u64,
            });
        }
        Ok(buf)
    }
}

/// Reader over a borrowed buffer with random access inside it.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Move to any offset within the buffer, backwards included.
    pub fn seek(&mut self, offset: i64) -> Result<()> {
        match usize::try_from(offset) {
            Ok(pos) if pos <= self.data.len() => {
                self.position = pos;
                Ok(())
            }
            _ => Err(Error::OffsetOutOfBounds {
                offset,
                size: self.data.len(),
            }),
        }
    }
}

impl DataReader for SliceReader<'_> {
    fn position(&self) -> u64 {
        self.position as u64
    }

    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let available = self.remaining();
        if buf.len() > available {
            return Err(Error::EndOfData {
                offset: self.data.len() as u64,
                needed: (buf.len() - available) as u64,
            });
        }
        buf.copy_from_slice(&self.data[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        let available = self.remaining() as u64;
        if count > available {
            self.position = self.data.len();
            return Err(Error::EndOfData {
                offset: self.data.len() as u64,
                needed: count - available,
            });
        }
        self.position += count as usize;
        Ok(())
    }

    fn read_remaining(&mut self) -> Result<Vec<u8>> {
        let rest = self.data[self.position..].to_vec();
        self.position = self.data.len();
        Ok(rest)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let available = self.remaining();
        if len > available {
            return Err(Error::EndOfData {
                offset: self.data.len() as u64,
                needed: (len - available) as u64,
            });
        }
        let bytes = self.data[self.position..self.position + len].to_vec();
        self.position += len;
        Ok(bytes)
    }
}
