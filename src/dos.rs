//! Legacy (MZ) header.

use std::io::Write;

use crate::reader::DataReader;
use crate::writer::DataWriter;
use crate::Result;

/// DOS "MZ" signature.
pub const DOS_SIGNATURE: u16 = 0x5A4D;

/// Default upper bound on the new-header offset before a file is treated as
/// a plain DOS executable.
pub const MAX_NEW_HEADER_OFFSET: u32 = 8192;

/// Legacy header (IMAGE_DOS_HEADER).
///
/// The magic is not validated; whatever the file holds is kept and written
/// back. Only `e_lfanew` drives parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DosHeader {
    /// Magic number ("MZ" = 0x5A4D).
    pub e_magic: u16,
    /// Bytes on last page of file.
    pub e_cblp: u16,
    /// Pages in file.
    pub e_cp: u16,
    /// Relocations.
    pub e_crlc: u16,
    /// Size of header in paragraphs.
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    /// File address of relocation table.
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    /// File offset of the new (PE) header.
    pub e_lfanew: u32,
}

impl DosHeader {
    /// Size of the legacy header in bytes.
    pub const SIZE: usize = 64;

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        let mut header = Self {
            e_magic: reader.read_u16()?,
            e_cblp: reader.read_u16()?,
            e_cp: reader.read_u16()?,
            e_crlc: reader.read_u16()?,
            e_cparhdr: reader.read_u16()?,
            e_minalloc: reader.read_u16()?,
            e_maxalloc: reader.read_u16()?,
            e_ss: reader.read_u16()?,
            e_sp: reader.read_u16()?,
            e_csum: reader.read_u16()?,
            e_ip: reader.read_u16()?,
            e_cs: reader.read_u16()?,
            e_lfarlc: reader.read_u16()?,
            e_ovno: reader.read_u16()?,
            ..Self::default()
        };
        for word in header.e_res.iter_mut() {
            *word = reader.read_u16()?;
        }
        header.e_oemid = reader.read_u16()?;
        header.e_oeminfo = reader.read_u16()?;
        for word in header.e_res2.iter_mut() {
            *word = reader.read_u16()?;
        }
        header.e_lfanew = reader.read_u32()?;
        Ok(header)
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        for word in [
            self.e_magic,
            self.e_cblp,
            self.e_cp,
            self.e_crlc,
            self.e_cparhdr,
            self.e_minalloc,
            self.e_maxalloc,
            self.e_ss,
            self.e_sp,
            self.e_csum,
            self.e_ip,
            self.e_cs,
            self.e_lfarlc,
            self.e_ovno,
        ] {
            writer.write_u16(word)?;
        }
        for word in self.e_res {
            writer.write_u16(word)?;
        }
        writer.write_u16(self.e_oemid)?;
        writer.write_u16(self.e_oeminfo)?;
        for word in self.e_res2 {
            writer.write_u16(word)?;
        }
        writer.write_u32(self.e_lfanew)
    }

    /// Serialize to a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = DataWriter::new(Vec::with_capacity(Self::SIZE));
        self.write_to(&mut writer)
            .expect("writing to a Vec cannot fail");
        writer.into_inner()
    }

    /// True when the file carries no new header the parser can follow: the
    /// offset is zero, points back into this header, or exceeds `max_offset`.
    pub fn is_legacy_only(&self, max_offset: u32) -> bool {
        self.e_lfanew == 0 || self.e_lfanew < Self::SIZE as u32 || self.e_lfanew > max_offset
    }

    /// Length of the stub between this header and the new header.
    pub fn stub_len(&self) -> usize {
        (self.e_lfanew as usize).saturating_sub(Self::SIZE)
    }

    /// Size of the real-mode program described by the page counts, clamped to
    /// the new-header offset and excluding the header paragraphs.
    pub fn stub_size(&self) -> u32 {
        let mut size = u32::from(self.e_cp) * 512;
        if self.e_cblp != 0 {
            size = size.saturating_sub(512 - u32::from(self.e_cblp));
        }
        if self.e_lfanew != 0 && size > self.e_lfanew {
            size = self.e_lfanew;
        }
        size.saturating_sub(u32::from(self.e_cparhdr) * 16)
    }
}
