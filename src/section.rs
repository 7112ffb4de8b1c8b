//! Section headers, section bytes and the section table.

use std::collections::BTreeMap;
use std::io::Write;

use crate::reader::{latin1_to_string, DataReader};
use crate::rva::RvaConverter;
use crate::writer::DataWriter;
use crate::Result;

/// Section characteristics flags.
pub mod characteristics {
    /// Section contains executable code.
    pub const CODE: u32 = 0x00000020;
    /// Section contains initialized data.
    pub const INITIALIZED_DATA: u32 = 0x00000040;
    /// Section contains uninitialized data.
    pub const UNINITIALIZED_DATA: u32 = 0x00000080;
    pub const DISCARDABLE: u32 = 0x02000000;
    pub const EXECUTE: u32 = 0x20000000;
    pub const READ: u32 = 0x40000000;
    pub const WRITE: u32 = 0x80000000;
}

/// Section Header (IMAGE_SECTION_HEADER).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionHeader {
    /// Raw 8-byte name, kept verbatim.
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    /// Size of raw data on disk.
    pub size_of_raw_data: u32,
    /// File offset to raw data.
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    /// Size of a section header in bytes.
    pub const SIZE: usize = 40;

    /// Create a header with the given name, truncated to eight bytes.
    pub fn named(name: &str) -> Self {
        let mut header = Self::default();
        header.set_name(name);
        header
    }

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        let mut name = [0u8; 8];
        reader.read_exact_into(&mut name)?;
        Ok(Self {
            name,
            virtual_size: reader.read_u32()?,
            virtual_address: reader.read_u32()?,
            size_of_raw_data: reader.read_u32()?,
            pointer_to_raw_data: reader.read_u32()?,
            pointer_to_relocations: reader.read_u32()?,
            pointer_to_linenumbers: reader.read_u32()?,
            number_of_relocations: reader.read_u16()?,
            number_of_linenumbers: reader.read_u16()?,
            characteristics: reader.read_u32()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_bytes(&self.name)?;
        writer.write_u32(self.virtual_size)?;
        writer.write_u32(self.virtual_address)?;
        writer.write_u32(self.size_of_raw_data)?;
        writer.write_u32(self.pointer_to_raw_data)?;
        writer.write_u32(self.pointer_to_relocations)?;
        writer.write_u32(self.pointer_to_linenumbers)?;
        writer.write_u16(self.number_of_relocations)?;
        writer.write_u16(self.number_of_linenumbers)?;
        writer.write_u32(self.characteristics)
    }

    /// Name up to the first NUL.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        latin1_to_string(&self.name[..end])
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0; 8];
        let bytes = name.as_bytes();
        let len = bytes.len().min(8);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    /// Extent of the section in memory. A zero virtual size falls back to the
    /// raw size.
    pub fn effective_virtual_size(&self) -> u32 {
        if self.virtual_size == 0 {
            self.size_of_raw_data
        } else {
            self.virtual_size
        }
    }

    /// One past the last virtual address covered, saturating.
    pub fn virtual_end(&self) -> u32 {
        self.virtual_address
            .saturating_add(self.effective_virtual_size())
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address && rva < self.virtual_end()
    }

    /// Whether the section occupies bytes in the file.
    pub fn has_raw_data(&self) -> bool {
        self.size_of_raw_data > 0
    }

    pub fn is_executable(&self) -> bool {
        self.characteristics & characteristics::EXECUTE != 0
    }
}

/// Raw bytes of one section plus the gap bytes that preceded it in the file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionData {
    /// Exactly `size_of_raw_data` bytes.
    pub data: Vec<u8>,
    /// Gap bytes before the section; stored only when some byte is non-zero.
    pub preamble: Option<Vec<u8>>,
}

impl SectionData {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            preamble: None,
        }
    }
}

/// Section headers in file order, the bytes of each section, and the address
/// translator derived from the headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionTable {
    headers: Vec<SectionHeader>,
    sections: BTreeMap<usize, SectionData>,
    rva_converter: RvaConverter,
}

impl SectionTable {
    pub fn new(headers: Vec<SectionHeader>) -> Self {
        let rva_converter = RvaConverter::from_sections(&headers);
        Self {
            headers,
            sections: BTreeMap::new(),
            rva_converter,
        }
    }

    /// Read `count` consecutive headers.
    pub fn read_headers<R: DataReader>(reader: &mut R, count: usize) -> Result<Self> {
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            headers.push(SectionHeader::read_from(reader)?);
        }
        Ok(Self::new(headers))
    }

    pub fn write_headers<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        for header in &self.headers {
            header.write_to(writer)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn headers(&self) -> &[SectionHeader] {
        &self.headers
    }

    pub fn header(&self, index: usize) -> Option<&SectionHeader> {
        self.headers.get(index)
    }

    pub fn section(&self, index: usize) -> Option<&SectionData> {
        self.sections.get(&index)
    }

    pub fn section_mut(&mut self, index: usize) -> Option<&mut SectionData> {
        self.sections.get_mut(&index)
    }

    pub fn put_section(&mut self, index: usize, data: SectionData) {
        self.sections.insert(index, data);
    }

    pub fn remove_section(&mut self, index: usize) -> Option<SectionData> {
        self.sections.remove(&index)
    }

    /// Index of the first section whose trimmed name matches.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.name() == name)
    }

    /// Header indices ordered by file pointer, ties in table order.
    pub fn pointer_sorted(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.headers.len()).collect();
        order.sort_by_key(|&i| self.headers[i].pointer_to_raw_data);
        order
    }

    pub fn rva_converter(&self) -> &RvaConverter {
        &self.rva_converter
    }

    /// Section whose virtual range contains `rva`, searched in pointer order.
    pub fn section_for_rva(&self, rva: u32) -> Option<usize> {
        self.pointer_sorted()
            .into_iter()
            .find(|&i| self.headers[i].contains_rva(rva))
    }
}
