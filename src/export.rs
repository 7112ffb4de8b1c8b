//! Export directory.

use crate::reader::{DataReader, SliceReader};
use crate::Result;

/// IMAGE_EXPORT_DIRECTORY plus the bytes it was decoded from.
///
/// Only the 40-byte fixed record is interpreted. `raw` holds the whole
/// directory (name tables, address tables and strings) and is what gets
/// written back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// RVA of the DLL name.
    pub name_rva: u32,
    /// Starting ordinal number.
    pub ordinal_base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    pub address_of_name_ordinals: u32,
    pub raw: Vec<u8>,
}

impl ExportDirectory {
    /// Size of the fixed record.
    pub const SIZE: usize = 40;

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        Ok(Self {
            characteristics: reader.read_u32()?,
            time_date_stamp: reader.read_u32()?,
            major_version: reader.read_u16()?,
            minor_version: reader.read_u16()?,
            name_rva: reader.read_u32()?,
            ordinal_base: reader.read_u32()?,
            number_of_functions: reader.read_u32()?,
            number_of_names: reader.read_u32()?,
            address_of_functions: reader.read_u32()?,
            address_of_names: reader.read_u32()?,
            address_of_name_ordinals: reader.read_u32()?,
            raw: bytes.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.raw.clone()
    }

    /// DLL name, when it lies inside the retained bytes. `base_va` is the
    /// virtual address of the first retained byte.
    pub fn dll_name(&self, base_va: u32) -> Option<String> {
        let offset = self.name_rva.checked_sub(base_va)?;
        let mut reader = SliceReader::new(&self.raw);
        reader.seek(i64::from(offset)).ok()?;
        reader.read_cstr().ok()
    }
}
