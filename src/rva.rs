//! Virtual address to file offset translation.

use crate::section::SectionHeader;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    virtual_address: u32,
    virtual_size: u32,
    pointer_to_raw_data: u32,
}

/// Maps virtual addresses to file offsets using the section headers.
///
/// Mappings are kept sorted by file pointer; when ranges overlap, the section
/// that appears first in the file wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RvaConverter {
    mappings: Vec<Mapping>,
}

impl RvaConverter {
    pub fn from_sections(headers: &[SectionHeader]) -> Self {
        let mut mappings: Vec<Mapping> = headers
            .iter()
            .map(|h| Mapping {
                virtual_address: h.virtual_address,
                virtual_size: h.effective_virtual_size(),
                pointer_to_raw_data: h.pointer_to_raw_data,
            })
            .collect();
        mappings.sort_by_key(|m| m.pointer_to_raw_data);
        Self { mappings }
    }

    /// Translate a virtual address to a file offset.
    pub fn to_file_offset(&self, rva: u32) -> Result<u32> {
        self.mappings
            .iter()
            .find(|m| rva >= m.virtual_address && rva - m.virtual_address < m.virtual_size)
            .and_then(|m| m.pointer_to_raw_data.checked_add(rva - m.virtual_address))
            .ok_or(Error::UnmappedAddress(rva))
    }

    /// Translate a file offset back to a virtual address.
    pub fn to_rva(&self, offset: u32) -> Option<u32> {
        self.mappings
            .iter()
            .find(|m| {
                offset >= m.pointer_to_raw_data && offset - m.pointer_to_raw_data < m.virtual_size
            })
            .and_then(|m| m.virtual_address.checked_add(offset - m.pointer_to_raw_data))
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
