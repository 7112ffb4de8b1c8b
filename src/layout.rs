//! Alignment helpers and section layout for building images.

use crate::coff::{CoffHeader, PeSignature};
use crate::section::SectionHeader;

/// Align a value up to the given alignment.
#[inline]
pub fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Layout configuration for building images.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// File alignment (typically 0x200).
    pub file_alignment: u32,
    /// Section alignment (typically 0x1000).
    pub section_alignment: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            file_alignment: 0x200,
            section_alignment: 0x1000,
        }
    }
}

impl LayoutConfig {
    pub fn align_file(&self, value: u32) -> u32 {
        align_up(value, self.file_alignment)
    }

    pub fn align_section(&self, value: u32) -> u32 {
        align_up(value, self.section_alignment)
    }
}

/// End of the section table: new-header offset + signature + COFF header +
/// optional header + section headers.
pub fn headers_end(new_header_offset: u32, optional_header_size: usize, num_sections: usize) -> u32 {
    new_header_offset
        + (PeSignature::SIZE
            + CoffHeader::SIZE
            + optional_header_size
            + num_sections * SectionHeader::SIZE) as u32
}

/// Assign virtual addresses, file pointers and sizes to consecutive sections.
/// `raw_sizes[i]` is the number of bytes section `i` carries. Returns the file
/// offset just past the last section.
pub fn layout_sections(
    headers: &mut [SectionHeader],
    raw_sizes: &[usize],
    config: &LayoutConfig,
    size_of_headers: u32,
) -> u32 {
    let mut current_rva = config.align_section(size_of_headers);
    let mut current_file_offset = config.align_file(size_of_headers);

    for (header, &len) in headers.iter_mut().zip(raw_sizes) {
        let len = len as u32;
        header.virtual_address = current_rva;
        header.virtual_size = len;
        header.size_of_raw_data = config.align_file(len);
        header.pointer_to_raw_data = if len == 0 { 0 } else { current_file_offset };

        current_rva += config.align_section(len.max(1));
        current_file_offset += header.size_of_raw_data;
    }

    current_file_offset
}

/// Total virtual extent of the image, aligned to the section alignment.
pub fn size_of_image(headers: &[SectionHeader], config: &LayoutConfig, size_of_headers: u32) -> u32 {
    match headers.last() {
        Some(last) => last.virtual_address + config.align_section(last.virtual_size.max(1)),
        None => config.align_section(size_of_headers),
    }
}
