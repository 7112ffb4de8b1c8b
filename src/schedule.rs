//! Ordering of the file regions that follow the headers.
//!
//! After the section table, an image is a sequence of regions (section raw
//! data, directories stored outside any section, the debug raw-data block)
//! separated by gaps. The parser and the assembler both walk that sequence by
//! repeatedly asking for the region with the lowest file offset at or after
//! the current position, so a parsed image is written back in the same order.

use crate::data_dir::{DataDirectory, DirectoryType};
use crate::image_data::ImageData;
use crate::optional::OptionalHeader;
use crate::section::SectionTable;

/// Which walk is asking. The debug raw-data block is only known to the parser
/// once the debug directory has been decoded, so its candidacy differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Parse,
    Assemble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Raw data of the section at this header index.
    Section(usize),
    /// A directory stored as its own file region.
    Directory(DirectoryType),
    /// The block the debug directory points at.
    DebugRawData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    /// File offset of the first byte.
    pub offset: u64,
    pub len: u64,
}

/// Whether the directory lies entirely within one section's virtual range.
pub fn is_inside_section(dir: &DataDirectory, sections: &SectionTable) -> bool {
    sections.headers().iter().any(|h| {
        dir.virtual_address >= h.virtual_address
            && dir.virtual_address < h.virtual_end()
            && dir.end() <= h.virtual_end()
    })
}

/// File offset at which a directory is stored as its own region, if it is.
///
/// The certificate table's address is already a file offset. Directories
/// inside a section are located through the address translator. Directories
/// that fit in the header area, where addresses and offsets coincide, use
/// their address directly. Anything else is not a file region.
pub fn directory_file_offset(
    ty: DirectoryType,
    dir: &DataDirectory,
    optional: &OptionalHeader,
    sections: &SectionTable,
) -> Option<u64> {
    if dir.is_empty() {
        return None;
    }
    if ty == DirectoryType::Certificate {
        return Some(u64::from(dir.virtual_address));
    }
    if is_inside_section(dir, sections) {
        return sections
            .rva_converter()
            .to_file_offset(dir.virtual_address)
            .ok()
            .map(u64::from);
    }
    if dir.end() <= optional.size_of_headers() {
        return Some(u64::from(dir.virtual_address));
    }
    None
}

fn debug_raw_data_location(image_data: &ImageData, pass: Pass) -> Option<(u64, u32)> {
    let captured = image_data.debug_raw_data().is_some();
    let wanted = match pass {
        Pass::Parse => !captured,
        Pass::Assemble => captured,
    };
    if !wanted {
        return None;
    }
    image_data.debug()?.raw_data_location()
}

/// The region with the lowest file offset at or after `position`.
///
/// Candidates are considered sections first, then directories in table
/// order, then the debug raw data; on equal offsets the first one wins.
/// Zero-length regions are never returned.
pub fn find_next_region(
    optional: &OptionalHeader,
    sections: &SectionTable,
    image_data: &ImageData,
    position: u64,
    pass: Pass,
) -> Option<Region> {
    let section_regions = sections
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| h.has_raw_data())
        .map(|(i, h)| Region {
            kind: RegionKind::Section(i),
            offset: u64::from(h.pointer_to_raw_data),
            len: u64::from(h.size_of_raw_data),
        });

    let directory_regions = optional.data_directories().iter().filter_map(|(ty, dir)| {
        directory_file_offset(ty, dir, optional, sections).map(|offset| Region {
            kind: RegionKind::Directory(ty),
            offset,
            len: u64::from(dir.size),
        })
    });

    let debug_region = debug_raw_data_location(image_data, pass).map(|(offset, len)| Region {
        kind: RegionKind::DebugRawData,
        offset,
        len: u64::from(len),
    });

    let mut best: Option<Region> = None;
    for region in section_regions.chain(directory_regions).chain(debug_region) {
        if region.offset < position {
            continue;
        }
        if best.map_or(true, |b| region.offset < b.offset) {
            best = Some(region);
        }
    }
    best
}
