//! Reading an image from bytes or a stream.
//!
//! The headers are read in order. Everything after the section table is read
//! region by region as chosen by [`find_next_region`], and whatever follows
//! the last region is kept as trailing data.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, trace, warn};

use crate::coff::{CoffHeader, PeSignature};
use crate::data_dir::DirectoryType;
use crate::directory::{DecodeContext, DirectoryPayload};
use crate::dos::{DosHeader, MAX_NEW_HEADER_OFFSET};
use crate::image::Image;
use crate::image_data::ImageData;
use crate::optional::OptionalHeader;
use crate::reader::{DataReader, SliceReader, StreamReader};
use crate::schedule::{find_next_region, Pass, RegionKind};
use crate::section::{SectionData, SectionTable};
use crate::Result;

/// Knobs for [`parse_with`] and friends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// New-header offsets above this value mark a plain DOS executable.
    pub max_new_header_offset: u32,
    /// Decode structured directories. When off, every directory is kept as
    /// raw bytes; the image still assembles to the same bytes.
    pub decode_directories: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_new_header_offset: MAX_NEW_HEADER_OFFSET,
            decode_directories: true,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_new_header_offset(mut self, offset: u32) -> Self {
        self.max_new_header_offset = offset;
        self
    }

    pub fn decode_directories(mut self, decode: bool) -> Self {
        self.decode_directories = decode;
        self
    }
}

/// Parse an image held in memory with default options.
pub fn parse(data: &[u8]) -> Result<Image> {
    parse_with(data, &ParseOptions::default())
}

pub fn parse_with(data: &[u8], options: &ParseOptions) -> Result<Image> {
    let mut reader = SliceReader::new(data);
    read_image(&mut reader, options)
}

/// Parse from any byte stream. The stream is consumed strictly forward.
pub fn parse_reader<R: Read>(source: R, options: &ParseOptions) -> Result<Image> {
    let mut reader = StreamReader::new(source);
    read_image(&mut reader, options)
}

pub fn parse_file<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<Image> {
    let file = File::open(path)?;
    parse_reader(BufReader::new(file), options)
}

/// Read a complete image from a cursor positioned at the legacy header.
pub fn read_image<R: DataReader>(reader: &mut R, options: &ParseOptions) -> Result<Image> {
    let mut image = Image {
        dos_header: DosHeader::read_from(reader)?,
        ..Image::default()
    };

    if image.dos_header.is_legacy_only(options.max_new_header_offset) {
        debug!(
            "new-header offset {:#x} is not followed; legacy executable",
            image.dos_header.e_lfanew
        );
        return Ok(image);
    }

    image.dos_stub = Some(reader.read_bytes(image.dos_header.stub_len())?);

    let signature = PeSignature::read_from(reader)?;
    image.signature = Some(signature);
    if !signature.is_valid() {
        debug!("unrecognised signature {:02x?}; stopping after it", signature.0);
        return Ok(image);
    }

    let coff_header = CoffHeader::read_from(reader)?;
    let optional_header = OptionalHeader::read_from(reader)?;
    let mut section_table =
        SectionTable::read_headers(reader, usize::from(coff_header.number_of_sections))?;
    let mut image_data = ImageData::new();

    read_regions(
        reader,
        &optional_header,
        &mut section_table,
        &mut image_data,
        options,
    )?;

    let trailing = reader.read_remaining()?;
    if !trailing.is_empty() {
        trace!("{} bytes of trailing data", trailing.len());
        image.trailing_data = Some(trailing);
    }

    image.coff_header = Some(coff_header);
    image.optional_header = Some(optional_header);
    image.section_table = Some(section_table);
    image.image_data = image_data;
    Ok(image)
}

fn read_regions<R: DataReader>(
    reader: &mut R,
    optional: &OptionalHeader,
    sections: &mut SectionTable,
    image_data: &mut ImageData,
    options: &ParseOptions,
) -> Result<()> {
    while let Some(region) =
        find_next_region(optional, sections, image_data, reader.position(), Pass::Parse)
    {
        trace!(
            "{:?} at {:#x}, {:#x} bytes",
            region.kind,
            region.offset,
            region.len
        );
        let preamble = read_preamble(reader, region.offset)?;

        match region.kind {
            RegionKind::Section(index) => {
                let data = reader.read_bytes(region.len as usize)?;
                if options.decode_directories {
                    decode_in_section(optional, sections, index, &data, image_data);
                }
                sections.put_section(index, SectionData { data, preamble });
            }
            RegionKind::Directory(ty) => {
                let bytes = reader.read_bytes(region.len as usize)?;
                let payload = if options.decode_directories {
                    decode_region(ty, bytes, directory_context(optional, ty))?
                } else {
                    DirectoryPayload::Raw(bytes)
                };
                image_data.put(ty, payload);
                if let Some(preamble) = preamble {
                    image_data.set_preamble(ty, preamble);
                }
            }
            RegionKind::DebugRawData => {
                image_data.set_debug_raw_data(reader.read_bytes(region.len as usize)?);
                if let Some(preamble) = preamble {
                    image_data.set_debug_raw_data_preamble(preamble);
                }
            }
        }
    }
    Ok(())
}

/// Read the gap up to `offset`. Gaps of zeros are not worth keeping.
fn read_preamble<R: DataReader>(reader: &mut R, offset: u64) -> Result<Option<Vec<u8>>> {
    let gap = offset - reader.position();
    if gap == 0 {
        return Ok(None);
    }
    let bytes = reader.read_bytes(gap as usize)?;
    Ok(bytes.iter().any(|&b| b != 0).then_some(bytes))
}

fn directory_context(optional: &OptionalHeader, ty: DirectoryType) -> DecodeContext {
    DecodeContext {
        base_va: optional.data_directory(ty).virtual_address,
        is_64bit: optional.is_pe32plus(),
    }
}

/// Decode the directories whose address falls inside a section just read.
fn decode_in_section(
    optional: &OptionalHeader,
    sections: &SectionTable,
    index: usize,
    data: &[u8],
    image_data: &mut ImageData,
) {
    let Some(header) = sections.header(index) else {
        return;
    };
    for (ty, dir) in optional.data_directories().present() {
        if ty == DirectoryType::Certificate || !header.contains_rva(dir.virtual_address) {
            continue;
        }
        let start = (dir.virtual_address - header.virtual_address) as usize;
        if start >= data.len() {
            continue;
        }
        let end = start.saturating_add(dir.size as usize).min(data.len());
        let payload = match DirectoryPayload::decode_lenient(
            ty,
            &data[start..end],
            directory_context(optional, ty),
        ) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{ty} directory in section {index} not decoded: {e}");
                continue;
            }
        };
        debug!("{ty} directory decoded from section {}", header.name());
        image_data.put(ty, payload);
    }
}

/// Decode a directory read as its own region. The structured form is kept
/// only when it encodes back to the very same bytes.
fn decode_region(ty: DirectoryType, bytes: Vec<u8>, ctx: DecodeContext) -> Result<DirectoryPayload> {
    if !ty.is_structured() {
        return Ok(DirectoryPayload::Raw(bytes));
    }
    let payload = DirectoryPayload::decode_lenient(ty, &bytes, ctx)?;
    if !payload.is_decoded() {
        return Ok(payload);
    }
    match payload.encode(ty, bytes.len() as u32, ctx) {
        Ok(encoded) if encoded == bytes => Ok(payload),
        Ok(_) => {
            warn!("{ty} directory does not re-encode identically; kept as raw bytes");
            Ok(DirectoryPayload::Raw(bytes))
        }
        Err(e) => {
            warn!("{ty} directory kept as raw bytes: {e}");
            Ok(DirectoryPayload::Raw(bytes))
        }
    }
}
