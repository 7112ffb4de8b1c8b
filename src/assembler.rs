//! Writing an [`Image`] back out.
//!
//! Headers are written in order, then the regions are replayed through the
//! same scheduler the parser used, so a parsed image comes out byte for byte.

use std::io::Write;

use log::trace;

use crate::directory::DecodeContext;
use crate::image::Image;
use crate::image_data::ImageData;
use crate::optional::OptionalHeader;
use crate::schedule::{find_next_region, Pass, RegionKind};
use crate::section::SectionTable;
use crate::writer::DataWriter;
use crate::{Error, Result};

/// Assemble into a fresh buffer.
pub fn assemble(image: &Image) -> Result<Vec<u8>> {
    let mut writer = DataWriter::new(Vec::new());
    write_image(image, &mut writer)?;
    Ok(writer.into_inner())
}

/// Assemble into any sink.
///
/// Images that stopped short of a full header set (legacy-only, or an
/// unrecognised signature) are written up to where they stop, followed by any
/// trailing data.
pub fn write_image<W: Write>(image: &Image, writer: &mut DataWriter<W>) -> Result<()> {
    image.dos_header.write_to(writer)?;
    if let Some(stub) = &image.dos_stub {
        writer.write_bytes(stub)?;
    }
    if let Some(signature) = &image.signature {
        signature.write_to(writer)?;
    }

    if let (Some(coff), Some(optional), Some(sections)) = (
        &image.coff_header,
        &image.optional_header,
        &image.section_table,
    ) {
        coff.write_to(writer)?;
        optional.write_to(writer)?;
        sections.write_headers(writer)?;
        write_regions(writer, optional, sections, &image.image_data)?;
    }

    if let Some(trailing) = &image.trailing_data {
        writer.write_bytes(trailing)?;
    }
    writer.flush()
}

fn write_regions<W: Write>(
    writer: &mut DataWriter<W>,
    optional: &OptionalHeader,
    sections: &SectionTable,
    image_data: &ImageData,
) -> Result<()> {
    while let Some(region) = find_next_region(
        optional,
        sections,
        image_data,
        writer.position(),
        Pass::Assemble,
    ) {
        trace!(
            "{:?} at {:#x}, {:#x} bytes",
            region.kind,
            region.offset,
            region.len
        );

        match region.kind {
            RegionKind::Section(index) => {
                let section = sections
                    .section(index)
                    .ok_or(Error::MissingSectionData(index))?;
                if section.data.len() as u64 != region.len {
                    return Err(Error::SectionSizeMismatch {
                        index,
                        declared: region.len as u32,
                        actual: section.data.len(),
                    });
                }
                write_gap(writer, region.offset, section.preamble.as_deref())?;
                writer.write_bytes(&section.data)?;
            }
            RegionKind::Directory(ty) => {
                let payload = image_data.get(ty).ok_or(Error::MissingDirectory(ty))?;
                let ctx = DecodeContext {
                    base_va: optional.data_directory(ty).virtual_address,
                    is_64bit: optional.is_pe32plus(),
                };
                let bytes = payload.encode(ty, region.len as u32, ctx)?;
                write_gap(writer, region.offset, image_data.preamble(ty))?;
                writer.write_bytes(&bytes)?;
            }
            RegionKind::DebugRawData => {
                let data = image_data.debug_raw_data().ok_or(Error::MissingDebugData)?;
                write_gap(writer, region.offset, image_data.debug_raw_data_preamble())?;
                writer.write_bytes(data)?;
            }
        }
    }
    Ok(())
}

/// Fill up to `offset` with the captured gap bytes, or zeros without them.
fn write_gap<W: Write>(
    writer: &mut DataWriter<W>,
    offset: u64,
    preamble: Option<&[u8]>,
) -> Result<()> {
    let gap = offset - writer.position();
    match preamble {
        Some(bytes) if bytes.len() as u64 != gap => Err(Error::PreambleMismatch {
            offset,
            expected: gap,
            actual: bytes.len(),
        }),
        Some(bytes) => writer.write_bytes(bytes),
        None => writer.write_zeros(gap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coff::PeSignature;
    use crate::dos::DosHeader;

    #[test]
    fn test_write_gap() {
        let mut writer = DataWriter::new(Vec::new());
        writer.write_u8(1).unwrap();
        write_gap(&mut writer, 4, None).unwrap();
        write_gap(&mut writer, 6, Some(&[9, 9])).unwrap();
        assert_eq!(writer.into_inner(), vec![1, 0, 0, 0, 9, 9]);

        let mut writer = DataWriter::new(Vec::new());
        assert!(matches!(
            write_gap(&mut writer, 4, Some(&[1])),
            Err(Error::PreambleMismatch {
                expected: 4,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_partial_image() {
        let image = Image {
            dos_header: DosHeader {
                e_lfanew: 0x40,
                ..DosHeader::default()
            },
            dos_stub: Some(Vec::new()),
            signature: Some(PeSignature(*b"XX\0\0")),
            trailing_data: Some(vec![0xAA]),
            ..Image::default()
        };
        let bytes = assemble(&image).unwrap();
        assert_eq!(bytes.len(), 64 + 4 + 1);
        assert_eq!(&bytes[64..68], b"XX\0\0");
        assert_eq!(bytes[68], 0xAA);
    }
}
