//! The image model: everything read from a file, in a form that writes back.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::assembler;
use crate::coff::{CoffHeader, MachineType, PeSignature};
use crate::data_dir::DirectoryType;
use crate::dos::DosHeader;
use crate::image_data::ImageData;
use crate::optional::OptionalHeader;
use crate::parser::{self, ParseOptions};
use crate::section::SectionTable;
use crate::writer::DataWriter;
use crate::Result;

/// A parsed (or built) executable image.
///
/// Fields after the legacy header are optional: a plain DOS executable stops
/// after the header, and a file with an unknown signature stops after the
/// signature. Assembling writes whatever is present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    pub dos_header: DosHeader,
    /// Bytes between the legacy header and the new header.
    pub dos_stub: Option<Vec<u8>>,
    pub signature: Option<PeSignature>,
    pub coff_header: Option<CoffHeader>,
    pub optional_header: Option<OptionalHeader>,
    pub section_table: Option<SectionTable>,
    pub image_data: ImageData,
    /// Bytes after the last region, such as an appended overlay.
    pub trailing_data: Option<Vec<u8>>,
}

impl Image {
    /// Parse with default options.
    pub fn parse(data: &[u8]) -> Result<Self> {
        parser::parse(data)
    }

    pub fn parse_with(data: &[u8], options: &ParseOptions) -> Result<Self> {
        parser::parse_with(data, options)
    }

    /// Load an image from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        parser::parse_file(path, &ParseOptions::default())
    }

    /// Assemble into a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        assembler::assemble(self)
    }

    pub fn write_to<W: Write>(&self, sink: W) -> Result<()> {
        let mut writer = DataWriter::new(sink);
        assembler::write_image(self, &mut writer)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }

    /// Whether the image got past the signature into the PE headers.
    pub fn is_pe(&self) -> bool {
        self.optional_header.is_some()
    }

    pub fn is_64bit(&self) -> bool {
        self.optional_header
            .as_ref()
            .is_some_and(OptionalHeader::is_pe32plus)
    }

    pub fn is_dll(&self) -> bool {
        self.coff_header.is_some_and(|c| c.is_dll())
    }

    /// Translate a virtual address to a file offset through the section table.
    pub fn rva_to_offset(&self, rva: u32) -> Option<u32> {
        self.section_table
            .as_ref()?
            .rva_converter()
            .to_file_offset(rva)
            .ok()
    }

    pub fn summary(&self) -> ImageSummary {
        let sections: Vec<SectionSummary> = self
            .section_table
            .as_ref()
            .map(|t| {
                t.headers()
                    .iter()
                    .map(|h| SectionSummary {
                        name: h.name(),
                        virtual_address: h.virtual_address,
                        virtual_size: h.virtual_size,
                        pointer_to_raw_data: h.pointer_to_raw_data,
                        size_of_raw_data: h.size_of_raw_data,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let directories: Vec<DirectoryType> = self
            .optional_header
            .as_ref()
            .map(|o| o.data_directories().present().map(|(ty, _)| ty).collect())
            .unwrap_or_default();

        ImageSummary {
            is_pe: self.is_pe(),
            is_64bit: self.is_64bit(),
            machine: self.coff_header.and_then(|c| c.machine_type()),
            entry_point: self
                .optional_header
                .as_ref()
                .map(OptionalHeader::address_of_entry_point),
            image_base: self.optional_header.as_ref().map(OptionalHeader::image_base),
            sections,
            directories,
            trailing_len: self.trailing_data.as_ref().map_or(0, Vec::len),
        }
    }
}

/// Read-only overview of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub is_pe: bool,
    pub is_64bit: bool,
    pub machine: Option<MachineType>,
    pub entry_point: Option<u32>,
    pub image_base: Option<u64>,
    pub sections: Vec<SectionSummary>,
    /// Directories with a non-zero size, in table order.
    pub directories: Vec<DirectoryType>,
    pub trailing_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub pointer_to_raw_data: u32,
    pub size_of_raw_data: u32,
}

impl fmt::Display for ImageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_pe {
            return writeln!(f, "legacy executable");
        }
        let format = if self.is_64bit { "PE32+" } else { "PE32" };
        match self.machine {
            Some(machine) => writeln!(f, "{format} image, machine {machine:?}")?,
            None => writeln!(f, "{format} image, unknown machine")?,
        }
        if let (Some(entry), Some(base)) = (self.entry_point, self.image_base) {
            writeln!(f, "entry point {entry:#x}, image base {base:#x}")?;
        }
        for s in &self.sections {
            writeln!(
                f,
                "  {:<8} va {:#010x} vsize {:#x} raw {:#x}+{:#x}",
                s.name, s.virtual_address, s.virtual_size, s.pointer_to_raw_data, s.size_of_raw_data
            )?;
        }
        if !self.directories.is_empty() {
            let names: Vec<String> = self.directories.iter().map(ToString::to_string).collect();
            writeln!(f, "directories: {}", names.join(", "))?;
        }
        if self.trailing_len > 0 {
            writeln!(f, "{} bytes of trailing data", self.trailing_len)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_legacy() {
        let image = Image::default();
        assert!(!image.is_pe());
        assert!(!image.is_64bit());
        assert!(!image.is_dll());
        assert_eq!(image.rva_to_offset(0x1000), None);
        let summary = image.summary();
        assert!(summary.sections.is_empty());
        assert_eq!(summary.to_string(), "legacy executable\n");
    }

    #[test]
    fn test_legacy_bytes() {
        let image = Image::default();
        assert_eq!(image.to_bytes().unwrap(), vec![0u8; DosHeader::SIZE]);
    }
}
