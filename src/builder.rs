//! Builder for creating new images from scratch.
//!
//! # Example
//!
//! ```
//! use peimage::{ImageBuilder, MachineType, Subsystem};
//! use peimage::section::characteristics;
//!
//! let code = vec![0xCC; 0x100]; // INT3 instructions
//! let data = vec![0u8; 0x50];
//!
//! let image = ImageBuilder::new()
//!     .machine(MachineType::Amd64)
//!     .subsystem(Subsystem::WindowsCui)
//!     .entry_point(0x1000)
//!     .add_section(".text", code, characteristics::CODE | characteristics::EXECUTE | characteristics::READ)
//!     .add_section(".data", data, characteristics::INITIALIZED_DATA | characteristics::READ | characteristics::WRITE)
//!     .build()
//!     .unwrap();
//! assert_eq!(image.section_table.as_ref().unwrap().len(), 2);
//! ```

use crate::coff::{CoffHeader, MachineType, PeSignature};
use crate::data_dir::{DataDirectories, DataDirectory, DirectoryType};
use crate::directory::{DecodeContext, DirectoryPayload};
use crate::dos::{DosHeader, DOS_SIGNATURE};
use crate::image::Image;
use crate::image_data::ImageData;
use crate::layout::{align_up, headers_end, layout_sections, size_of_image, LayoutConfig};
use crate::optional::{
    OptionalHeader, OptionalHeader32, OptionalHeader64, Subsystem, PE32PLUS_MAGIC, PE32_MAGIC,
};
use crate::section::{characteristics, SectionData, SectionHeader, SectionTable};
use crate::Result;

/// Offset of the new header in built images.
const NEW_HEADER_OFFSET: u32 = 0x80;
/// Alignment of directories placed in the header area.
const HEADER_DIRECTORY_ALIGNMENT: u32 = 4;
/// Alignment of the certificate table after the last section.
const CERTIFICATE_ALIGNMENT: u32 = 8;

#[derive(Debug, Clone)]
struct PendingSection {
    name: String,
    data: Vec<u8>,
    characteristics: u32,
    /// Directory encoded at the start of the section.
    directory: Option<(DirectoryType, DirectoryPayload)>,
}

/// Builder for images with a conventional layout: headers, any header-area
/// directories, sections in the order added, the certificate table, then
/// trailing data.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    machine: MachineType,
    subsystem: Subsystem,
    is_64bit: bool,
    image_base: u64,
    entry_point: u32,
    time_date_stamp: u32,
    layout: LayoutConfig,
    dll_characteristics: u16,
    is_dll: bool,
    sections: Vec<PendingSection>,
    header_directories: Vec<(DirectoryType, DirectoryPayload)>,
    certificate_table: Option<Vec<u8>>,
    trailing_data: Option<Vec<u8>>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    /// Create a new builder with default settings (64-bit console application).
    pub fn new() -> Self {
        Self {
            machine: MachineType::Amd64,
            subsystem: Subsystem::WindowsCui,
            is_64bit: true,
            image_base: 0x0000_0001_4000_0000,
            entry_point: 0,
            time_date_stamp: 0,
            layout: LayoutConfig::default(),
            dll_characteristics: 0x8160, // DYNAMIC_BASE | NX_COMPAT | TERMINAL_SERVER_AWARE | HIGH_ENTROPY_VA
            is_dll: false,
            sections: Vec::new(),
            header_directories: Vec::new(),
            certificate_table: None,
            trailing_data: None,
        }
    }

    /// Set the target machine type. Also picks PE32 or PE32+ to match.
    pub fn machine(mut self, machine: MachineType) -> Self {
        self.machine = machine;
        self.is_64bit = matches!(
            machine,
            MachineType::Amd64 | MachineType::Arm64 | MachineType::Ia64
        );
        if !self.is_64bit {
            self.image_base = 0x0040_0000;
        }
        self
    }

    pub fn subsystem(mut self, subsystem: Subsystem) -> Self {
        self.subsystem = subsystem;
        self
    }

    /// Force PE32+ (`true`) or PE32 (`false`).
    pub fn is_64bit(mut self, is_64bit: bool) -> Self {
        self.is_64bit = is_64bit;
        self
    }

    pub fn image_base(mut self, base: u64) -> Self {
        self.image_base = base;
        self
    }

    /// Set the entry point RVA.
    pub fn entry_point(mut self, rva: u32) -> Self {
        self.entry_point = rva;
        self
    }

    pub fn time_date_stamp(mut self, stamp: u32) -> Self {
        self.time_date_stamp = stamp;
        self
    }

    pub fn layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn file_alignment(mut self, alignment: u32) -> Self {
        self.layout.file_alignment = alignment;
        self
    }

    pub fn section_alignment(mut self, alignment: u32) -> Self {
        self.layout.section_alignment = alignment;
        self
    }

    pub fn dll_characteristics(mut self, flags: u16) -> Self {
        self.dll_characteristics = flags;
        self
    }

    /// Mark this as a DLL instead of an executable.
    pub fn is_dll(mut self, is_dll: bool) -> Self {
        self.is_dll = is_dll;
        self
    }

    /// Add a section with the given name, data, and characteristics.
    pub fn add_section(mut self, name: &str, data: Vec<u8>, characteristics: u32) -> Self {
        self.sections.push(PendingSection {
            name: name.to_string(),
            data,
            characteristics,
            directory: None,
        });
        self
    }

    /// Add a section whose contents are the encoding of a directory, and point
    /// the directory entry at it. Resource trees are encoded against the
    /// section's final address.
    pub fn add_directory_section(
        mut self,
        name: &str,
        ty: DirectoryType,
        payload: DirectoryPayload,
        characteristics: u32,
    ) -> Self {
        self.sections.push(PendingSection {
            name: name.to_string(),
            data: Vec::new(),
            characteristics,
            directory: Some((ty, payload)),
        });
        self
    }

    /// Place a directory in the header area after the section table, where
    /// its address is also its file offset. Bound imports usually live here.
    pub fn header_directory(mut self, ty: DirectoryType, payload: DirectoryPayload) -> Self {
        self.header_directories.push((ty, payload));
        self
    }

    /// Append a certificate table after the last section.
    pub fn certificate_table(mut self, bytes: Vec<u8>) -> Self {
        self.certificate_table = Some(bytes);
        self
    }

    pub fn trailing_data(mut self, bytes: Vec<u8>) -> Self {
        self.trailing_data = Some(bytes);
        self
    }

    /// Virtual address the next added section will receive.
    pub fn next_section_rva(&self) -> Result<u32> {
        let size_of_headers = self
            .layout
            .align_file(self.header_area_end(self.sections.len() + 1)?.1);
        let mut rva = self.layout.align_section(size_of_headers);
        for section in &self.sections {
            let len = self.section_len(section)?;
            rva += self.layout.align_section(len.max(1));
        }
        Ok(rva)
    }

    fn optional_header_size(&self) -> usize {
        if self.is_64bit {
            OptionalHeader64::SIZE
        } else {
            OptionalHeader32::SIZE
        }
    }

    fn context(&self, base_va: u32) -> DecodeContext {
        DecodeContext {
            base_va,
            is_64bit: self.is_64bit,
        }
    }

    /// Encoded header directories at their offsets, and the end of the area.
    fn header_area_end(&self, num_sections: usize) -> Result<(Vec<(u32, Vec<u8>)>, u32)> {
        let mut offset = headers_end(NEW_HEADER_OFFSET, self.optional_header_size(), num_sections);
        let mut placed = Vec::with_capacity(self.header_directories.len());
        for (_, payload) in &self.header_directories {
            offset = align_up(offset, HEADER_DIRECTORY_ALIGNMENT);
            let bytes = payload.to_bytes(self.context(offset))?;
            let len = bytes.len() as u32;
            placed.push((offset, bytes));
            offset += len;
        }
        Ok((placed, offset))
    }

    fn section_len(&self, section: &PendingSection) -> Result<u32> {
        Ok(match &section.directory {
            Some((_, payload)) => payload.to_bytes(self.context(0))?.len() as u32,
            None => section.data.len() as u32,
        })
    }

    /// Lay out and assemble the model. The result assembles to a well-formed
    /// file that parses back to an equal image.
    pub fn build(self) -> Result<Image> {
        let mut directories = DataDirectories::default();
        let mut image_data = ImageData::new();

        let (header_blobs, header_end) = self.header_area_end(self.sections.len())?;
        let size_of_headers = self.layout.align_file(header_end);
        for ((ty, payload), (offset, bytes)) in self.header_directories.iter().zip(&header_blobs) {
            directories[*ty] = DataDirectory::new(*offset, bytes.len() as u32);
            image_data.put(*ty, payload.clone());
        }

        let raw_sizes = self
            .sections
            .iter()
            .map(|s| self.section_len(s).map(|len| len as usize))
            .collect::<Result<Vec<_>>>()?;
        let mut headers: Vec<SectionHeader> = self
            .sections
            .iter()
            .map(|s| {
                let mut header = SectionHeader::named(&s.name);
                header.characteristics = s.characteristics;
                header
            })
            .collect();
        let end_of_sections =
            layout_sections(&mut headers, &raw_sizes, &self.layout, size_of_headers);

        let mut section_blobs = Vec::with_capacity(self.sections.len());
        for (section, header) in self.sections.iter().zip(&headers) {
            let mut data = match &section.directory {
                Some((ty, payload)) => {
                    let bytes = payload.to_bytes(self.context(header.virtual_address))?;
                    directories[*ty] = DataDirectory::new(header.virtual_address, bytes.len() as u32);
                    image_data.put(*ty, payload.clone());
                    bytes
                }
                None => section.data.clone(),
            };
            data.resize(header.size_of_raw_data as usize, 0);
            section_blobs.push(data);
        }

        if let Some(certificate) = &self.certificate_table {
            let offset = align_up(end_of_sections, CERTIFICATE_ALIGNMENT);
            directories[DirectoryType::Certificate] =
                DataDirectory::new(offset, certificate.len() as u32);
            image_data.put(
                DirectoryType::Certificate,
                DirectoryPayload::Raw(certificate.clone()),
            );
        }

        let optional_header = self.create_optional_header(&headers, size_of_headers, directories);
        let coff_header = self.create_coff_header();

        let mut section_table = SectionTable::new(headers);
        for (index, data) in section_blobs.into_iter().enumerate() {
            if !data.is_empty() {
                section_table.put_section(index, SectionData::new(data));
            }
        }

        Ok(Image {
            dos_header: Self::create_dos_header(),
            dos_stub: Some(Self::default_dos_stub()),
            signature: Some(PeSignature::PE),
            coff_header: Some(coff_header),
            optional_header: Some(optional_header),
            section_table: Some(section_table),
            image_data,
            trailing_data: self.trailing_data.filter(|t| !t.is_empty()),
        })
    }

    fn create_dos_header() -> DosHeader {
        DosHeader {
            e_magic: DOS_SIGNATURE,
            e_cblp: 0x90,
            e_cp: 0x03,
            e_cparhdr: 0x04,
            e_maxalloc: 0xFFFF,
            e_sp: 0xB8,
            e_lfarlc: 0x40,
            e_lfanew: NEW_HEADER_OFFSET,
            ..DosHeader::default()
        }
    }

    fn create_coff_header(&self) -> CoffHeader {
        use crate::coff::characteristics as coff;

        let mut characteristics = coff::EXECUTABLE_IMAGE;
        if self.is_64bit {
            characteristics |= coff::LARGE_ADDRESS_AWARE;
        } else {
            characteristics |= coff::MACHINE_32BIT;
        }
        if self.is_dll {
            characteristics |= coff::DLL;
        }

        CoffHeader {
            machine: self.machine as u16,
            number_of_sections: self.sections.len() as u16,
            time_date_stamp: self.time_date_stamp,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: self.optional_header_size() as u16,
            characteristics,
        }
    }

    fn create_optional_header(
        &self,
        headers: &[SectionHeader],
        size_of_headers: u32,
        data_directories: DataDirectories,
    ) -> OptionalHeader {
        let sum_raw = |flag: u32| -> u32 {
            headers
                .iter()
                .filter(|h| h.characteristics & flag != 0)
                .map(|h| h.size_of_raw_data)
                .sum()
        };
        let size_of_code = sum_raw(characteristics::CODE);
        let size_of_initialized_data = sum_raw(characteristics::INITIALIZED_DATA);
        let size_of_uninitialized_data = sum_raw(characteristics::UNINITIALIZED_DATA);
        let base_of_code = headers
            .iter()
            .find(|h| h.characteristics & characteristics::CODE != 0)
            .map_or(0, |h| h.virtual_address);
        let base_of_data = headers
            .iter()
            .find(|h| h.characteristics & characteristics::CODE == 0)
            .map_or(0, |h| h.virtual_address);
        let size_of_image = size_of_image(headers, &self.layout, size_of_headers);

        if self.is_64bit {
            OptionalHeader::Pe32Plus(OptionalHeader64 {
                magic: PE32PLUS_MAGIC,
                major_linker_version: 14,
                minor_linker_version: 0,
                size_of_code,
                size_of_initialized_data,
                size_of_uninitialized_data,
                address_of_entry_point: self.entry_point,
                base_of_code,
                image_base: self.image_base,
                section_alignment: self.layout.section_alignment,
                file_alignment: self.layout.file_alignment,
                major_operating_system_version: 6,
                minor_operating_system_version: 0,
                major_image_version: 0,
                minor_image_version: 0,
                major_subsystem_version: 6,
                minor_subsystem_version: 0,
                win32_version_value: 0,
                size_of_image,
                size_of_headers,
                check_sum: 0,
                subsystem: self.subsystem as u16,
                dll_characteristics: self.dll_characteristics,
                size_of_stack_reserve: 0x100000,
                size_of_stack_commit: 0x1000,
                size_of_heap_reserve: 0x100000,
                size_of_heap_commit: 0x1000,
                loader_flags: 0,
                number_of_rva_and_sizes: 16,
                data_directories,
            })
        } else {
            OptionalHeader::Pe32(OptionalHeader32 {
                magic: PE32_MAGIC,
                major_linker_version: 14,
                minor_linker_version: 0,
                size_of_code,
                size_of_initialized_data,
                size_of_uninitialized_data,
                address_of_entry_point: self.entry_point,
                base_of_code,
                base_of_data,
                image_base: self.image_base as u32,
                section_alignment: self.layout.section_alignment,
                file_alignment: self.layout.file_alignment,
                major_operating_system_version: 6,
                minor_operating_system_version: 0,
                major_image_version: 0,
                minor_image_version: 0,
                major_subsystem_version: 6,
                minor_subsystem_version: 0,
                win32_version_value: 0,
                size_of_image,
                size_of_headers,
                check_sum: 0,
                subsystem: self.subsystem as u16,
                dll_characteristics: self.dll_characteristics,
                size_of_stack_reserve: 0x100000,
                size_of_stack_commit: 0x1000,
                size_of_heap_reserve: 0x100000,
                size_of_heap_commit: 0x1000,
                loader_flags: 0,
                number_of_rva_and_sizes: 16,
                data_directories,
            })
        }
    }

    fn default_dos_stub() -> Vec<u8> {
        // "This program cannot be run in DOS mode.", padded up to the new header
        let mut stub = vec![0u8; NEW_HEADER_OFFSET as usize - DosHeader::SIZE];
        let msg = b"\x0e\x1f\xba\x0e\x00\xb4\x09\xcd\x21\xb8\x01\x4c\xcd\x21This program cannot be run in DOS mode.\r\r\n$";
        let copy_len = msg.len().min(stub.len());
        stub[..copy_len].copy_from_slice(&msg[..copy_len]);
        stub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound_import::{BoundImport, BoundImportTable};

    #[test]
    fn test_builder_creates_valid_image() {
        let image = ImageBuilder::new()
            .machine(MachineType::Amd64)
            .subsystem(Subsystem::WindowsCui)
            .entry_point(0x1000)
            .add_section(
                ".text",
                vec![0xCC; 0x100],
                characteristics::CODE | characteristics::EXECUTE | characteristics::READ,
            )
            .build()
            .unwrap();

        assert!(image.is_64bit());
        let table = image.section_table.as_ref().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.headers()[0].name(), ".text");
        let optional = image.optional_header.as_ref().unwrap();
        assert_eq!(optional.size_of_headers(), 0x200);
        assert_eq!(optional.size_of_image(), 0x2000);
        assert_eq!(table.section(0).unwrap().data.len(), 0x200);
    }

    #[test]
    fn test_builder_32bit() {
        let image = ImageBuilder::new()
            .machine(MachineType::I386)
            .add_section(
                ".text",
                vec![0x90; 0x10],
                characteristics::CODE | characteristics::EXECUTE,
            )
            .build()
            .unwrap();

        assert!(!image.is_64bit());
        assert_eq!(image.coff_header.unwrap().machine, MachineType::I386 as u16);
        assert_eq!(image.optional_header.unwrap().image_base(), 0x400000);
    }

    #[test]
    fn test_header_directory_placement() {
        let mut bound = BoundImportTable {
            imports: vec![BoundImport::new(7, "KERNEL32.dll")],
        };
        bound.assign_name_offsets();
        let image = ImageBuilder::new()
            .header_directory(DirectoryType::BoundImport, DirectoryPayload::BoundImport(bound))
            .add_section(".text", vec![0xC3], characteristics::CODE)
            .build()
            .unwrap();

        let optional = image.optional_header.as_ref().unwrap();
        let dir = optional.data_directory(DirectoryType::BoundImport);
        // 0x80 + 4 + 20 + 240 + 40
        assert_eq!(dir.virtual_address, 0x1B0);
        assert_eq!(dir.size, 16 + 13);
        assert!(dir.end() <= optional.size_of_headers());
    }

    #[test]
    fn test_next_section_rva() {
        let builder = ImageBuilder::new().add_section(".text", vec![0; 0x1800], characteristics::CODE);
        assert_eq!(builder.next_section_rva().unwrap(), 0x3000);
    }

    #[test]
    fn test_certificate_after_sections() {
        let image = ImageBuilder::new()
            .add_section(".text", vec![0xC3], characteristics::CODE)
            .certificate_table(vec![0xAB; 0x20])
            .build()
            .unwrap();
        let optional = image.optional_header.as_ref().unwrap();
        let dir = optional.data_directory(DirectoryType::Certificate);
        assert_eq!(dir.virtual_address, 0x400);
        assert_eq!(dir.size, 0x20);
    }
}
