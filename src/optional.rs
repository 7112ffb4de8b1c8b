//! Optional header, PE32 and PE32+ layouts.

use std::io::Write;

use log::warn;

use crate::data_dir::{DataDirectories, DataDirectory, DirectoryType};
use crate::reader::DataReader;
use crate::writer::DataWriter;
use crate::Result;

/// PE32 magic number.
pub const PE32_MAGIC: u16 = 0x10B;
/// PE32+ (64-bit) magic number.
pub const PE32PLUS_MAGIC: u16 = 0x20B;

/// Windows subsystem values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Subsystem {
    Unknown = 0,
    Native = 1,
    WindowsGui = 2,
    WindowsCui = 3,
    EfiApplication = 10,
}

impl Subsystem {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Native),
            2 => Some(Self::WindowsGui),
            3 => Some(Self::WindowsCui),
            10 => Some(Self::EfiApplication),
            _ => None,
        }
    }
}

/// DLL characteristics flags.
pub mod dll_characteristics {
    pub const HIGH_ENTROPY_VA: u16 = 0x0020;
    pub const DYNAMIC_BASE: u16 = 0x0040;
    pub const NX_COMPAT: u16 = 0x0100;
    pub const NO_SEH: u16 = 0x0400;
    pub const TERMINAL_SERVER_AWARE: u16 = 0x8000;
}

/// PE32 Optional Header (32-bit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    /// Declared directory count. Sixteen entries are read regardless.
    pub number_of_rva_and_sizes: u32,
    pub data_directories: DataDirectories,
}

/// PE32+ Optional Header (64-bit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: DataDirectories,
}

/// Combined optional header enum for PE32 and PE32+.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalHeader {
    Pe32(OptionalHeader32),
    Pe32Plus(OptionalHeader64),
}

impl OptionalHeader32 {
    /// Size including the sixteen directory entries.
    pub const SIZE: usize = 96 + DataDirectories::SIZE;

    fn read_body<R: DataReader>(magic: u16, reader: &mut R) -> Result<Self> {
        Ok(Self {
            magic,
            major_linker_version: reader.read_u8()?,
            minor_linker_version: reader.read_u8()?,
            size_of_code: reader.read_u32()?,
            size_of_initialized_data: reader.read_u32()?,
            size_of_uninitialized_data: reader.read_u32()?,
            address_of_entry_point: reader.read_u32()?,
            base_of_code: reader.read_u32()?,
            base_of_data: reader.read_u32()?,
            image_base: reader.read_u32()?,
            section_alignment: reader.read_u32()?,
            file_alignment: reader.read_u32()?,
            major_operating_system_version: reader.read_u16()?,
            minor_operating_system_version: reader.read_u16()?,
            major_image_version: reader.read_u16()?,
            minor_image_version: reader.read_u16()?,
            major_subsystem_version: reader.read_u16()?,
            minor_subsystem_version: reader.read_u16()?,
            win32_version_value: reader.read_u32()?,
            size_of_image: reader.read_u32()?,
            size_of_headers: reader.read_u32()?,
            check_sum: reader.read_u32()?,
            subsystem: reader.read_u16()?,
            dll_characteristics: reader.read_u16()?,
            size_of_stack_reserve: reader.read_u32()?,
            size_of_stack_commit: reader.read_u32()?,
            size_of_heap_reserve: reader.read_u32()?,
            size_of_heap_commit: reader.read_u32()?,
            loader_flags: reader.read_u32()?,
            number_of_rva_and_sizes: reader.read_u32()?,
            data_directories: DataDirectories::read_from(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u16(self.magic)?;
        writer.write_u8(self.major_linker_version)?;
        writer.write_u8(self.minor_linker_version)?;
        writer.write_u32(self.size_of_code)?;
        writer.write_u32(self.size_of_initialized_data)?;
        writer.write_u32(self.size_of_uninitialized_data)?;
        writer.write_u32(self.address_of_entry_point)?;
        writer.write_u32(self.base_of_code)?;
        writer.write_u32(self.base_of_data)?;
        writer.write_u32(self.image_base)?;
        writer.write_u32(self.section_alignment)?;
        writer.write_u32(self.file_alignment)?;
        writer.write_u16(self.major_operating_system_version)?;
        writer.write_u16(self.minor_operating_system_version)?;
        writer.write_u16(self.major_image_version)?;
        writer.write_u16(self.minor_image_version)?;
        writer.write_u16(self.major_subsystem_version)?;
        writer.write_u16(self.minor_subsystem_version)?;
        writer.write_u32(self.win32_version_value)?;
        writer.write_u32(self.size_of_image)?;
        writer.write_u32(self.size_of_headers)?;
        writer.write_u32(self.check_sum)?;
        writer.write_u16(self.subsystem)?;
        writer.write_u16(self.dll_characteristics)?;
        writer.write_u32(self.size_of_stack_reserve)?;
        writer.write_u32(self.size_of_stack_commit)?;
        writer.write_u32(self.size_of_heap_reserve)?;
        writer.write_u32(self.size_of_heap_commit)?;
        writer.write_u32(self.loader_flags)?;
        writer.write_u32(self.number_of_rva_and_sizes)?;
        self.data_directories.write_to(writer)
    }
}

impl OptionalHeader64 {
    /// Size including the sixteen directory entries.
    pub const SIZE: usize = 112 + DataDirectories::SIZE;

    fn read_body<R: DataReader>(magic: u16, reader: &mut R) -> Result<Self> {
        Ok(Self {
            magic,
            major_linker_version: reader.read_u8()?,
            minor_linker_version: reader.read_u8()?,
            size_of_code: reader.read_u32()?,
            size_of_initialized_data: reader.read_u32()?,
            size_of_uninitialized_data: reader.read_u32()?,
            address_of_entry_point: reader.read_u32()?,
            base_of_code: reader.read_u32()?,
            image_base: reader.read_u64()?,
            section_alignment: reader.read_u32()?,
            file_alignment: reader.read_u32()?,
            major_operating_system_version: reader.read_u16()?,
            minor_operating_system_version: reader.read_u16()?,
            major_image_version: reader.read_u16()?,
            minor_image_version: reader.read_u16()?,
            major_subsystem_version: reader.read_u16()?,
            minor_subsystem_version: reader.read_u16()?,
            win32_version_value: reader.read_u32()?,
            size_of_image: reader.read_u32()?,
            size_of_headers: reader.read_u32()?,
            check_sum: reader.read_u32()?,
            subsystem: reader.read_u16()?,
            dll_characteristics: reader.read_u16()?,
            size_of_stack_reserve: reader.read_u64()?,
            size_of_stack_commit: reader.read_u64()?,
            size_of_heap_reserve: reader.read_u64()?,
            size_of_heap_commit: reader.read_u64()?,
            loader_flags: reader.read_u32()?,
            number_of_rva_and_sizes: reader.read_u32()?,
            data_directories: DataDirectories::read_from(reader)?,
        })
    }

    fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u16(self.magic)?;
        writer.write_u8(self.major_linker_version)?;
        writer.write_u8(self.minor_linker_version)?;
        writer.write_u32(self.size_of_code)?;
        writer.write_u32(self.size_of_initialized_data)?;
        writer.write_u32(self.size_of_uninitialized_data)?;
        writer.write_u32(self.address_of_entry_point)?;
        writer.write_u32(self.base_of_code)?;
        writer.write_u64(self.image_base)?;
        writer.write_u32(self.section_alignment)?;
        writer.write_u32(self.file_alignment)?;
        writer.write_u16(self.major_operating_system_version)?;
        writer.write_u16(self.minor_operating_system_version)?;
        writer.write_u16(self.major_image_version)?;
        writer.write_u16(self.minor_image_version)?;
        writer.write_u16(self.major_subsystem_version)?;
        writer.write_u16(self.minor_subsystem_version)?;
        writer.write_u32(self.win32_version_value)?;
        writer.write_u32(self.size_of_image)?;
        writer.write_u32(self.size_of_headers)?;
        writer.write_u32(self.check_sum)?;
        writer.write_u16(self.subsystem)?;
        writer.write_u16(self.dll_characteristics)?;
        writer.write_u64(self.size_of_stack_reserve)?;
        writer.write_u64(self.size_of_stack_commit)?;
        writer.write_u64(self.size_of_heap_reserve)?;
        writer.write_u64(self.size_of_heap_commit)?;
        writer.write_u32(self.loader_flags)?;
        writer.write_u32(self.number_of_rva_and_sizes)?;
        self.data_directories.write_to(writer)
    }
}

impl OptionalHeader {
    /// Read the magic and the layout it selects. Any magic other than
    /// PE32+ is read with the PE32 layout.
    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u16()?;
        match magic {
            PE32PLUS_MAGIC => Ok(Self::Pe32Plus(OptionalHeader64::read_body(magic, reader)?)),
            PE32_MAGIC => Ok(Self::Pe32(OptionalHeader32::read_body(magic, reader)?)),
            _ => {
                warn!("unknown optional header magic {magic:#06x}, reading as PE32");
                Ok(Self::Pe32(OptionalHeader32::read_body(magic, reader)?))
            }
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        match self {
            Self::Pe32(h) => h.write_to(writer),
            Self::Pe32Plus(h) => h.write_to(writer),
        }
    }

    /// Serialize to a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = DataWriter::new(Vec::with_capacity(self.size()));
        self.write_to(&mut writer)
            .expect("writing to a Vec cannot fail");
        writer.into_inner()
    }

    pub fn is_pe32plus(&self) -> bool {
        matches!(self, Self::Pe32Plus(_))
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Pe32(_) => OptionalHeader32::SIZE,
            Self::Pe32Plus(_) => OptionalHeader64::SIZE,
        }
    }

    pub fn magic(&self) -> u16 {
        match self {
            Self::Pe32(h) => h.magic,
            Self::Pe32Plus(h) => h.magic,
        }
    }

    pub fn data_directories(&self) -> &DataDirectories {
        match self {
            Self::Pe32(h) => &h.data_directories,
            Self::Pe32Plus(h) => &h.data_directories,
        }
    }

    pub fn data_directories_mut(&mut self) -> &mut DataDirectories {
        match self {
            Self::Pe32(h) => &mut h.data_directories,
            Self::Pe32Plus(h) => &mut h.data_directories,
        }
    }

    pub fn data_directory(&self, ty: DirectoryType) -> &DataDirectory {
        self.data_directories().get(ty)
    }

    pub fn address_of_entry_point(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.address_of_entry_point,
            Self::Pe32Plus(h) => h.address_of_entry_point,
        }
    }

    pub fn image_base(&self) -> u64 {
        match self {
            Self::Pe32(h) => u64::from(h.image_base),
            Self::Pe32Plus(h) => h.image_base,
        }
    }

    pub fn section_alignment(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.section_alignment,
            Self::Pe32Plus(h) => h.section_alignment,
        }
    }

    pub fn file_alignment(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.file_alignment,
            Self::Pe32Plus(h) => h.file_alignment,
        }
    }

    pub fn size_of_image(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.size_of_image,
            Self::Pe32Plus(h) => h.size_of_image,
        }
    }

    pub fn size_of_headers(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.size_of_headers,
            Self::Pe32Plus(h) => h.size_of_headers,
        }
    }

    pub fn subsystem(&self) -> u16 {
        match self {
            Self::Pe32(h) => h.subsystem,
            Self::Pe32Plus(h) => h.subsystem,
        }
    }
}
