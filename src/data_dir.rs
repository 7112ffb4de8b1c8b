//! Data directory table.

use std::io::Write;
use std::ops::{Index, IndexMut};

use strum::{Display, EnumCount, EnumIter, FromRepr, IntoEnumIterator};

use crate::reader::DataReader;
use crate::writer::DataWriter;
use crate::{Error, Result};

/// The sixteen data directory kinds, in table order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumCount, EnumIter, FromRepr,
)]
#[repr(usize)]
pub enum DirectoryType {
    /// Export table (.edata)
    Export = 0,
    /// Import table (.idata)
    Import = 1,
    /// Resource table (.rsrc)
    Resource = 2,
    /// Exception table (.pdata)
    Exception = 3,
    /// Attribute certificate table. Its address is a file offset, not an RVA.
    Certificate = 4,
    /// Base relocation table (.reloc)
    BaseRelocation = 5,
    Debug = 6,
    Architecture = 7,
    GlobalPointer = 8,
    /// Thread local storage (.tls)
    #[strum(serialize = "TLS")]
    Tls = 9,
    LoadConfig = 10,
    BoundImport = 11,
    /// Import address table
    #[strum(serialize = "IAT")]
    Iat = 12,
    DelayImport = 13,
    /// CLR runtime header
    #[strum(serialize = "CLR")]
    ClrRuntime = 14,
    Reserved = 15,
}

impl DirectoryType {
    pub const fn as_index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Result<Self> {
        Self::from_repr(index).ok_or(Error::InvalidDirectoryIndex(index))
    }

    /// All directory kinds in table order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// Whether the parser decodes this kind into a structured payload.
    pub fn is_structured(self) -> bool {
        matches!(
            self,
            Self::Export
                | Self::Import
                | Self::Resource
                | Self::Debug
                | Self::LoadConfig
                | Self::BoundImport
        )
    }
}

/// Number of data directories always present in the optional header.
pub const NUMBER_OF_DIRECTORY_ENTRIES: usize = DirectoryType::COUNT;

/// Data Directory entry (IMAGE_DATA_DIRECTORY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    /// RVA of the table (a file offset for the certificate table).
    pub virtual_address: u32,
    /// Size of the table in bytes.
    pub size: u32,
}

impl DataDirectory {
    pub const SIZE: usize = 8;

    pub fn new(virtual_address: u32, size: u32) -> Self {
        Self {
            virtual_address,
            size,
        }
    }

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            virtual_address: reader.read_u32()?,
            size: reader.read_u32()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u32(self.virtual_address)?;
        writer.write_u32(self.size)
    }

    /// Empty directories (size 0) are never scheduled or decoded.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// One past the last address covered, saturating.
    pub fn end(&self) -> u32 {
        self.virtual_address.saturating_add(self.size)
    }
}

/// The fixed table of sixteen directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectories([DataDirectory; NUMBER_OF_DIRECTORY_ENTRIES]);

impl DataDirectories {
    pub const SIZE: usize = NUMBER_OF_DIRECTORY_ENTRIES * DataDirectory::SIZE;

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        let mut table = Self::default();
        for entry in table.0.iter_mut() {
            *entry = DataDirectory::read_from(reader)?;
        }
        Ok(table)
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        for entry in &self.0 {
            entry.write_to(writer)?;
        }
        Ok(())
    }

    pub fn get(&self, ty: DirectoryType) -> &DataDirectory {
        &self.0[ty.as_index()]
    }

    pub fn set(&mut self, ty: DirectoryType, entry: DataDirectory) {
        self.0[ty.as_index()] = entry;
    }

    /// Iterate entries together with their kind.
    pub fn iter(&self) -> impl Iterator<Item = (DirectoryType, &DataDirectory)> {
        DirectoryType::all().zip(self.0.iter())
    }

    /// Iterate only the non-empty entries.
    pub fn present(&self) -> impl Iterator<Item = (DirectoryType, &DataDirectory)> {
        self.iter().filter(|(_, dir)| !dir.is_empty())
    }
}

impl Index<DirectoryType> for DataDirectories {
    type Output = DataDirectory;

    fn index(&self, ty: DirectoryType) -> &DataDirectory {
        self.get(ty)
    }
}

impl IndexMut<DirectoryType> for DataDirectories {
    fn index_mut(&mut self, ty: DirectoryType) -> &mut DataDirectory {
        &mut self.0[ty.as_index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SliceReader;

    #[test]
    fn test_directory_type_values() {
        assert_eq!(NUMBER_OF_DIRECTORY_ENTRIES, 16);
        assert_eq!(DirectoryType::Export.as_index(), 0);
        assert_eq!(DirectoryType::Certificate.as_index(), 4);
        assert_eq!(DirectoryType::Debug.as_index(), 6);
        assert_eq!(DirectoryType::BoundImport.as_index(), 11);
        assert_eq!(DirectoryType::Reserved.as_index(), 15);
    }

    #[test]
    fn test_directory_type_from_index() {
        for (i, ty) in DirectoryType::all().enumerate() {
            assert_eq!(DirectoryType::from_index(i).unwrap(), ty);
        }
        assert!(matches!(
            DirectoryType::from_index(16),
            Err(Error::InvalidDirectoryIndex(16))
        ));
    }

    #[test]
    fn test_directory_type_names() {
        assert_eq!(DirectoryType::Tls.to_string(), "TLS");
        assert_eq!(DirectoryType::LoadConfig.to_string(), "LoadConfig");
        assert_eq!(DirectoryType::ClrRuntime.to_string(), "CLR");
    }

    #[test]
    fn test_directories_table() {
        let mut table = DataDirectories::default();
        table[DirectoryType::Import] = DataDirectory::new(0x2000, 0x28);
        table.set(DirectoryType::Debug, DataDirectory::new(0x3000, 0x1C));

        let mut writer = DataWriter::new(Vec::new());
        table.write_to(&mut writer).unwrap();
        let buf = writer.into_inner();
        assert_eq!(buf.len(), DataDirectories::SIZE);
        assert_eq!(&buf[8..16], &[0x00, 0x20, 0, 0, 0x28, 0, 0, 0]);

        let parsed = DataDirectories::read_from(&mut SliceReader::new(&buf)).unwrap();
        assert_eq!(parsed, table);
        let present: Vec<_> = parsed.present().map(|(ty, _)| ty).collect();
        assert_eq!(present, vec![DirectoryType::Import, DirectoryType::Debug]);
    }
}
