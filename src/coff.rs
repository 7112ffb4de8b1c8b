//! PE signature and COFF file header.

use std::io::Write;

use crate::reader::DataReader;
use crate::writer::DataWriter;
use crate::Result;

/// Machine type constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
#[non_exhaustive]
pub enum MachineType {
    Unknown = 0x0000,
    /// Intel 386 or later.
    I386 = 0x014C,
    /// x64 (AMD64).
    Amd64 = 0x8664,
    Arm = 0x01C0,
    Arm64 = 0xAA64,
    /// ARM Thumb-2 little endian.
    ArmNt = 0x01C4,
    /// Intel Itanium.
    Ia64 = 0x0200,
}

impl MachineType {
    /// Convert from raw u16 value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::Unknown),
            0x014C => Some(Self::I386),
            0x8664 => Some(Self::Amd64),
            0x01C0 => Some(Self::Arm),
            0xAA64 => Some(Self::Arm64),
            0x01C4 => Some(Self::ArmNt),
            0x0200 => Some(Self::Ia64),
            _ => None,
        }
    }
}

/// Characteristics flags for the COFF header.
pub mod characteristics {
    pub const RELOCS_STRIPPED: u16 = 0x0001;
    pub const EXECUTABLE_IMAGE: u16 = 0x0002;
    pub const LARGE_ADDRESS_AWARE: u16 = 0x0020;
    pub const MACHINE_32BIT: u16 = 0x0100;
    pub const DEBUG_STRIPPED: u16 = 0x0200;
    pub const SYSTEM: u16 = 0x1000;
    pub const DLL: u16 = 0x2000;
}

/// The 4-byte signature that follows the stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeSignature(pub [u8; 4]);

impl PeSignature {
    /// "PE\0\0".
    pub const PE: PeSignature = PeSignature(*b"PE\0\0");
    /// "Pi\0\0", accepted as an alternate spelling.
    pub const PI: PeSignature = PeSignature(*b"Pi\0\0");

    pub const SIZE: usize = 4;

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; 4];
        reader.read_exact_into(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_bytes(&self.0)
    }

    pub fn is_valid(&self) -> bool {
        *self == Self::PE || *self == Self::PI
    }
}

impl Default for PeSignature {
    fn default() -> Self {
        Self::PE
    }
}

/// COFF File Header (IMAGE_FILE_HEADER).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoffHeader {
    /// Target machine type.
    pub machine: u16,
    /// Number of section headers following the optional header.
    pub number_of_sections: u16,
    /// Timestamp (seconds since epoch).
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    /// Declared size of the optional header. Not used to locate the section table.
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    /// Size of the COFF header in bytes.
    pub const SIZE: usize = 20;

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            machine: reader.read_u16()?,
            number_of_sections: reader.read_u16()?,
            time_date_stamp: reader.read_u32()?,
            pointer_to_symbol_table: reader.read_u32()?,
            number_of_symbols: reader.read_u32()?,
            size_of_optional_header: reader.read_u16()?,
            characteristics: reader.read_u16()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u16(self.machine)?;
        writer.write_u16(self.number_of_sections)?;
        writer.write_u32(self.time_date_stamp)?;
        writer.write_u32(self.pointer_to_symbol_table)?;
        writer.write_u32(self.number_of_symbols)?;
        writer.write_u16(self.size_of_optional_header)?;
        writer.write_u16(self.characteristics)
    }

    /// Get the machine type as an enum.
    pub fn machine_type(&self) -> Option<MachineType> {
        MachineType::from_u16(self.machine)
    }

    pub fn is_dll(&self) -> bool {
        self.characteristics & characteristics::DLL != 0
    }

    pub fn is_executable(&self) -> bool {
        self.characteristics & characteristics::EXECUTABLE_IMAGE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SliceReader;

    #[test]
    fn test_machine_type_from_u16() {
        assert_eq!(MachineType::from_u16(0x8664), Some(MachineType::Amd64));
        assert_eq!(MachineType::from_u16(0x014C), Some(MachineType::I386));
        assert_eq!(MachineType::from_u16(0xFFFF), None);
    }

    #[test]
    fn test_signature_validity() {
        assert!(PeSignature(*b"PE\0\0").is_valid());
        assert!(PeSignature(*b"Pi\0\0").is_valid());
        assert!(!PeSignature(*b"NE\0\0").is_valid());
        assert!(!PeSignature(*b"PE\0\x01").is_valid());
    }

    #[test]
    fn test_coff_header_roundtrip() {
        let header = CoffHeader {
            machine: MachineType::Amd64 as u16,
            number_of_sections: 5,
            time_date_stamp: 0x12345678,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: 240,
            characteristics: characteristics::EXECUTABLE_IMAGE
                | characteristics::LARGE_ADDRESS_AWARE,
        };

        let mut writer = DataWriter::new(Vec::new());
        header.write_to(&mut writer).unwrap();
        let buf = writer.into_inner();
        assert_eq!(buf.len(), CoffHeader::SIZE);

        let parsed = CoffHeader::read_from(&mut SliceReader::new(&buf)).unwrap();
        assert_eq!(header, parsed);
        assert!(parsed.is_executable());
        assert!(!parsed.is_dll());
    }
}
