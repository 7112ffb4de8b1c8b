//! Debug directory and CodeView records.

use crate::reader::{DataReader, SliceReader};
use crate::Result;

/// Debug types (IMAGE_DEBUG_TYPE_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DebugType {
    Unknown = 0,
    Coff = 1,
    CodeView = 2,
    Fpo = 3,
    Misc = 4,
    Exception = 5,
    Fixup = 6,
    Borland = 9,
    VcFeature = 12,
    Pogo = 13,
    Iltcg = 14,
    Repro = 16,
    ExDllCharacteristics = 20,
}

impl DebugType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Coff,
            2 => Self::CodeView,
            3 => Self::Fpo,
            4 => Self::Misc,
            5 => Self::Exception,
            6 => Self::Fixup,
            9 => Self::Borland,
            12 => Self::VcFeature,
            13 => Self::Pogo,
            14 => Self::Iltcg,
            16 => Self::Repro,
            20 => Self::ExDllCharacteristics,
            _ => Self::Unknown,
        }
    }
}

/// IMAGE_DEBUG_DIRECTORY - 28 bytes, plus the directory bytes it came from.
///
/// The fields describe the first record. `pointer_to_raw_data` and
/// `size_of_data` locate the debug raw-data block the parser captures
/// separately.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebugDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub debug_type: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub raw: Vec<u8>,
}

impl DebugDirectory {
    pub const SIZE: usize = 28;

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        Ok(Self {
            characteristics: reader.read_u32()?,
            time_date_stamp: reader.read_u32()?,
            major_version: reader.read_u16()?,
            minor_version: reader.read_u16()?,
            debug_type: reader.read_u32()?,
            size_of_data: reader.read_u32()?,
            address_of_raw_data: reader.read_u32()?,
            pointer_to_raw_data: reader.read_u32()?,
            raw: bytes.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.raw.clone()
    }

    pub fn get_type(&self) -> DebugType {
        DebugType::from_u32(self.debug_type)
    }

    /// File offset of the raw-data block, if the record points at one.
    pub fn raw_data_location(&self) -> Option<(u64, u32)> {
        if self.pointer_to_raw_data == 0 || self.size_of_data == 0 {
            return None;
        }
        Some((u64::from(self.pointer_to_raw_data), self.size_of_data))
    }
}

/// CodeView "RSDS" signature.
pub const CV_SIGNATURE_RSDS: u32 = 0x53445352;

/// CodeView PDB 7.0 record found in CodeView debug raw data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViewRsds {
    pub guid: [u8; 16],
    pub age: u32,
    pub pdb_path: String,
}

impl CodeViewRsds {
    /// Decode an RSDS record. `None` for other CodeView formats.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let mut reader = SliceReader::new(bytes);
        if reader.read_u32()? != CV_SIGNATURE_RSDS {
            return Ok(None);
        }
        let mut guid = [0u8; 16];
        reader.read_exact_into(&mut guid)?;
        let age = reader.read_u32()?;
        let pdb_path = reader.read_cstr()?;
        Ok(Some(Self {
            guid,
            age,
            pdb_path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ty: u32, size: u32, ptr: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0x5F00_0000u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&ty.to_le_bytes());
        data.extend_from_slice(&size.to_le_bytes());
        data.extend_from_slice(&0x2100u32.to_le_bytes());
        data.extend_from_slice(&ptr.to_le_bytes());
        data
    }

    #[test]
    fn test_debug_decode() {
        let bytes = record(2, 0x40, 0x900);
        let debug = DebugDirectory::decode(&bytes).unwrap();
        assert_eq!(debug.get_type(), DebugType::CodeView);
        assert_eq!(debug.time_date_stamp, 0x5F00_0000);
        assert_eq!(debug.raw_data_location(), Some((0x900, 0x40)));
        assert_eq!(debug.encode(), bytes);
    }

    #[test]
    fn test_no_raw_data_location() {
        let debug = DebugDirectory::decode(&record(16, 0, 0)).unwrap();
        assert_eq!(debug.get_type(), DebugType::Repro);
        assert_eq!(debug.raw_data_location(), None);
    }

    #[test]
    fn test_codeview_rsds() {
        let mut data = Vec::new();
        data.extend_from_slice(b"RSDS");
        data.extend_from_slice(&[0xAB; 16]);
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(b"C:\\build\\app.pdb\0");
        let cv = CodeViewRsds::decode(&data).unwrap().unwrap();
        assert_eq!(cv.age, 3);
        assert_eq!(cv.pdb_path, "C:\\build\\app.pdb");

        assert_eq!(CodeViewRsds::decode(b"NB10\0\0\0\0").unwrap(), None);
    }
}
