//! Bound import directory.
//!
//! The table is a run of 8-byte records ended by an all-zero record, followed
//! by the module names the records point at. Name offsets are relative to the
//! start of the directory. Forwarder references share the record layout and
//! are kept in sequence with the descriptors that own them.

use std::collections::BTreeMap;

use crate::data_dir::DirectoryType;
use crate::reader::{DataReader, SliceReader};
use crate::writer::{string_to_latin1, DataWriter};
use crate::{Error, Result};

/// IMAGE_BOUND_IMPORT_DESCRIPTOR (or IMAGE_BOUND_FORWARDER_REF).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundImport {
    /// Timestamp of the bound DLL.
    pub time_date_stamp: u32,
    /// Offset to module name (from start of bound import data).
    pub offset_module_name: u16,
    /// Number of forwarder references, reserved in forwarder records.
    pub number_of_module_forwarder_refs: u16,
    /// Resolved module name.
    pub module_name: String,
}

impl BoundImport {
    pub const SIZE: usize = 8;

    pub fn new(time_date_stamp: u32, module_name: impl Into<String>) -> Self {
        Self {
            time_date_stamp,
            module_name: module_name.into(),
            ..Self::default()
        }
    }

    fn is_terminator(&self) -> bool {
        self.time_date_stamp == 0
            && self.offset_module_name == 0
            && self.number_of_module_forwarder_refs == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundImportTable {
    pub imports: Vec<BoundImport>,
}

impl BoundImportTable {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        let mut imports = Vec::new();
        loop {
            let entry = BoundImport {
                time_date_stamp: reader.read_u32()?,
                offset_module_name: reader.read_u16()?,
                number_of_module_forwarder_refs: reader.read_u16()?,
                module_name: String::new(),
            };
            if entry.is_terminator() {
                break;
            }
            imports.push(entry);
        }

        // Each distinct offset is read once, in ascending order, so the reader
        // only ever moves forward.
        let mut names = BTreeMap::new();
        for offset in imports.iter().map(|b| b.offset_module_name) {
            names.entry(offset).or_insert_with(String::new);
        }
        for (offset, name) in names.iter_mut() {
            reader.jump_to(u64::from(*offset))?;
            *name = reader.read_cstr()?;
        }
        for import in imports.iter_mut() {
            if let Some(name) = names.get(&import.offset_module_name) {
                import.module_name.clone_from(name);
            }
        }

        Ok(Self { imports })
    }

    /// Records, a zero record, each distinct name once in offset order, then
    /// zero padding up to `declared_size`.
    pub fn encode(&self, declared_size: u32) -> Result<Vec<u8>> {
        let mut writer = DataWriter::new(Vec::with_capacity(declared_size as usize));
        for import in &self.imports {
            writer.write_u32(import.time_date_stamp)?;
            writer.write_u16(import.offset_module_name)?;
            writer.write_u16(import.number_of_module_forwarder_refs)?;
        }
        writer.write_zeros(BoundImport::SIZE as u64)?;

        let mut names: BTreeMap<u16, &str> = BTreeMap::new();
        for import in &self.imports {
            names
                .entry(import.offset_module_name)
                .or_insert(import.module_name.as_str());
        }
        for name in names.values() {
            writer.write_cstr(name)?;
        }

        let encoded = writer.position() as usize;
        if encoded > declared_size as usize {
            return Err(Error::DirectoryOverflow {
                directory: DirectoryType::BoundImport,
                encoded,
                declared: declared_size,
            });
        }
        writer.write_zeros(u64::from(declared_size) - encoded as u64)?;
        Ok(writer.into_inner())
    }

    /// Assign name offsets for a sequential name area after the terminator.
    /// Records naming the same module share one string.
    pub fn assign_name_offsets(&mut self) {
        let mut next = (self.imports.len() + 1) * BoundImport::SIZE;
        let mut assigned: BTreeMap<String, u16> = BTreeMap::new();
        for import in self.imports.iter_mut() {
            let offset = *assigned
                .entry(import.module_name.clone())
                .or_insert_with(|| {
                    let offset = next as u16;
                    next += string_to_latin1(&import.module_name).len() + 1;
                    offset
                });
            import.offset_module_name = offset;
        }
    }

    /// Bytes needed for records, terminator and names.
    pub fn encoded_size(&self) -> usize {
        let mut names: BTreeMap<u16, usize> = BTreeMap::new();
        for import in &self.imports {
            names
                .entry(import.offset_module_name)
                .or_insert(string_to_latin1(&import.module_name).len() + 1);
        }
        (self.imports.len() + 1) * BoundImport::SIZE + names.values().sum::<usize>()
    }

    pub fn len(&self) -> usize {
        self.imports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BoundImportTable {
        let mut table = BoundImportTable {
            imports: vec![
                BoundImport::new(0x1111, "KERNEL32.dll"),
                BoundImport::new(0x2222, "USER32.dll"),
                BoundImport::new(0x3333, "KERNEL32.dll"),
            ],
        };
        table.assign_name_offsets();
        table
    }

    #[test]
    fn test_assign_name_offsets_dedupes() {
        let table = sample();
        assert_eq!(table.imports[0].offset_module_name, 32);
        assert_eq!(table.imports[1].offset_module_name, 45);
        assert_eq!(table.imports[2].offset_module_name, 32);
        assert_eq!(table.encoded_size(), 32 + 13 + 11);
    }

    #[test]
    fn test_encode_layout() {
        let table = sample();
        let bytes = table.encode(64).unwrap();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[24..32], &[0u8; 8]);
        assert_eq!(&bytes[32..45], b"KERNEL32.dll\0");
        assert_eq!(&bytes[45..56], b"USER32.dll\0");
        assert!(bytes[56..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_shared_names() {
        let table = sample();
        let bytes = table.encode(56).unwrap();
        let parsed = BoundImportTable::decode(&bytes).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.imports[0].module_name, "KERNEL32.dll");
        assert_eq!(parsed.imports[1].module_name, "USER32.dll");
        assert_eq!(parsed.imports[2].module_name, "KERNEL32.dll");
        assert_eq!(parsed, table);
        assert_eq!(parsed.encode(56).unwrap(), bytes);
    }

    #[test]
    fn test_encode_overflow() {
        let err = sample().encode(40).unwrap_err();
        assert!(matches!(
            err,
            Error::DirectoryOverflow {
                directory: DirectoryType::BoundImport,
                encoded: 56,
                declared: 40
            }
        ));
    }

    #[test]
    fn test_decode_missing_terminator() {
        let bytes = [0x11, 0x11, 0, 0, 0x10, 0, 0, 0];
        assert!(matches!(
            BoundImportTable::decode(&bytes),
            Err(Error::EndOfData { .. })
        ));
    }
}
