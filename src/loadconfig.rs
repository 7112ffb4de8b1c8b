//! Load configuration directory.

use crate::reader::{DataReader, SliceReader};
use crate::Result;

/// SafeSEH and later fields are present only in newer records.
const SEH_FIELDS_LEN: usize = 2;

/// IMAGE_LOAD_CONFIG_DIRECTORY, with pointer-width fields widened to `u64`.
///
/// Fields past the security cookie are decoded when the directory is large
/// enough to hold them and are zero otherwise. `raw` keeps every byte of the
/// directory and is what gets written back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadConfigDirectory {
    /// Size of the structure as declared by the linker.
    pub size: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub global_flags_clear: u32,
    pub global_flags_set: u32,
    pub critical_section_default_timeout: u32,
    pub de_commit_free_block_threshold: u64,
    pub de_commit_total_free_threshold: u64,
    pub lock_prefix_table: u64,
    pub maximum_allocation_size: u64,
    pub virtual_memory_threshold: u64,
    pub process_affinity_mask: u64,
    pub process_heap_flags: u32,
    pub csd_version: u16,
    pub dependent_load_flags: u16,
    pub edit_list: u64,
    pub security_cookie: u64,
    pub se_handler_table: u64,
    pub se_handler_count: u64,
    /// Whether the record was read with 8-byte pointers.
    pub is_64bit: bool,
    pub raw: Vec<u8>,
}

impl LoadConfigDirectory {
    pub fn decode(bytes: &[u8], is_64bit: bool) -> Result<Self> {
        let mut r = SliceReader::new(bytes);
        let mut config = Self {
            size: r.read_u32()?,
            time_date_stamp: r.read_u32()?,
            major_version: r.read_u16()?,
            minor_version: r.read_u16()?,
            global_flags_clear: r.read_u32()?,
            global_flags_set: r.read_u32()?,
            critical_section_default_timeout: r.read_u32()?,
            de_commit_free_block_threshold: r.read_word(is_64bit)?,
            de_commit_total_free_threshold: r.read_word(is_64bit)?,
            lock_prefix_table: r.read_word(is_64bit)?,
            maximum_allocation_size: r.read_word(is_64bit)?,
            virtual_memory_threshold: r.read_word(is_64bit)?,
            process_affinity_mask: r.read_word(is_64bit)?,
            process_heap_flags: r.read_u32()?,
            csd_version: r.read_u16()?,
            dependent_load_flags: r.read_u16()?,
            edit_list: r.read_word(is_64bit)?,
            security_cookie: r.read_word(is_64bit)?,
            is_64bit,
            raw: bytes.to_vec(),
            ..Self::default()
        };
        if r.remaining() >= SEH_FIELDS_LEN * Self::word_size(is_64bit) {
            config.se_handler_table = r.read_word(is_64bit)?;
            config.se_handler_count = r.read_word(is_64bit)?;
        }
        Ok(config)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.raw.clone()
    }

    fn word_size(is_64bit: bool) -> usize {
        if is_64bit {
            8
        } else {
            4
        }
    }

    pub fn has_safe_seh(&self) -> bool {
        self.se_handler_table != 0 && self.se_handler_count != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::DataWriter;

    fn build(is_64bit: bool, with_seh: bool) -> Vec<u8> {
        let mut w = DataWriter::new(Vec::new());
        w.write_u32(0).unwrap(); // size, patched below
        w.write_u32(0x1234).unwrap();
        w.write_u16(1).unwrap();
        w.write_u16(2).unwrap();
        w.write_u32(0).unwrap();
        w.write_u32(0).unwrap();
        w.write_u32(0).unwrap();
        for _ in 0..6 {
            w.write_word(0, is_64bit).unwrap();
        }
        w.write_u32(0).unwrap();
        w.write_u16(0).unwrap();
        w.write_u16(0).unwrap();
        w.write_word(0, is_64bit).unwrap();
        w.write_word(0xC00C1E, is_64bit).unwrap();
        if with_seh {
            w.write_word(0x4000, is_64bit).unwrap();
            w.write_word(3, is_64bit).unwrap();
        }
        let mut bytes = w.into_inner();
        let len = bytes.len() as u32;
        bytes[0..4].copy_from_slice(&len.to_le_bytes());
        bytes
    }

    #[test]
    fn test_load_config_32() {
        let bytes = build(false, true);
        assert_eq!(bytes.len(), 72);
        let config = LoadConfigDirectory::decode(&bytes, false).unwrap();
        assert_eq!(config.size, 72);
        assert_eq!(config.time_date_stamp, 0x1234);
        assert_eq!(config.security_cookie, 0xC00C1E);
        assert!(config.has_safe_seh());
        assert_eq!(config.encode(), bytes);
    }

    #[test]
    fn test_load_config_64_without_seh() {
        let bytes = build(true, false);
        assert_eq!(bytes.len(), 96);
        let config = LoadConfigDirectory::decode(&bytes, true).unwrap();
        assert_eq!(config.security_cookie, 0xC00C1E);
        assert_eq!(config.se_handler_table, 0);
        assert!(!config.has_safe_seh());
    }
}
