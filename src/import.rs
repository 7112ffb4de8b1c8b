//! Import directory table.

use std::io::Write;

use crate::reader::{DataReader, SliceReader};
use crate::writer::DataWriter;
use crate::Result;

/// IMAGE_IMPORT_DESCRIPTOR - 20 bytes
/// Describes one imported DLL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportDescriptor {
    /// RVA to the Import Lookup Table.
    pub original_first_thunk: u32,
    /// Timestamp (0 if not bound).
    pub time_date_stamp: u32,
    /// Forwarder chain index (-1 if no forwarders).
    pub forwarder_chain: u32,
    /// RVA to the DLL name.
    pub name_rva: u32,
    /// RVA to the Import Address Table.
    pub first_thunk: u32,
}

impl ImportDescriptor {
    pub const SIZE: usize = 20;

    /// The all-zero descriptor ends the table.
    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }

    pub fn read_from<R: DataReader>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            original_first_thunk: reader.read_u32()?,
            time_date_stamp: reader.read_u32()?,
            forwarder_chain: reader.read_u32()?,
            name_rva: reader.read_u32()?,
            first_thunk: reader.read_u32()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut DataWriter<W>) -> Result<()> {
        writer.write_u32(self.original_first_thunk)?;
        writer.write_u32(self.time_date_stamp)?;
        writer.write_u32(self.forwarder_chain)?;
        writer.write_u32(self.name_rva)?;
        writer.write_u32(self.first_thunk)
    }
}

/// The descriptor table, without its terminating sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportDirectory {
    pub descriptors: Vec<ImportDescriptor>,
}

impl ImportDirectory {
    /// Read descriptors until the all-zero sentinel. A table that runs out of
    /// bytes before the sentinel ends at the last whole descriptor.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(bytes);
        let mut descriptors = Vec::new();
        while reader.remaining() >= ImportDescriptor::SIZE {
            let descriptor = ImportDescriptor::read_from(&mut reader)?;
            if descriptor.is_null() {
                break;
            }
            descriptors.push(descriptor);
        }
        Ok(Self { descriptors })
    }

    /// Descriptors followed by one zero descriptor.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer =
            DataWriter::new(Vec::with_capacity(self.encoded_size()));
        for descriptor in self.descriptors.iter().chain([ImportDescriptor::default()].iter()) {
            descriptor
                .write_to(&mut writer)
                .expect("writing to a Vec cannot fail");
        }
        writer.into_inner()
    }

    pub fn encoded_size(&self) -> usize {
        (self.descriptors.len() + 1) * ImportDescriptor::SIZE
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
