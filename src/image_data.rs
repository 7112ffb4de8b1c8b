//! Decoded directory payloads collected from an image.

use std::collections::BTreeMap;

use crate::bound_import::BoundImportTable;
use crate::data_dir::DirectoryType;
use crate::debug::{CodeViewRsds, DebugDirectory, DebugType};
use crate::directory::DirectoryPayload;
use crate::export::ExportDirectory;
use crate::import::ImportDirectory;
use crate::loadconfig::LoadConfigDirectory;
use crate::resource::ResourceDirectory;

/// Sparse map of directory payloads, plus the gap bytes in front of
/// directories that were read as standalone file regions and the debug
/// raw-data block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageData {
    payloads: BTreeMap<DirectoryType, DirectoryPayload>,
    preambles: BTreeMap<DirectoryType, Vec<u8>>,
    debug_raw_data: Option<Vec<u8>>,
    debug_raw_data_preamble: Option<Vec<u8>>,
}

impl ImageData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ty: DirectoryType) -> Option<&DirectoryPayload> {
        self.payloads.get(&ty)
    }

    pub fn get_mut(&mut self, ty: DirectoryType) -> Option<&mut DirectoryPayload> {
        self.payloads.get_mut(&ty)
    }

    pub fn put(&mut self, ty: DirectoryType, payload: DirectoryPayload) {
        self.payloads.insert(ty, payload);
    }

    pub fn remove(&mut self, ty: DirectoryType) -> Option<DirectoryPayload> {
        self.payloads.remove(&ty)
    }

    /// Kinds that have a payload, in table order.
    pub fn kinds(&self) -> impl Iterator<Item = DirectoryType> + '_ {
        self.payloads.keys().copied()
    }

    pub fn preamble(&self, ty: DirectoryType) -> Option<&[u8]> {
        self.preambles.get(&ty).map(Vec::as_slice)
    }

    pub fn set_preamble(&mut self, ty: DirectoryType, bytes: Vec<u8>) {
        self.preambles.insert(ty, bytes);
    }

    pub fn debug_raw_data(&self) -> Option<&[u8]> {
        self.debug_raw_data.as_deref()
    }

    pub fn set_debug_raw_data(&mut self, bytes: Vec<u8>) {
        self.debug_raw_data = Some(bytes);
    }

    pub fn debug_raw_data_preamble(&self) -> Option<&[u8]> {
        self.debug_raw_data_preamble.as_deref()
    }

    pub fn set_debug_raw_data_preamble(&mut self, bytes: Vec<u8>) {
        self.debug_raw_data_preamble = Some(bytes);
    }

    pub fn export_table(&self) -> Option<&ExportDirectory> {
        match self.get(DirectoryType::Export)? {
            DirectoryPayload::Export(export) => Some(export),
            _ => None,
        }
    }

    pub fn import_table(&self) -> Option<&ImportDirectory> {
        match self.get(DirectoryType::Import)? {
            DirectoryPayload::Import(import) => Some(import),
            _ => None,
        }
    }

    pub fn resource_table(&self) -> Option<&ResourceDirectory> {
        match self.get(DirectoryType::Resource)? {
            DirectoryPayload::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    pub fn debug(&self) -> Option<&DebugDirectory> {
        match self.get(DirectoryType::Debug)? {
            DirectoryPayload::Debug(debug) => Some(debug),
            _ => None,
        }
    }

    pub fn load_config(&self) -> Option<&LoadConfigDirectory> {
        match self.get(DirectoryType::LoadConfig)? {
            DirectoryPayload::LoadConfig(config) => Some(config),
            _ => None,
        }
    }

    pub fn bound_imports(&self) -> Option<&BoundImportTable> {
        match self.get(DirectoryType::BoundImport)? {
            DirectoryPayload::BoundImport(bound) => Some(bound),
            _ => None,
        }
    }

    /// Raw bytes of an opaque or undecodable directory.
    pub fn raw(&self, ty: DirectoryType) -> Option<&[u8]> {
        match self.get(ty)? {
            DirectoryPayload::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// PDB record from the captured CodeView debug data, if any.
    pub fn codeview(&self) -> Option<CodeViewRsds> {
        let debug = self.debug()?;
        if debug.get_type() != DebugType::CodeView {
            return None;
        }
        CodeViewRsds::decode(self.debug_raw_data()?).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let mut data = ImageData::new();
        data.put(
            DirectoryType::Import,
            DirectoryPayload::Import(ImportDirectory::default()),
        );
        data.put(DirectoryType::Tls, DirectoryPayload::Raw(vec![1, 2]));

        assert!(data.import_table().is_some());
        assert!(data.export_table().is_none());
        assert_eq!(data.raw(DirectoryType::Tls), Some(&[1u8, 2][..]));
        assert_eq!(data.raw(DirectoryType::Import), None);
        let kinds: Vec<_> = data.kinds().collect();
        assert_eq!(kinds, vec![DirectoryType::Import, DirectoryType::Tls]);
    }

    #[test]
    fn test_codeview_lookup() {
        let mut record = vec![0u8; 28];
        record[12..16].copy_from_slice(&2u32.to_le_bytes());
        let mut data = ImageData::new();
        data.put(
            DirectoryType::Debug,
            DirectoryPayload::Debug(DebugDirectory::decode(&record).unwrap()),
        );
        assert!(data.codeview().is_none());

        let mut raw = b"RSDS".to_vec();
        raw.extend_from_slice(&[0; 20]);
        raw.extend_from_slice(b"x.pdb\0");
        data.set_debug_raw_data(raw);
        assert_eq!(data.codeview().unwrap().pdb_path, "x.pdb");
    }
}
