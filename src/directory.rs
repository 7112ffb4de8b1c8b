//! Decoded directory payloads and the per-kind codec dispatch.

use log::warn;

use crate::bound_import::BoundImportTable;
use crate::data_dir::DirectoryType;
use crate::debug::DebugDirectory;
use crate::export::ExportDirectory;
use crate::import::ImportDirectory;
use crate::loadconfig::LoadConfigDirectory;
use crate::resource::ResourceDirectory;
use crate::{Error, Result};

/// What a decoder needs to know about where the bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeContext {
    /// Virtual address of the first byte handed to the decoder.
    pub base_va: u32,
    /// Whether the image uses the PE32+ layout.
    pub is_64bit: bool,
}

/// Payload of one data directory.
///
/// Kinds without a structured decoder, and structured kinds whose bytes did
/// not decode, are held as [`DirectoryPayload::Raw`] and written back as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryPayload {
    Export(ExportDirectory),
    Import(ImportDirectory),
    Resource(ResourceDirectory),
    Debug(DebugDirectory),
    LoadConfig(LoadConfigDirectory),
    BoundImport(BoundImportTable),
    Raw(Vec<u8>),
}

impl DirectoryPayload {
    /// Decode `bytes` as a directory of kind `ty`.
    pub fn decode(ty: DirectoryType, bytes: &[u8], ctx: DecodeContext) -> Result<Self> {
        Ok(match ty {
            DirectoryType::Export => Self::Export(ExportDirectory::decode(bytes)?),
            DirectoryType::Import => Self::Import(ImportDirectory::decode(bytes)?),
            DirectoryType::Resource => {
                Self::Resource(ResourceDirectory::decode(bytes, ctx.base_va)?)
            }
            DirectoryType::Debug => Self::Debug(DebugDirectory::decode(bytes)?),
            DirectoryType::LoadConfig => {
                Self::LoadConfig(LoadConfigDirectory::decode(bytes, ctx.is_64bit)?)
            }
            DirectoryType::BoundImport => Self::BoundImport(BoundImportTable::decode(bytes)?),
            _ => Self::Raw(bytes.to_vec()),
        })
    }

    /// Decode, falling back to raw bytes when the structure is malformed or
    /// truncated. Only I/O failures are returned.
    pub fn decode_lenient(ty: DirectoryType, bytes: &[u8], ctx: DecodeContext) -> Result<Self> {
        match Self::decode(ty, bytes, ctx) {
            Ok(payload) => Ok(payload),
            Err(Error::Io(e)) => Err(Error::Io(e)),
            Err(e) => {
                warn!("{ty} directory kept as raw bytes: {e}");
                Ok(Self::Raw(bytes.to_vec()))
            }
        }
    }

    /// Encode without padding.
    pub fn to_bytes(&self, ctx: DecodeContext) -> Result<Vec<u8>> {
        Ok(match self {
            Self::Export(export) => export.encode(),
            Self::Import(import) => import.encode(),
            Self::Resource(resource) => resource.encode(ctx.base_va),
            Self::Debug(debug) => debug.encode(),
            Self::LoadConfig(config) => config.encode(),
            Self::BoundImport(bound) => bound.encode(bound.encoded_size() as u32)?,
            Self::Raw(raw) => raw.clone(),
        })
    }

    /// Encode into exactly `declared_size` bytes, zero-padding short encodings.
    /// Encodings longer than the declared size are an error.
    pub fn encode(&self, ty: DirectoryType, declared_size: u32, ctx: DecodeContext) -> Result<Vec<u8>> {
        let mut bytes = match self {
            Self::BoundImport(bound) => return bound.encode(declared_size),
            _ => self.to_bytes(ctx)?,
        };
        if bytes.len() > declared_size as usize {
            return Err(Error::DirectoryOverflow {
                directory: ty,
                encoded: bytes.len(),
                declared: declared_size,
            });
        }
        bytes.resize(declared_size as usize, 0);
        Ok(bytes)
    }

    /// Whether the payload is a structured decoding rather than raw bytes.
    pub fn is_decoded(&self) -> bool {
        !matches!(self, Self::Raw(_))
    }
}
