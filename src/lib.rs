//! # peimage
//!
//! A PE/COFF image reader and assembler that reproduces its input byte for
//! byte.
//!
//! Parsing walks the file as a sequence of regions: the headers, then section
//! raw data and directories stored outside sections, in ascending file order.
//! The gaps between regions and any bytes after the last region are kept, so
//! assembling a parsed [`Image`] writes the original file back unchanged.
//!
//! ## Features
//!
//! - **Lossless round trip**: `Image::parse(bytes)?.to_bytes()? == bytes` for
//!   any input the parser accepts.
//! - **Streaming input**: [`parse_reader`] reads any `std::io::Read` strictly
//!   forward.
//! - **Structured directories**: imports, exports, resources, debug, load
//!   config and bound imports are decoded; everything else is kept as raw bytes.
//! - **Building**: [`ImageBuilder`] lays out new images from sections and
//!   directory payloads.
//!
//! ## Example
//!
//! ```no_run
//! use peimage::Image;
//!
//! let bytes = std::fs::read("example.exe").unwrap();
//! let image = Image::parse(&bytes).unwrap();
//! println!("{}", image.summary());
//! assert_eq!(image.to_bytes().unwrap(), bytes);
//! ```

pub mod assembler;
pub mod bound_import;
pub mod builder;
pub mod coff;
pub mod data_dir;
pub mod debug;
pub mod directory;
pub mod dos;
pub mod error;
pub mod export;
pub mod image;
pub mod image_data;
pub mod import;
pub mod layout;
pub mod loadconfig;
pub mod optional;
pub mod parser;
pub mod reader;
pub mod resource;
pub mod rva;
pub mod schedule;
pub mod section;
pub mod writer;

pub use assembler::{assemble, write_image};
pub use bound_import::{BoundImport, BoundImportTable};
pub use builder::ImageBuilder;
pub use coff::{CoffHeader, MachineType, PeSignature};
pub use data_dir::{DataDirectories, DataDirectory, DirectoryType};
pub use debug::{CodeViewRsds, DebugDirectory, DebugType};
pub use directory::{DecodeContext, DirectoryPayload};
pub use dos::DosHeader;
pub use error::{Error, ErrorCategory, Result};
pub use export::ExportDirectory;
pub use image::{Image, ImageSummary, SectionSummary};
pub use image_data::ImageData;
pub use import::{ImportDescriptor, ImportDirectory};
pub use layout::LayoutConfig;
pub use loadconfig::LoadConfigDirectory;
pub use optional::{OptionalHeader, OptionalHeader32, OptionalHeader64, Subsystem};
pub use parser::{parse, parse_file, parse_reader, parse_with, ParseOptions};
pub use reader::{DataReader, SliceReader, StreamReader};
pub use resource::{ResourceData, ResourceDirectory, ResourceEntry, ResourceId, ResourceNode};
pub use rva::RvaConverter;
pub use schedule::{find_next_region, Pass, Region, RegionKind};
pub use section::{SectionData, SectionHeader, SectionTable};
pub use writer::DataWriter;
