//! Integration tests for the peimage library.
//!
//! These build images, assemble them, parse the bytes back and assemble
//! again: build → bytes → parse → bytes.

use std::io::Cursor;

use peimage::{
    parse_reader, section::characteristics, BoundImport, BoundImportTable, DirectoryPayload,
    DirectoryType, Error, Image, ImageBuilder, ImportDescriptor, ImportDirectory, MachineType,
    ParseOptions, ResourceDirectory, ResourceId, Subsystem,
};

const TEXT: u32 = characteristics::CODE | characteristics::EXECUTE | characteristics::READ;
const DATA: u32 = characteristics::INITIALIZED_DATA | characteristics::READ;

fn two_section_image() -> Image {
    ImageBuilder::new()
        .machine(MachineType::Amd64)
        .subsystem(Subsystem::WindowsCui)
        .entry_point(0x1000)
        .add_section(".text", vec![0xCC; 0x200], TEXT)
        .add_section(".data", vec![0x11; 0x100], DATA | characteristics::WRITE)
        .build()
        .expect("build")
}

fn bound_table() -> BoundImportTable {
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

/// Parse, assemble, and check the bytes come back unchanged.
fn assert_round_trip(bytes: &[u8]) -> Image {
    let image = Image::parse(bytes).expect("parse");
    let written = image.to_bytes().expect("assemble");
    assert_eq!(written.len(), bytes.len());
    assert!(written == bytes, "assembled bytes differ from input");
    image
}

#[test]
fn test_builder_round_trip() {
    let image = two_section_image();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);

    assert_eq!(parsed, image);
    assert!(parsed.is_pe());
    assert!(parsed.is_64bit());
    let table = parsed.section_table.as_ref().unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.headers()[0].name(), ".text");
    assert_eq!(table.headers()[1].name(), ".data");
    assert_eq!(bytes.len(), 0x600);
}

#[test]
fn test_32bit_round_trip() {
    let image = ImageBuilder::new()
        .machine(MachineType::I386)
        .subsystem(Subsystem::WindowsGui)
        .entry_point(0x1000)
        .add_section(".text", vec![0x90; 0x100], TEXT)
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);

    assert!(!parsed.is_64bit());
    assert_eq!(parsed.coff_header.unwrap().machine, MachineType::I386 as u16);
    assert_eq!(parsed.optional_header.as_ref().unwrap().image_base(), 0x400000);
}

#[test]
fn test_reassembly_is_idempotent() {
    let bytes = two_section_image().to_bytes().unwrap();
    let first = Image::parse(&bytes).unwrap();
    let second = Image::parse(&first.to_bytes().unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_stream_and_slice_agree() {
    let bytes = two_section_image().to_bytes().unwrap();
    let from_slice = Image::parse(&bytes).unwrap();
    let from_stream = parse_reader(Cursor::new(&bytes), &ParseOptions::default()).unwrap();
    assert_eq!(from_slice, from_stream);
}

#[test]
fn test_address_translation() {
    let image = two_section_image();
    assert_eq!(image.rva_to_offset(0x1000), Some(0x200));
    assert_eq!(image.rva_to_offset(0x1010), Some(0x210));
    assert_eq!(image.rva_to_offset(0x2004), Some(0x404));
    assert_eq!(image.rva_to_offset(0x9000), None);
}

#[test]
fn test_legacy_short_circuit() {
    let mut bytes = vec![0u8; 0x200];
    bytes[0] = b'M';
    bytes[1] = b'Z';
    bytes[0x100] = 0xAA;

    let image = Image::parse(&bytes).unwrap();
    assert!(!image.is_pe());
    assert!(image.dos_stub.is_none());
    assert!(image.signature.is_none());
    assert!(image.section_table.is_none());
    assert!(image.image_data.kinds().next().is_none());
    assert_eq!(image.to_bytes().unwrap(), &bytes[..64]);

    // Offsets past the configured bound are treated the same way.
    bytes[0x3C..0x40].copy_from_slice(&0x180u32.to_le_bytes());
    let options = ParseOptions::new().max_new_header_offset(0x100);
    assert!(peimage::parse_with(&bytes, &options).unwrap().signature.is_none());
}

#[test]
fn test_invalid_signature_halts() {
    let mut bytes = two_section_image().to_bytes().unwrap();
    bytes[0x80..0x84].copy_from_slice(b"XX\0\0");

    let image = Image::parse(&bytes).unwrap();
    assert!(!image.is_pe());
    assert_eq!(image.dos_stub.as_ref().unwrap().len(), 0x40);
    assert!(image.coff_header.is_none());
    assert!(image.trailing_data.is_none());
    assert_eq!(image.to_bytes().unwrap(), &bytes[..0x84]);
}

#[test]
fn test_bound_imports_in_header_area() {
    let image = ImageBuilder::new()
        .header_directory(
            DirectoryType::BoundImport,
            DirectoryPayload::BoundImport(bound_table()),
        )
        .add_section(".text", vec![0xC3; 0x10], TEXT)
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);
    assert_eq!(parsed, image);

    let dir = *parsed
        .optional_header
        .as_ref()
        .unwrap()
        .data_directory(DirectoryType::BoundImport);
    assert_eq!(dir.size, 56);

    let bound = parsed.image_data.bound_imports().expect("bound imports decoded");
    let offsets: Vec<u16> = bound.imports.iter().map(|b| b.offset_module_name).collect();
    assert_eq!(offsets, vec![32, 45, 32]);
    let names: Vec<&str> = bound.imports.iter().map(|b| b.module_name.as_str()).collect();
    assert_eq!(names, vec!["KERNEL32.dll", "USER32.dll", "KERNEL32.dll"]);

    // The shared name is stored once.
    let start = dir.virtual_address as usize;
    let blob = &bytes[start..start + dir.size as usize];
    assert_eq!(&blob[32..45], b"KERNEL32.dll\0");
    assert_eq!(&blob[45..56], b"USER32.dll\0");
}

#[test]
fn test_resource_section() {
    let mut tree = ResourceDirectory::default();
    tree.add_data(
        &[ResourceId::Id(3), ResourceId::Id(1), ResourceId::Id(1033)],
        vec![0xDE, 0xAD, 0xBE, 0xEF],
    );
    tree.add_data(
        &[
            ResourceId::Name("CONFIG".to_string()),
            ResourceId::Id(1),
            ResourceId::Id(0),
        ],
        b"key=value".to_vec(),
    );

    let image = ImageBuilder::new()
        .add_section(".text", vec![0xC3], TEXT)
        .add_directory_section(
            ".rsrc",
            DirectoryType::Resource,
            DirectoryPayload::Resource(tree.clone()),
            DATA,
        )
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);
    assert_eq!(parsed, image);

    let resources = parsed.image_data.resource_table().expect("resource tree");
    assert_eq!(resources, &tree);
    let leaves = resources.leaves();
    assert_eq!(leaves.len(), 2);
    assert_eq!(
        leaves[0].0,
        vec![&ResourceId::Id(3), &ResourceId::Id(1), &ResourceId::Id(1033)]
    );
    assert_eq!(leaves[0].1.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(leaves[1].1.data, b"key=value");
    assert!(resources.find(&ResourceId::Name("CONFIG".into())).is_some());
}

#[test]
fn test_malformed_resource_entry_is_skipped() {
    let builder = ImageBuilder::new().add_section(".text", vec![0xC3], TEXT);
    let base_va = builder.next_section_rva().unwrap();

    // Root table with two ID entries. The first points its leaf descriptor
    // outside the directory; the second is a well-formed leaf.
    let mut blob = Vec::new();
    blob.extend_from_slice(&[0u8; 12]);
    blob.extend_from_slice(&0u16.to_le_bytes());
    blob.extend_from_slice(&2u16.to_le_bytes());
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&0x1000u32.to_le_bytes());
    blob.extend_from_slice(&2u32.to_le_bytes());
    blob.extend_from_slice(&32u32.to_le_bytes());
    blob.extend_from_slice(&(base_va + 48).to_le_bytes());
    blob.extend_from_slice(&4u32.to_le_bytes());
    blob.extend_from_slice(&1252u32.to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());
    blob.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

    let image = builder
        .add_directory_section(
            ".rsrc",
            DirectoryType::Resource,
            DirectoryPayload::Raw(blob),
            DATA,
        )
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);

    let resources = parsed.image_data.resource_table().expect("resource tree");
    assert_eq!(resources.entries.len(), 1);
    assert_eq!(resources.entries[0].id, ResourceId::Id(2));
    let leaves = resources.leaves();
    assert_eq!(leaves[0].1.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(leaves[0].1.code_page, 1252);
}

#[test]
fn test_import_section() {
    let imports = ImportDirectory {
        descriptors: vec![ImportDescriptor {
            original_first_thunk: 0x2100,
            name_rva: 0x2200,
            first_thunk: 0x2300,
            ..Default::default()
        }],
    };
    let image = ImageBuilder::new()
        .add_section(".text", vec![0xC3], TEXT)
        .add_directory_section(
            ".idata",
            DirectoryType::Import,
            DirectoryPayload::Import(imports.clone()),
            DATA,
        )
        .build()
        .unwrap();
    let parsed = assert_round_trip(&image.to_bytes().unwrap());
    assert_eq!(parsed.image_data.import_table(), Some(&imports));
}

#[test]
fn test_debug_raw_data_captured() {
    let mut record = vec![0u8; 28];
    record[12..16].copy_from_slice(&2u32.to_le_bytes());
    record[16..20].copy_from_slice(&32u32.to_le_bytes());
    record[24..28].copy_from_slice(&0x400u32.to_le_bytes());

    let mut rsds = b"RSDS".to_vec();
    rsds.extend_from_slice(&[0x42; 16]);
    rsds.extend_from_slice(&3u32.to_le_bytes());
    rsds.extend_from_slice(b"app.pdb\0");
    assert_eq!(rsds.len(), 32);

    // One section at 0x200..0x400, then the debug block.
    let image = ImageBuilder::new()
        .add_directory_section(
            ".rdata",
            DirectoryType::Debug,
            DirectoryPayload::Raw(record),
            DATA,
        )
        .trailing_data(rsds.clone())
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);

    assert!(parsed.trailing_data.is_none());
    assert_eq!(parsed.image_data.debug_raw_data(), Some(&rsds[..]));
    let codeview = parsed.image_data.codeview().expect("codeview record");
    assert_eq!(codeview.pdb_path, "app.pdb");
    assert_eq!(codeview.age, 3);
}

#[test]
fn test_trailing_data_preserved() {
    let overlay = b"overlay payload".to_vec();
    let image = ImageBuilder::new()
        .add_section(".text", vec![0xC3], TEXT)
        .trailing_data(overlay.clone())
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);
    assert_eq!(parsed.trailing_data.as_deref(), Some(&overlay[..]));
    assert!(bytes.ends_with(&overlay));
}

#[test]
fn test_certificate_table() {
    let certificate = vec![0x30; 0x28];
    let image = ImageBuilder::new()
        .add_section(".text", vec![0xC3], TEXT)
        .certificate_table(certificate.clone())
        .trailing_data(vec![1, 2, 3])
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();
    let parsed = assert_round_trip(&bytes);
    assert_eq!(parsed, image);

    assert_eq!(
        parsed.image_data.raw(DirectoryType::Certificate),
        Some(&certificate[..])
    );
    assert_eq!(&bytes[0x400..0x428], &certificate[..]);
    assert_eq!(parsed.trailing_data.as_deref(), Some(&[1u8, 2, 3][..]));
}

#[test]
fn test_nonzero_gap_is_preserved() {
    let mut bytes = two_section_image().to_bytes().unwrap();
    // Section headers end at 0x1D8; the first section starts at 0x200.
    bytes[0x1F0] = 0x55;

    let parsed = assert_round_trip(&bytes);
    let table = parsed.section_table.as_ref().unwrap();
    let preamble = table.section(0).unwrap().preamble.as_ref().unwrap();
    assert_eq!(preamble.len(), 0x28);
    assert_eq!(preamble[0x18], 0x55);
    assert!(table.section(1).unwrap().preamble.is_none());
}

#[test]
fn test_raw_only_parse_round_trips() {
    let image = ImageBuilder::new()
        .header_directory(
            DirectoryType::BoundImport,
            DirectoryPayload::BoundImport(bound_table()),
        )
        .add_section(".text", vec![0xC3], TEXT)
        .build()
        .unwrap();
    let bytes = image.to_bytes().unwrap();

    let options = ParseOptions::new().decode_directories(false);
    let parsed = peimage::parse_with(&bytes, &options).unwrap();
    assert!(parsed.image_data.bound_imports().is_none());
    assert!(parsed.image_data.raw(DirectoryType::BoundImport).is_some());
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
}

#[test]
fn test_inconsistent_images_fail_to_assemble() {
    let base = ImageBuilder::new()
        .header_directory(
            DirectoryType::BoundImport,
            DirectoryPayload::BoundImport(bound_table()),
        )
        .add_section(".text", vec![0xC3; 0x10], TEXT)
        .certificate_table(vec![0x30; 0x10])
        .build()
        .unwrap();

    let mut image = base.clone();
    image.section_table.as_mut().unwrap().remove_section(0);
    assert!(matches!(image.to_bytes(), Err(Error::MissingSectionData(0))));

    let mut image = base.clone();
    image
        .section_table
        .as_mut()
        .unwrap()
        .section_mut(0)
        .unwrap()
        .data
        .truncate(4);
    assert!(matches!(
        image.to_bytes(),
        Err(Error::SectionSizeMismatch { index: 0, actual: 4, .. })
    ));

    let mut image = base.clone();
    image.section_table.as_mut().unwrap().section_mut(0).unwrap().preamble = Some(vec![1; 3]);
    assert!(matches!(image.to_bytes(), Err(Error::PreambleMismatch { actual: 3, .. })));

    let mut image = base.clone();
    image.image_data.remove(DirectoryType::Certificate);
    assert!(matches!(
        image.to_bytes(),
        Err(Error::MissingDirectory(DirectoryType::Certificate))
    ));

    let mut image = base;
    let mut bigger = bound_table();
    bigger.imports.push(BoundImport::new(0x4444, "ADVAPI32.dll"));
    bigger.assign_name_offsets();
    image
        .image_data
        .put(DirectoryType::BoundImport, DirectoryPayload::BoundImport(bigger));
    let err = image.to_bytes().unwrap_err();
    assert!(matches!(
        err,
        Error::DirectoryOverflow {
            directory: DirectoryType::BoundImport,
            declared: 56,
            ..
        }
    ));
    assert!(!err.is_recoverable());
}

#[test]
fn test_truncated_section_is_fatal() {
    let bytes = two_section_image().to_bytes().unwrap();
    let err = Image::parse(&bytes[..0x500]).unwrap_err();
    assert!(matches!(err, Error::EndOfData { .. }));
    assert!(!err.is_recoverable());
}

#[test]
fn test_file_round_trip() {
    let image = two_section_image();
    let path = std::env::temp_dir().join(format!("peimage-{}.exe", std::process::id()));
    image.write_to_file(&path).unwrap();
    let loaded = Image::from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, image);
}

#[test]
fn test_summary() {
    let summary = two_section_image().summary();
    assert!(summary.is_pe);
    assert_eq!(summary.machine, Some(MachineType::Amd64));
    assert_eq!(summary.sections.len(), 2);
    let text = summary.to_string();
    assert!(text.starts_with("PE32+ image, machine Amd64"));
    assert!(text.contains(".text"));
    assert!(text.contains(".data"));
}
