//! Benchmarks for parsing and reassembling images.
//!
//! The input is built in memory so the benchmark needs no sample files: two
//! code and data sections, a resource section, bound imports in the header
//! area and an overlay.

extern crate peimage;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use peimage::section::characteristics;
use peimage::{
    BoundImport, BoundImportTable, DirectoryPayload, DirectoryType, Image, ImageBuilder,
    ResourceDirectory, ResourceId,
};
use std::hint::black_box;

fn sample_image() -> Vec<u8> {
    let mut bound = BoundImportTable {
        imports: vec![
            BoundImport::new(1, "KERNEL32.dll"),
            BoundImport::new(2, "USER32.dll"),
        ],
    };
    bound.assign_name_offsets();

    let mut resources = ResourceDirectory::default();
    for id in 1..=32 {
        resources.add_data(
            &[ResourceId::Id(6), ResourceId::Id(id), ResourceId::Id(1033)],
            vec![id as u8; 0x40],
        );
    }

    ImageBuilder::new()
        .header_directory(DirectoryType::BoundImport, DirectoryPayload::BoundImport(bound))
        .add_section(
            ".text",
            vec![0xCC; 0x10000],
            characteristics::CODE | characteristics::EXECUTE | characteristics::READ,
        )
        .add_section(
            ".data",
            vec![0x11; 0x4000],
            characteristics::INITIALIZED_DATA | characteristics::READ | characteristics::WRITE,
        )
        .add_directory_section(
            ".rsrc",
            DirectoryType::Resource,
            DirectoryPayload::Resource(resources),
            characteristics::INITIALIZED_DATA | characteristics::READ,
        )
        .trailing_data(vec![0x5A; 0x1000])
        .build()
        .and_then(|image| image.to_bytes())
        .expect("Failed to build sample image")
}

/// Parse alone, then parse followed by assembly.
fn bench_roundtrip(c: &mut Criterion) {
    let data = sample_image();

    let mut group = c.benchmark_group("image");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("parse", |b| {
        b.iter(|| {
            let image = Image::parse(black_box(&data)).unwrap();
            black_box(image)
        });
    });
    group.bench_function("parse_assemble", |b| {
        b.iter(|| {
            let image = Image::parse(black_box(&data)).unwrap();
            black_box(image.to_bytes().unwrap())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_roundtrip,);
criterion_main!(benches);
