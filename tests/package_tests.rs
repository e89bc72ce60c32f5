use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use s4pi_assets::codec::ByteWriter;
use s4pi_assets::package::index::SharedFields;
use s4pi_assets::{CompressionKind, Error, IndexEntry, IndexSchema, Package, PackageHeader, TypedResource, TGI};

/// Lays out a package by hand so tests can pick the index schema and entry fields.
fn assemble(shared: SharedFields, resources: &[(TGI, Vec<u8>, u32, u16)]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_bytes(&[0u8; PackageHeader::SIZE]);

    let mut entries = Vec::new();
    for (tgi, payload, memsize, compression) in resources {
        let offset = w.position() as u32;
        w.write_bytes(payload);
        let mut filesize = payload.len() as u32;
        if *compression != 0 {
            filesize |= IndexEntry::COMPRESSED_FLAG;
        }
        entries.push(IndexEntry {
            tgi: *tgi,
            offset,
            filesize,
            memsize: *memsize,
            compression: *compression,
            committed: 1,
        });
    }

    let index_position = w.position();
    shared.write(&mut w);
    for entry in &entries {
        entry.write(&shared, &mut w);
    }
    let header = PackageHeader {
        index_count: entries.len() as i32,
        index_size: (w.position() - index_position) as i32,
        index_position: index_position as i32,
        ..PackageHeader::default()
    };
    let mut header_bytes = Cursor::new(Vec::new());
    header.write(&mut header_bytes).unwrap();
    w.seek(0).unwrap();
    w.write_bytes(header_bytes.get_ref());
    w.into_inner()
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_every_index_schema() {
    let base = TGI::new(0x11111111, 0x22222222, 0x33333333_44444444);
    for flags in 0..16u32 {
        let schema = IndexSchema::new(flags);
        let bump = |flag: u32, step: u64| if schema.has(flag) { 0 } else { step };
        let other = TGI::new(
            base.res_type + bump(IndexSchema::CONSTANT_TYPE, 1) as u32,
            base.res_group + bump(IndexSchema::CONSTANT_GROUP, 1) as u32,
            base.instance
                + bump(IndexSchema::CONSTANT_INSTANCE_HI, 1 << 32)
                + bump(IndexSchema::CONSTANT_INSTANCE_LO, 1),
        );
        let shared = SharedFields {
            res_type: schema.has(IndexSchema::CONSTANT_TYPE).then_some(base.res_type),
            res_group: schema.has(IndexSchema::CONSTANT_GROUP).then_some(base.res_group),
            instance_hi: schema.has(IndexSchema::CONSTANT_INSTANCE_HI).then_some((base.instance >> 32) as u32),
            instance_lo: schema.has(IndexSchema::CONSTANT_INSTANCE_LO).then_some(base.instance as u32),
        };
        let bytes = assemble(
            shared,
            &[(base, b"first".to_vec(), 5, 0), (other, b"second".to_vec(), 6, 0)],
        );

        let pkg = Package::from_bytes(bytes).unwrap();
        assert_eq!(pkg.schema.flags, flags);
        assert_eq!(
            pkg.header.index_size as usize,
            schema.header_size() + 2 * schema.record_size(),
            "flags {flags:#X}"
        );
        assert_eq!(pkg.entries[0].tgi, base);
        assert_eq!(pkg.entries[1].tgi, other);
        assert_eq!(&*pkg.resource_bytes(&other).unwrap().unwrap(), b"second");
    }
}

#[test]
fn test_build_then_open() {
    let resources = vec![
        (TGI::new(0x00B2D882, 0, 0x1), b"alpha".to_vec()),
        (TGI::new(0x00B2D882, 0, 0x2), b"beta".to_vec()),
        (TGI::new(0x220557DA, 0, 0x3), Vec::new()),
    ];
    let bytes = Package::build(&resources, false).unwrap();
    let pkg = Package::from_bytes(bytes).unwrap();

    assert!(pkg.header.is_valid());
    assert_eq!(pkg.header.major, 2);
    assert_eq!(pkg.header.minor, 1);
    assert_eq!(pkg.entries.len(), 3);
    // Group and instance-high agree across entries; type and instance-low do not.
    assert_eq!(
        pkg.schema.flags,
        IndexSchema::CONSTANT_GROUP | IndexSchema::CONSTANT_INSTANCE_HI
    );
    for (tgi, data) in &resources {
        let entry = pkg.find(tgi).unwrap();
        assert!(!entry.is_compressed());
        assert_eq!(entry.memsize as usize, data.len());
        assert_eq!(&*pkg.read_raw_resource(entry).unwrap(), data.as_slice());
    }
    assert_eq!(pkg.entries[0].offset as usize, PackageHeader::SIZE);
}

#[test]
fn test_single_entry_shares_every_field() {
    let bytes = Package::build(&[(TGI::new(1, 2, 3), vec![9; 10])], false).unwrap();
    let pkg = Package::from_bytes(bytes).unwrap();
    assert_eq!(pkg.schema.flags, 0x0F);
    assert_eq!(pkg.schema.record_size(), 16);
}

#[test]
fn test_shared_instance_low() {
    let resources = vec![
        (TGI::new(0x00B2D882, 7, 0x0000_0001_0000_0042), b"one".to_vec()),
        (TGI::new(0x00B2D882, 7, 0x0000_0002_0000_0042), b"two".to_vec()),
    ];
    let pkg = Package::from_bytes(Package::build(&resources, false).unwrap()).unwrap();
    assert_eq!(
        pkg.schema.flags,
        IndexSchema::CONSTANT_TYPE | IndexSchema::CONSTANT_GROUP | IndexSchema::CONSTANT_INSTANCE_LO
    );
    assert_eq!(pkg.schema.record_size(), 20);
    for (tgi, data) in &resources {
        assert_eq!(pkg.resource_bytes(tgi).unwrap().unwrap().as_ref(), data.as_slice());
    }
}

#[test]
fn test_compressed_build_round_trip() {
    let text: Vec<u8> = b"the quick brown fox ".iter().cycle().take(4096).copied().collect();
    let tiny = vec![0x42u8];
    let resources = vec![(TGI::new(1, 0, 1), text.clone()), (TGI::new(1, 0, 2), tiny.clone())];
    let pkg = Package::from_bytes(Package::build(&resources, true).unwrap()).unwrap();

    let big = &pkg.entries[0];
    assert!(big.is_compressed());
    assert_eq!(big.compression, IndexEntry::ZLIB);
    assert_eq!(big.compression_kind(), CompressionKind::Zlib);
    assert!((big.size() as usize) < text.len());
    assert_eq!(&pkg.data()[big.offset as usize..big.offset as usize + 2], &[0x78, 0x9C]);
    assert_eq!(&*pkg.read_raw_resource(big).unwrap(), text.as_slice());

    // Compression that does not shrink the payload is skipped.
    let small = &pkg.entries[1];
    assert!(!small.is_compressed());
    assert_eq!(small.compression, 0);
    assert_eq!(&*pkg.read_raw_resource(small).unwrap(), tiny.as_slice());
}

#[test]
fn test_zlib_magic_is_checked() {
    let mut payload = zlib(b"hello hello hello");
    payload[0] = 0x58;
    let bytes = assemble(SharedFields::default(), &[(TGI::new(1, 2, 3), payload, 17, IndexEntry::ZLIB)]);
    let pkg = Package::from_bytes(bytes).unwrap();
    assert!(matches!(pkg.read_raw_resource(&pkg.entries[0]), Err(Error::Format(_))));
}

#[test]
fn test_decompressed_size_mismatch() {
    let data = b"hello hello hello hello";
    for memsize in [data.len() as u32 - 1, data.len() as u32 + 1] {
        let bytes = assemble(
            SharedFields::default(),
            &[(TGI::new(1, 2, 3), zlib(data), memsize, IndexEntry::ZLIB)],
        );
        let pkg = Package::from_bytes(bytes).unwrap();
        let err = pkg.read_raw_resource(&pkg.entries[0]).unwrap_err();
        assert!(err.to_string().contains("Decompressed size mismatch"), "{err}");
    }
}

#[test]
fn test_other_compression_ids_return_stored_bytes() {
    let stored = vec![0x10, 0xFB, 0x00, 0x00, 0x04];
    let bytes = assemble(
        SharedFields::default(),
        &[(TGI::new(1, 2, 3), stored.clone(), 64, 0xFFFF)],
    );
    let pkg = Package::from_bytes(bytes).unwrap();
    let entry = &pkg.entries[0];
    assert!(entry.is_compressed());
    assert_eq!(entry.compression_kind(), CompressionKind::RefPack);
    assert_eq!(&*pkg.read_raw_resource(entry).unwrap(), stored.as_slice());
}

#[test]
fn test_absent_key_is_not_an_error() {
    let pkg = Package::from_bytes(Package::build(&[(TGI::new(1, 2, 3), vec![1])], false).unwrap()).unwrap();
    let missing = TGI::new(1, 2, 4);
    assert!(pkg.find(&missing).is_none());
    assert!(pkg.resource_bytes(&missing).unwrap().is_none());
    assert!(pkg.resource(&missing).unwrap().is_none());
}

#[test]
fn test_unknown_type_decodes_as_generic() {
    let pkg = Package::from_bytes(Package::build(&[(TGI::new(0xDEADBEEF, 0, 7), vec![1, 2, 3])], false).unwrap()).unwrap();
    match pkg.resource(&TGI::new(0xDEADBEEF, 0, 7)).unwrap() {
        Some(TypedResource::Generic(generic)) => assert_eq!(generic.data, vec![1, 2, 3]),
        other => panic!("expected generic resource, got {:?}", other),
    }
}

#[test]
fn test_short_header() {
    let err = Package::from_bytes(vec![b'D', b'B', b'P', b'F', 2, 0]).unwrap_err();
    assert!(matches!(err, Error::Format(_)));
    assert!(!err.is_recoverable());
}

#[test]
fn test_bad_magic() {
    let mut bytes = Package::build(&[(TGI::new(1, 2, 3), vec![1])], false).unwrap();
    bytes[..4].copy_from_slice(b"DBPP");
    let err = Package::from_bytes(bytes).unwrap_err();
    assert!(err.to_string().contains("Invalid DBPF signature"), "{err}");
}

#[test]
fn test_index_count_larger_than_file() {
    let mut bytes = Package::build(&[(TGI::new(1, 2, 3), vec![1])], false).unwrap();
    bytes[36..40].copy_from_slice(&1_000_000i32.to_le_bytes());
    assert!(matches!(Package::from_bytes(bytes), Err(Error::Format(_))));
}

#[test]
fn test_index_position_past_end() {
    let mut bytes = Package::build(&[(TGI::new(1, 2, 3), vec![1])], false).unwrap();
    bytes[64..68].copy_from_slice(&0x7FFF_0000i32.to_le_bytes());
    assert!(matches!(Package::from_bytes(bytes), Err(Error::Bounds { .. })));
}

#[test]
fn test_entry_past_end_of_file() {
    let bytes = assemble(SharedFields::default(), &[(TGI::new(1, 2, 3), vec![1, 2], 2, 0)]);
    let mut pkg = Package::from_bytes(bytes).unwrap();
    pkg.entries[0].offset = 0x00FF_FFFF;
    assert!(matches!(pkg.read_raw_resource(&pkg.entries[0]), Err(Error::Bounds { .. })));
}

#[test]
fn test_write_and_open_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.package");
    let resources = vec![(TGI::new(0x3453CF95, 0, 0xABCDEF), vec![7u8; 300])];
    Package::write(&path, &resources, true).unwrap();

    let pkg = Package::open(&path).unwrap();
    assert_eq!(pkg.entries.len(), 1);
    assert_eq!(&*pkg.resource_bytes(&resources[0].0).unwrap().unwrap(), resources[0].1.as_slice());
}

#[test]
fn test_concurrent_reads() {
    let resources: Vec<_> = (0..32u64)
        .map(|i| (TGI::new(0x1234, 0, i), vec![i as u8; 64 + i as usize]))
        .collect();
    let pkg = Package::from_bytes(Package::build(&resources, true).unwrap()).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for (tgi, data) in &resources {
                    assert_eq!(&*pkg.resource_bytes(tgi).unwrap().unwrap(), data.as_slice());
                }
            });
        }
    });
}
