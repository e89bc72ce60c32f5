pub mod header;
pub mod index;
pub mod resource;

use header::PackageHeader;
use index::{IndexEntry, IndexSchema, SharedFields, TGI};
use resource::{CasPartResource, RcolResource, ResourceRegistry, TypedResource};

use std::borrow::Cow;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, trace};
use rayon::prelude::*;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

/// Zlib stream header written at the default compression level.
const ZLIB_MAGIC: [u8; 2] = [0x78, 0x9C];

/// An opened DBPF package.
///
/// The raw bytes and the index are immutable once opened, so a package can be
/// shared between threads and read from concurrently.
#[derive(Debug, Clone)]
pub struct Package {
    pub header: PackageHeader,
    pub schema: IndexSchema,
    pub entries: Vec<IndexEntry>,
    data: Arc<[u8]>,
}

impl Package {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data: Arc<[u8]> = data.into();
        if data.len() < PackageHeader::SIZE {
            return Err(Error::format(format!(
                "Wrong header size. Got {} expected {}",
                data.len(),
                PackageHeader::SIZE
            )));
        }

        let header = PackageHeader::read(&mut Cursor::new(&data[..PackageHeader::SIZE]))?;
        if !header.is_valid() {
            return Err(Error::format(format!(
                "Invalid DBPF signature {:02X?}",
                header.magic
            )));
        }
        if header.index_count < 0 || header.index_position < 0 {
            return Err(Error::format(format!(
                "Invalid package header: index count {} at position {}",
                header.index_count, header.index_position
            )));
        }

        let mut reader = ByteReader::new(&data);
        reader.seek(header.index_position as usize)?;
        let schema = IndexSchema::new(reader.read_u32()?);
        let shared = SharedFields::read(schema, &mut reader)?;

        // Sanity check for index_count to prevent excessive pre-allocation
        let index_count = header.index_count as usize;
        if index_count.saturating_mul(schema.record_size()) > reader.remaining() {
            return Err(Error::format(format!(
                "Invalid package header: {} index entries do not fit in {} remaining bytes",
                index_count,
                reader.remaining()
            )));
        }

        let mut entries = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            entries.push(IndexEntry::read(&shared, &mut reader)?);
        }

        debug!(
            "Opened package: {} entries, index flags 0x{:X}, index at 0x{:08X}",
            entries.len(),
            schema.flags,
            header.index_position
        );

        Ok(Self {
            header,
            schema,
            entries,
            data,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// First entry with the given key, in index order.
    pub fn find(&self, tgi: &TGI) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.tgi == *tgi)
    }

    /// Stored bytes of an entry, inflated when the entry is zlib compressed.
    pub fn read_raw_resource(&self, entry: &IndexEntry) -> Result<Cow<'_, [u8]>> {
        let start = entry.offset as usize;
        let size = entry.size() as usize;
        if start.saturating_add(size) > self.data.len() {
            return Err(Error::Bounds {
                needed_bits: size.saturating_mul(8),
                remaining: self.data.len().saturating_sub(start),
                position: start,
                length: self.data.len(),
            });
        }
        let buf = &self.data[start..start + size];

        if !(entry.is_compressed() && entry.compression == IndexEntry::ZLIB) {
            return Ok(Cow::Borrowed(buf));
        }

        if buf.len() < 2 || buf[..2] != ZLIB_MAGIC {
            return Err(Error::format(format!(
                "Resource {} is flagged as zlib but starts with {:02X?}",
                entry.tgi,
                &buf[..buf.len().min(2)]
            )));
        }

        let memsize = entry.memsize as usize;
        // DEFLATE cannot expand by more than ~1032:1.
        let mut decompressed = Vec::with_capacity(memsize.min(size.saturating_mul(1032)));
        ZlibDecoder::new(buf)
            .take(memsize as u64 + 1)
            .read_to_end(&mut decompressed)?;

        if decompressed.len() != memsize {
            return Err(Error::format(format!(
                "Decompressed size mismatch for resource {}: expected {}, got {}",
                entry.tgi,
                memsize,
                decompressed.len()
            )));
        }
        trace!("Inflated {} from {} to {} bytes", entry.tgi, size, memsize);
        Ok(Cow::Owned(decompressed))
    }

    /// Bytes of the resource with the given key, or `None` when the package lacks it.
    pub fn resource_bytes(&self, tgi: &TGI) -> Result<Option<Cow<'_, [u8]>>> {
        match self.find(tgi) {
            Some(entry) => self.read_raw_resource(entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn read_resource(&self, entry: &IndexEntry) -> Result<TypedResource> {
        self.read_resource_with(entry, ResourceRegistry::global())
    }

    pub fn read_resource_with(
        &self,
        entry: &IndexEntry,
        registry: &ResourceRegistry,
    ) -> Result<TypedResource> {
        let data = self.read_raw_resource(entry)?;
        registry.decode(entry.tgi.res_type, &data)
    }

    /// Decoded resource with the given key, or `None` when the package lacks it.
    pub fn resource(&self, tgi: &TGI) -> Result<Option<TypedResource>> {
        match self.find(tgi) {
            Some(entry) => self.read_resource(entry).map(Some),
            None => Ok(None),
        }
    }

    /// Follows the first mesh key of a CAS part LOD to its geometry container.
    ///
    /// `Ok(None)` means the key is valid but the mesh lives in another package.
    pub fn resolve_lod_mesh(
        &self,
        part: &CasPartResource,
        lod_index: usize,
    ) -> Result<Option<RcolResource>> {
        let keys = part.mesh_keys(lod_index)?;
        let key = keys.first().ok_or_else(|| {
            Error::format(format!("LOD {lod_index} of CAS part has no mesh keys"))
        })?;
        match self.resource_bytes(key)? {
            Some(data) => RcolResource::parse(&data).map(Some),
            None => Ok(None),
        }
    }

    pub fn write<P: AsRef<Path>>(output_path: P, resources: &[(TGI, Vec<u8>)], compress: bool) -> Result<()> {
        let bytes = Self::build(resources, compress)?;
        let mut file = std::fs::File::create(output_path)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Lays out a complete package: header, resources in the given order, index.
    pub fn build(resources: &[(TGI, Vec<u8>)], compress: bool) -> Result<Vec<u8>> {
        // Parallel compression
        let payloads: Vec<(Cow<'_, [u8]>, bool)> = resources
            .par_iter()
            .map(|(_, raw)| -> Result<(Cow<'_, [u8]>, bool)> {
                if !compress {
                    return Ok((Cow::Borrowed(raw.as_slice()), false));
                }
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(raw)?;
                let compressed = encoder.finish()?;
                if compressed.len() < raw.len() {
                    Ok((Cow::Owned(compressed), true))
                } else {
                    Ok((Cow::Borrowed(raw.as_slice()), false))
                }
            })
            .collect::<Result<_>>()?;

        let mut writer = ByteWriter::new();
        writer.write_bytes(&[0u8; PackageHeader::SIZE]);

        let mut entries = Vec::with_capacity(resources.len());
        for ((tgi, raw), (payload, compressed)) in resources.iter().zip(&payloads) {
            let offset = to_i32(writer.position(), "resource offset")? as u32;
            writer.write_bytes(payload);
            let filesize = to_i32(payload.len(), "resource size")? as u32;
            entries.push(IndexEntry {
                tgi: *tgi,
                offset,
                filesize: if *compressed { filesize | IndexEntry::COMPRESSED_FLAG } else { filesize },
                memsize: to_i32(raw.len(), "resource size")? as u32,
                compression: if *compressed { IndexEntry::ZLIB } else { 0 },
                committed: 1,
            });
        }

        let shared = shared_fields(&entries);
        let index_position = writer.position();
        shared.write(&mut writer);
        for entry in &entries {
            entry.write(&shared, &mut writer);
        }
        let index_size = writer.position() - index_position;

        let header = PackageHeader {
            index_count: to_i32(entries.len(), "index count")?,
            index_size: to_i32(index_size, "index size")?,
            index_position: to_i32(index_position, "index position")?,
            ..PackageHeader::default()
        };
        let mut header_bytes = Cursor::new(Vec::with_capacity(PackageHeader::SIZE));
        header.write(&mut header_bytes)?;

        writer.seek(0)?;
        writer.write_bytes(header_bytes.get_ref());
        Ok(writer.into_inner())
    }
}

fn to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::format(format!("{what} {value} does not fit the package format")))
}

/// Key words every entry agrees on are written once in the index header.
fn shared_fields(entries: &[IndexEntry]) -> SharedFields {
    let Some(first) = entries.first() else {
        return SharedFields::default();
    };
    let common = |word: fn(&TGI) -> u32| -> Option<u32> {
        let value = word(&first.tgi);
        entries.iter().all(|e| word(&e.tgi) == value).then_some(value)
    };
    SharedFields {
        res_type: common(|t| t.res_type),
        res_group: common(|t| t.res_group),
        instance_hi: common(|t| (t.instance >> 32) as u32),
        instance_lo: common(|t| t.instance as u32),
    }
}
