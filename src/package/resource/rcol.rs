use std::collections::HashMap;
use std::sync::OnceLock;

use log::{trace, warn};

use super::{GeomChunk, Resource};
use crate::codec::ByteReader;
use crate::error::{Error, Result};
use crate::package::index::TGI;

/// A chunk whose tag has no registered decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueChunk {
    pub tag: [u8; 4],
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Chunk {
    Geom(GeomChunk),
    Opaque(OpaqueChunk),
}

impl Chunk {
    pub fn tag(&self) -> [u8; 4] {
        match self {
            Chunk::Geom(_) => GeomChunk::TAG,
            Chunk::Opaque(c) => c.tag,
        }
    }

    pub fn raw_data(&self) -> &[u8] {
        match self {
            Chunk::Geom(g) => g.raw_data(),
            Chunk::Opaque(c) => &c.data,
        }
    }

    pub fn as_geom(&self) -> Option<&GeomChunk> {
        match self {
            Chunk::Geom(g) => Some(g),
            Chunk::Opaque(_) => None,
        }
    }
}

pub type ChunkDecoder = fn(&[u8]) -> Result<Chunk>;

/// Maps 4-byte chunk tags to decoders. Unknown tags become [`OpaqueChunk`]s.
#[derive(Debug, Clone)]
pub struct ChunkRegistry {
    decoders: HashMap<[u8; 4], ChunkDecoder>,
}

impl Default for ChunkRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(GeomChunk::TAG, |data| Ok(Chunk::Geom(GeomChunk::parse(data)?)));
        registry
    }
}

impl ChunkRegistry {
    pub fn empty() -> Self {
        Self { decoders: HashMap::new() }
    }

    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ChunkRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::default)
    }

    pub fn register(&mut self, tag: [u8; 4], decoder: ChunkDecoder) -> Option<ChunkDecoder> {
        self.decoders.insert(tag, decoder)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Chunk> {
        if data.len() < 4 {
            return Err(Error::format(format!("RCOL chunk of {} bytes has no tag", data.len())));
        }
        let tag = [data[0], data[1], data[2], data[3]];
        match self.decoders.get(&tag) {
            Some(decoder) => decoder(data),
            None => Ok(Chunk::Opaque(OpaqueChunk { tag, data: data.to_vec() })),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RcolChunk {
    pub tgi: TGI,
    pub position: u32,
    pub chunk: Chunk,
}

/// RCOL (Resource Collection) container
#[derive(Debug, Clone)]
pub struct RcolResource {
    pub version: u32,
    pub public_chunks: i32,
    pub unused: u32,
    pub external_resources: Vec<TGI>,
    pub chunks: Vec<RcolChunk>,
    raw_data: Vec<u8>,
}

impl RcolResource {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with(data, ChunkRegistry::global())
    }

    pub fn parse_with(data: &[u8], registry: &ChunkRegistry) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let version = r.read_u32()?;
        let public_chunks = r.read_i32()?;
        let unused = r.read_u32()?;
        let count_resources = r.read_i32()?;
        let count_chunks = r.read_i32()?;

        if count_resources < 0 || count_chunks < 0 {
            return Err(Error::format("Invalid RCOL header: negative count"));
        }
        let (count_resources, count_chunks) = (count_resources as usize, count_chunks as usize);

        // Each chunk costs a key and an index pair, each resource a key.
        let needed = count_chunks
            .saturating_mul(24)
            .saturating_add(count_resources.saturating_mul(16));
        if needed > r.remaining() {
            return Err(Error::format("Invalid RCOL header: count too large for data size"));
        }

        let mut chunk_tgis = Vec::with_capacity(count_chunks);
        for _ in 0..count_chunks {
            chunk_tgis.push(TGI::read_itg(&mut r)?);
        }

        let mut external_resources = Vec::with_capacity(count_resources);
        for _ in 0..count_resources {
            external_resources.push(TGI::read_itg(&mut r)?);
        }

        let mut chunk_index = Vec::with_capacity(count_chunks);
        for _ in 0..count_chunks {
            let position = r.read_u32()?;
            let length = r.read_i32()?;
            chunk_index.push((position, length));
        }

        if count_chunks == 1 && chunk_index[0] == (0, 0) {
            let position = r.position();
            warn!("RCOL with an unset chunk index; using the remaining {} bytes", r.remaining());
            chunk_index[0] = (position as u32, r.remaining() as i32);
        }

        let mut chunks = Vec::with_capacity(count_chunks);
        for (tgi, (position, length)) in chunk_tgis.into_iter().zip(chunk_index) {
            if length < 0 {
                return Err(Error::format(format!("Invalid RCOL chunk length: {length}")));
            }
            let start = position as usize;
            let end = start + length as usize;
            if end > data.len() {
                return Err(Error::format(format!(
                    "RCOL chunk extends beyond data bounds: pos={position}, len={length}"
                )));
            }
            let chunk = registry.decode(&data[start..end])?;
            trace!(
                "RCOL chunk {} '{}' at {} ({} bytes)",
                tgi,
                String::from_utf8_lossy(&chunk.tag()),
                position,
                length
            );
            chunks.push(RcolChunk { tgi, position, chunk });
        }

        Ok(Self {
            version,
            public_chunks,
            unused,
            external_resources,
            chunks,
            raw_data: data.to_vec(),
        })
    }

    /// First GEOM chunk in the container.
    pub fn geom(&self) -> Option<&GeomChunk> {
        self.chunks.iter().find_map(|c| c.chunk.as_geom())
    }
}

impl Resource for RcolResource {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(data)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.raw_data.clone())
    }
}
