pub mod caspart;
pub mod geom;
pub mod rcol;

pub use caspart::{CasPartResource, CasTag, LodBlock, PackInfo, RegionOverride, TextureKeys};
pub use geom::{GeomChunk, VertexElement, VertexFormat};
pub use rcol::{Chunk, ChunkDecoder, ChunkRegistry, OpaqueChunk, RcolChunk, RcolResource};

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::Result;
use crate::texture::RleTexture;

pub trait Resource: std::fmt::Debug {
    fn from_bytes(data: &[u8]) -> Result<Self>
    where
        Self: Sized;
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// CAS part (0x034AEECB)
pub const CAS_PART: u32 = 0x034AEECB;
/// Geometry RCOL (0x015A1849)
pub const GEOM: u32 = 0x015A1849;
/// Other RCOL wrapped types: MODL, MLOD, MATD
pub const MODL: u32 = 0x01661233;
pub const MLOD: u32 = 0x01D10F34;
pub const MATD: u32 = 0x01D0E75D;
/// RLE2 image (0x3453CF95)
pub const RLE2_IMAGE: u32 = 0x3453CF95;
/// RLES specular image (0xBA856C78)
pub const RLES_IMAGE: u32 = 0xBA856C78;

/// A wrapper for unknown or generic resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericResource {
    pub data: Vec<u8>,
}

impl Resource for GenericResource {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self { data: data.to_vec() })
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

#[derive(Debug)]
pub enum TypedResource {
    CasPart(CasPartResource),
    Rcol(RcolResource),
    Texture(RleTexture),
    Generic(GenericResource),
}

impl TypedResource {
    /// Decodes `data` with the built-in decoder for `res_type`.
    pub fn from_bytes(res_type: u32, data: &[u8]) -> Result<Self> {
        ResourceRegistry::global().decode(res_type, data)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            TypedResource::CasPart(r) => r.to_bytes(),
            TypedResource::Rcol(r) => r.to_bytes(),
            TypedResource::Texture(r) => r.to_bytes(),
            TypedResource::Generic(r) => r.to_bytes(),
        }
    }

    pub fn as_cas_part(&self) -> Option<&CasPartResource> {
        match self {
            TypedResource::CasPart(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_rcol(&self) -> Option<&RcolResource> {
        match self {
            TypedResource::Rcol(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&RleTexture> {
        match self {
            TypedResource::Texture(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, TypedResource::Generic(_))
    }
}

pub type ResourceDecoder = fn(&[u8]) -> Result<TypedResource>;

/// Maps resource types to decoders. Unregistered types decode as [`GenericResource`].
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    decoders: HashMap<u32, ResourceDecoder>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(CAS_PART, |data| Ok(TypedResource::CasPart(CasPartResource::from_bytes(data)?)));
        for rcol_type in [GEOM, MODL, MLOD, MATD] {
            registry.register(rcol_type, |data| Ok(TypedResource::Rcol(RcolResource::from_bytes(data)?)));
        }
        for image_type in [RLE2_IMAGE, RLES_IMAGE] {
            registry.register(image_type, |data| Ok(TypedResource::Texture(RleTexture::from_bytes(data)?)));
        }
        registry
    }
}

impl ResourceRegistry {
    pub fn empty() -> Self {
        Self { decoders: HashMap::new() }
    }

    /// Shared registry holding the built-in decoders.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ResourceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::default)
    }

    /// Registers `decoder` for `res_type`, returning the decoder it replaces.
    pub fn register(&mut self, res_type: u32, decoder: ResourceDecoder) -> Option<ResourceDecoder> {
        self.decoders.insert(res_type, decoder)
    }

    pub fn is_known(&self, res_type: u32) -> bool {
        self.decoders.contains_key(&res_type)
    }

    pub fn decode(&self, res_type: u32, data: &[u8]) -> Result<TypedResource> {
        match self.decoders.get(&res_type) {
            Some(decoder) => decoder(data),
            None => Ok(TypedResource::Generic(GenericResource::from_bytes(data)?)),
        }
    }
}
