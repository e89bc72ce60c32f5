pub mod codec;
pub mod error;
pub mod package;
pub mod texture;

pub use error::{Error, Result};
pub use package::Package;
pub use package::header::PackageHeader;
pub use package::index::{CompressionKind, IndexEntry, IndexSchema, TGI};
pub use package::resource::{CasPartResource, GenericResource, GeomChunk, RcolResource, Resource, ResourceRegistry, TypedResource};
pub use texture::{DdsImage, RgbaImage, RleTexture};
