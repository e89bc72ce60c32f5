//! RLE2 textures, their DDS form and DXT5 decompression.

pub mod dds;
pub mod dxt;
pub mod rle;

pub use dds::{DdsHeader, DdsImage, DdsPixelFormat, Tile};
pub use rle::{MipHeader, RgbaImage, RleHeader, RleTexture, RleVersion};
