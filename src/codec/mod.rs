//! Endian-aware byte stream primitives shared by every decoder in the crate.

mod reader;
mod writer;

pub use binrw::Endian;
pub use reader::{read_bits, ByteReader};
pub use writer::ByteWriter;
