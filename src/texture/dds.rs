use std::io::Cursor;

use binrw::{binrw, BinReaderExt, BinWriterExt};

use crate::error::{Error, Result};

pub const DDSD_CAPS: u32 = 0x1;
pub const DDSD_HEIGHT: u32 = 0x2;
pub const DDSD_WIDTH: u32 = 0x4;
pub const DDSD_PIXELFORMAT: u32 = 0x1000;
pub const DDSD_MIPMAPCOUNT: u32 = 0x20000;
pub const DDSD_LINEARSIZE: u32 = 0x80000;

pub const DDPF_FOURCC: u32 = 0x4;

pub const DDSCAPS_COMPLEX: u32 = 0x8;
pub const DDSCAPS_TEXTURE: u32 = 0x1000;
pub const DDSCAPS_MIPMAP: u32 = 0x400000;

pub const DXT5: [u8; 4] = *b"DXT5";

/// Bytes in one compressed 4x4 tile: an alpha block then a colour block.
pub const TILE_SIZE: usize = 16;

pub type Tile = [u8; TILE_SIZE];

/// Size of `level` for a `width` x `height` image; never smaller than 1x1.
pub fn mip_dimensions(width: u32, height: u32, level: usize) -> (u32, u32) {
    let shrink = |v: u32| v.checked_shr(level as u32).unwrap_or(0).max(1);
    (shrink(width), shrink(height))
}

/// Tiles across and down a mip level.
pub fn tile_grid(width: u32, height: u32, level: usize) -> (usize, usize) {
    let (w, h) = mip_dimensions(width, height, level);
    (w.div_ceil(4) as usize, h.div_ceil(4) as usize)
}

pub fn tile_count(width: u32, height: u32, level: usize) -> usize {
    let (across, down) = tile_grid(width, height, level);
    across * down
}

#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct DdsPixelFormat {
    pub size: u32,
    pub flags: u32,
    pub four_cc: [u8; 4],
    pub rgb_bit_count: u32,
    pub r_mask: u32,
    pub g_mask: u32,
    pub b_mask: u32,
    pub a_mask: u32,
}

/// The 128-byte DDS prologue, magic included.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(little, magic = b"DDS ")]
pub struct DdsHeader {
    pub size: u32,
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mip_map_count: u32,
    pub reserved1: [u32; 11],
    pub pixel_format: DdsPixelFormat,
    pub caps: u32,
    pub caps2: u32,
    pub caps3: u32,
    pub caps4: u32,
    pub reserved2: u32,
}

impl DdsHeader {
    pub const SIZE: usize = 128;

    /// Header for a DXT5 surface with `mip_count` levels.
    pub fn dxt5(width: u32, height: u32, mip_count: u32) -> Self {
        let mut caps = DDSCAPS_TEXTURE;
        if mip_count > 1 {
            caps |= DDSCAPS_COMPLEX | DDSCAPS_MIPMAP;
        }
        Self {
            size: 124,
            flags: DDSD_CAPS
                | DDSD_HEIGHT
                | DDSD_WIDTH
                | DDSD_PIXELFORMAT
                | DDSD_MIPMAPCOUNT
                | DDSD_LINEARSIZE,
            height,
            width,
            pitch_or_linear_size: (tile_count(width, height, 0) * TILE_SIZE) as u32,
            depth: 0,
            mip_map_count: mip_count,
            reserved1: [0; 11],
            pixel_format: DdsPixelFormat {
                size: 32,
                flags: DDPF_FOURCC,
                four_cc: DXT5,
                rgb_bit_count: 0,
                r_mask: 0,
                g_mask: 0,
                b_mask: 0,
                a_mask: 0,
            },
            caps,
            caps2: 0,
            caps3: 0,
            caps4: 0,
            reserved2: 0,
        }
    }

    /// Levels stored in the file; a zero count means a single level.
    pub fn levels(&self) -> usize {
        (self.mip_map_count as usize).max(1)
    }

    pub fn read<R: std::io::Read + std::io::Seek>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_le()?)
    }

    pub fn write<W: std::io::Write + std::io::Seek>(&self, writer: &mut W) -> Result<()> {
        Ok(writer.write_le(self)?)
    }
}

/// A DXT5 surface split into per-level tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdsImage {
    pub header: DdsHeader,
    pub tiles: Vec<Vec<Tile>>,
}

impl DdsImage {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = DdsHeader::read(&mut cursor)?;
        if header.pixel_format.four_cc != DXT5 {
            return Err(Error::unsupported(format!(
                "DDS pixel format {:?}, only DXT5 is handled",
                String::from_utf8_lossy(&header.pixel_format.four_cc)
            )));
        }

        let mut rest = &data[DdsHeader::SIZE..];
        // Every level holds at least one tile.
        if header.levels() > rest.len() / TILE_SIZE {
            return Err(Error::format(format!(
                "DDS declares {} mip levels but holds {} bytes of tiles",
                header.levels(),
                rest.len()
            )));
        }
        let mut tiles = Vec::with_capacity(header.levels());
        for level in 0..header.levels() {
            let count = tile_count(header.width, header.height, level);
            let bytes = count.saturating_mul(TILE_SIZE);
            if bytes > rest.len() {
                return Err(Error::format(format!(
                    "DDS level {level} needs {bytes} bytes, {} left",
                    rest.len()
                )));
            }
            let (level_bytes, tail) = rest.split_at(bytes);
            tiles.push(level_bytes.chunks_exact(TILE_SIZE).map(to_tile).collect());
            rest = tail;
        }
        Ok(Self { header, tiles })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body: usize = self.tiles.iter().map(|level| level.len() * TILE_SIZE).sum();
        let mut cursor = Cursor::new(Vec::with_capacity(DdsHeader::SIZE + body));
        self.header.write(&mut cursor)?;
        let mut out = cursor.into_inner();
        for tile in self.tiles.iter().flatten() {
            out.extend_from_slice(tile);
        }
        Ok(out)
    }
}

fn to_tile(bytes: &[u8]) -> Tile {
    let mut tile = [0u8; TILE_SIZE];
    tile.copy_from_slice(bytes);
    tile
}
