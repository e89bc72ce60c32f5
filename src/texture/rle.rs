use std::iter;

use log::trace;

use super::dds::{self, DdsHeader, DdsImage, Tile, TILE_SIZE};
use super::dxt;
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::package::resource::Resource;

const FULL_TRANSPARENT_ALPHA: [u8; 8] = [0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const FULL_TRANSPARENT_WHITE: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00];
const FULL_OPAQUE_ALPHA: [u8; 8] = [0x00, 0x05, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

const OP_TRANSPARENT: u16 = 0;
const OP_TILE: u16 = 1;
const OP_OPAQUE: u16 = 2;
const MAX_RUN: usize = 0x3FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RleVersion {
    Rle2,
    /// Specular maps; carries a fifth lane per level.
    Rles,
}

impl RleVersion {
    pub const RLE2: u32 = 0x32454C52;
    pub const RLES: u32 = 0x53454C52;

    fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            Self::RLE2 => Ok(RleVersion::Rle2),
            Self::RLES => Ok(RleVersion::Rles),
            other => Err(Error::unsupported(format!(
                "RLE texture version {:?}",
                String::from_utf8_lossy(&other.to_le_bytes())
            ))),
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            RleVersion::Rle2 => Self::RLE2,
            RleVersion::Rles => Self::RLES,
        }
    }

    fn mip_header_size(self) -> usize {
        match self {
            RleVersion::Rle2 => 20,
            RleVersion::Rles => 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleHeader {
    pub four_cc: [u8; 4],
    pub version: RleVersion,
    pub width: u16,
    pub height: u16,
    pub mip_count: u16,
}

impl RleHeader {
    pub const SIZE: usize = 16;
}

/// Start offsets of one level's command words and data lanes.
///
/// Lane 0 carries alpha endpoints (2 bytes per tile), lane 1 alpha codes
/// (6 bytes), lane 2 colour endpoints (4 bytes) and lane 3 colour codes
/// (4 bytes). Fields are in on-disk order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MipHeader {
    pub command_offset: u32,
    pub lane2: u32,
    pub lane3: u32,
    pub lane0: u32,
    pub lane1: u32,
    /// RLES only.
    pub lane4: u32,
}

/// A decompressed level: row-major RGBA, four bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A run-length packed DXT5 texture.
#[derive(Debug, Clone)]
pub struct RleTexture {
    pub header: RleHeader,
    /// One header per level, then the end-of-data sentinel.
    pub mips: Vec<MipHeader>,
    raw_data: Vec<u8>,
}

impl RleTexture {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let four_cc = r.read_fourcc()?;
        if four_cc != dds::DXT5 {
            return Err(Error::format(format!(
                "RLE texture signature {:02X?}, expected DXT5",
                four_cc
            )));
        }
        let version = RleVersion::from_tag(r.read_u32()?)?;
        let width = r.read_u16()?;
        let height = r.read_u16()?;
        let mip_count = r.read_u16()?;
        let reserved = r.read_u16()?;
        if reserved != 0 {
            return Err(Error::format(format!("RLE texture reserved field is {reserved:#06X}")));
        }
        if mip_count == 0 {
            return Err(Error::format("RLE texture has no mip levels"));
        }

        let table = usize::from(mip_count) * version.mip_header_size();
        if table > r.remaining() {
            return Err(Error::format(format!(
                "RLE mip table of {mip_count} levels does not fit in {} bytes",
                r.remaining()
            )));
        }

        let mut mips = Vec::with_capacity(usize::from(mip_count) + 1);
        for _ in 0..mip_count {
            let mut mip = MipHeader {
                command_offset: r.read_u32()?,
                lane2: r.read_u32()?,
                lane3: r.read_u32()?,
                lane0: r.read_u32()?,
                lane1: r.read_u32()?,
                lane4: 0,
            };
            if version == RleVersion::Rles {
                mip.lane4 = r.read_u32()?;
            }
            mips.push(mip);
        }

        // Each lane of the last level ends where the next lane of level 0 starts.
        let first = mips[0];
        mips.push(MipHeader {
            command_offset: first.lane2,
            lane2: first.lane3,
            lane3: first.lane0,
            lane0: first.lane1,
            lane1: match version {
                RleVersion::Rle2 => data.len() as u32,
                RleVersion::Rles => first.lane4,
            },
            lane4: data.len() as u32,
        });

        Ok(Self {
            header: RleHeader {
                four_cc,
                version,
                width,
                height,
                mip_count,
            },
            mips,
            raw_data: data.to_vec(),
        })
    }

    pub fn width(&self) -> u32 {
        u32::from(self.header.width)
    }

    pub fn height(&self) -> u32 {
        u32::from(self.header.height)
    }

    pub fn mip_count(&self) -> usize {
        usize::from(self.header.mip_count)
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    /// Expands the command stream of one level into DXT5 tiles.
    ///
    /// The level must cover its whole tile grid; a short stream is an error.
    pub fn expand_level(&self, level: usize) -> Result<Vec<Tile>> {
        if self.header.version != RleVersion::Rle2 {
            return Err(Error::unsupported("only RLE2 textures expand to DXT5"));
        }
        if level >= self.mip_count() {
            return Err(Error::format(format!(
                "mip level {level} out of range ({} levels)",
                self.mip_count()
            )));
        }
        let (start, end) = (self.mips[level], self.mips[level + 1]);
        let data = self.raw_data.as_slice();
        let lane_at = |offset: u32| {
            let mut lane = ByteReader::new(data);
            lane.seek(offset as usize).map(|_| lane)
        };
        let mut commands = lane_at(start.command_offset)?;
        let mut lane0 = lane_at(start.lane0)?;
        let mut lane1 = lane_at(start.lane1)?;
        let mut lane2 = lane_at(start.lane2)?;
        let mut lane3 = lane_at(start.lane3)?;

        let expected = dds::tile_count(self.width(), self.height(), level);
        let command_words = (end.command_offset as usize).saturating_sub(start.command_offset as usize) / 2;
        let mut tiles: Vec<Tile> = Vec::with_capacity(expected.min(command_words.saturating_mul(MAX_RUN)));
        while commands.position() < end.command_offset as usize {
            let command = commands.read_u16()?;
            let op = command & 3;
            let count = usize::from(command >> 2);
            if tiles.len() + count > expected {
                return Err(Error::format(format!(
                    "mip level {level} expands past its {expected} tiles"
                )));
            }

            match op {
                OP_TRANSPARENT => {
                    let mut tile = [0u8; TILE_SIZE];
                    tile[..8].copy_from_slice(&FULL_TRANSPARENT_ALPHA);
                    tile[8..].copy_from_slice(&FULL_TRANSPARENT_WHITE);
                    tiles.extend(iter::repeat(tile).take(count));
                }
                OP_TILE => {
                    for _ in 0..count {
                        let mut tile = [0u8; TILE_SIZE];
                        tile[0..2].copy_from_slice(lane0.read_slice(2)?);
                        tile[2..8].copy_from_slice(lane1.read_slice(6)?);
                        tile[8..12].copy_from_slice(lane2.read_slice(4)?);
                        tile[12..16].copy_from_slice(lane3.read_slice(4)?);
                        tiles.push(tile);
                    }
                }
                OP_OPAQUE => {
                    for _ in 0..count {
                        let mut tile = [0u8; TILE_SIZE];
                        tile[..8].copy_from_slice(&FULL_OPAQUE_ALPHA);
                        tile[8..12].copy_from_slice(lane2.read_slice(4)?);
                        tile[12..16].copy_from_slice(lane3.read_slice(4)?);
                        tiles.push(tile);
                    }
                }
                _ => {
                    return Err(Error::format(format!(
                        "unsupported RLE operation {op} at offset {}",
                        commands.position() - 2
                    )));
                }
            }
        }

        let cursors = [
            ("command", commands.position(), end.command_offset),
            ("lane 0", lane0.position(), end.lane0),
            ("lane 1", lane1.position(), end.lane1),
            ("lane 2", lane2.position(), end.lane2),
            ("lane 3", lane3.position(), end.lane3),
        ];
        for (lane, at, want) in cursors {
            if at != want as usize {
                return Err(Error::format(format!(
                    "mip level {level}: {lane} cursor at {at}, next level starts at {want}"
                )));
            }
        }

        if tiles.len() != expected {
            return Err(Error::format(format!(
                "mip level {level} holds {} tiles, expected {expected}",
                tiles.len()
            )));
        }

        trace!("RLE level {level}: {} tiles", tiles.len());
        Ok(tiles)
    }

    pub fn to_dds_image(&self) -> Result<DdsImage> {
        let tiles = (0..self.mip_count())
            .map(|level| self.expand_level(level))
            .collect::<Result<Vec<_>>>()?;
        Ok(DdsImage {
            header: DdsHeader::dxt5(self.width(), self.height(), self.mip_count() as u32),
            tiles,
        })
    }

    /// The texture as a `.dds` byte stream.
    pub fn to_dds(&self) -> Result<Vec<u8>> {
        self.to_dds_image()?.to_bytes()
    }

    /// Decompresses one mip level.
    pub fn to_rgba(&self, level: usize) -> Result<RgbaImage> {
        let tiles = self.expand_level(level)?;
        let (width, height) = dds::mip_dimensions(self.width(), self.height(), level);
        Ok(RgbaImage {
            width,
            height,
            pixels: dxt::decode_dxt5(&tiles, width, height),
        })
    }

    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        self.to_rgba(0)
    }

    /// Packs a DXT5 surface into RLE2 form.
    pub fn encode_rle2(image: &DdsImage) -> Result<Self> {
        let width = u16::try_from(image.header.width)
            .map_err(|_| Error::unsupported(format!("RLE2 width {}", image.header.width)))?;
        let height = u16::try_from(image.header.height)
            .map_err(|_| Error::unsupported(format!("RLE2 height {}", image.header.height)))?;
        let mip_count = u16::try_from(image.tiles.len())
            .map_err(|_| Error::unsupported(format!("{} mip levels", image.tiles.len())))?;
        if mip_count == 0 {
            return Err(Error::format("DDS image has no mip levels"));
        }

        let levels: Vec<EncodedLevel> = image.tiles.iter().map(|tiles| EncodedLevel::new(tiles)).collect();

        // Regions follow the mip table in the order commands, lane 2, lane 3, lane 0, lane 1.
        let mut cursor = RleHeader::SIZE + levels.len() * RleVersion::Rle2.mip_header_size();
        let mut region_starts = |len: fn(&EncodedLevel) -> usize| -> Vec<usize> {
            levels
                .iter()
                .map(|level| {
                    let start = cursor;
                    cursor += len(level);
                    start
                })
                .collect()
        };
        let commands = region_starts(|l| l.commands.len());
        let lane2 = region_starts(|l| l.lanes[2].len());
        let lane3 = region_starts(|l| l.lanes[3].len());
        let lane0 = region_starts(|l| l.lanes[0].len());
        let lane1 = region_starts(|l| l.lanes[1].len());

        let mut w = ByteWriter::with_capacity(cursor, crate::codec::Endian::Little);
        w.write_fourcc(&dds::DXT5);
        w.write_u32(RleVersion::RLE2);
        w.write_u16(width);
        w.write_u16(height);
        w.write_u16(mip_count);
        w.write_u16(0);
        for i in 0..levels.len() {
            for offset in [commands[i], lane2[i], lane3[i], lane0[i], lane1[i]] {
                let offset = u32::try_from(offset)
                    .map_err(|_| Error::unsupported("RLE2 texture larger than 4 GiB"))?;
                w.write_u32(offset);
            }
        }
        for level in &levels {
            w.write_bytes(&level.commands);
        }
        for lane in [2, 3, 0, 1] {
            for level in &levels {
                w.write_bytes(&level.lanes[lane]);
            }
        }

        Self::parse(&w.into_inner())
    }
}

/// One level's command words and lane bytes before layout.
struct EncodedLevel {
    commands: Vec<u8>,
    lanes: [Vec<u8>; 4],
}

impl EncodedLevel {
    fn new(tiles: &[Tile]) -> Self {
        let mut level = Self {
            commands: Vec::new(),
            lanes: Default::default(),
        };
        let mut run: Option<(u16, usize)> = None;
        for tile in tiles {
            let op = level.push_tile(tile);
            run = match run {
                Some((current, count)) if current == op && count < MAX_RUN => Some((op, count + 1)),
                Some((current, count)) => {
                    level.push_command(current, count);
                    Some((op, 1))
                }
                None => Some((op, 1)),
            };
        }
        if let Some((op, count)) = run {
            level.push_command(op, count);
        }
        level
    }

    fn push_tile(&mut self, tile: &Tile) -> u16 {
        let (alpha, colour) = tile.split_at(8);
        if alpha == FULL_TRANSPARENT_ALPHA && colour == FULL_TRANSPARENT_WHITE {
            return OP_TRANSPARENT;
        }
        self.lanes[2].extend_from_slice(&colour[..4]);
        self.lanes[3].extend_from_slice(&colour[4..]);
        if alpha == FULL_OPAQUE_ALPHA {
            return OP_OPAQUE;
        }
        self.lanes[0].extend_from_slice(&alpha[..2]);
        self.lanes[1].extend_from_slice(&alpha[2..]);
        OP_TILE
    }

    fn push_command(&mut self, op: u16, count: usize) {
        let word = ((count as u16) << 2) | op;
        self.commands.extend_from_slice(&word.to_le_bytes());
    }
}

impl Resource for RleTexture {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(data)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.raw_data.clone())
    }
}
