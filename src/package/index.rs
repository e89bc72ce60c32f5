use std::fmt;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::Result;

/// Resource key: type, group and instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TGI {
    pub res_type: u32,
    pub res_group: u32,
    pub instance: u64,
}

impl TGI {
    pub const fn new(res_type: u32, res_group: u32, instance: u64) -> Self {
        Self { res_type, res_group, instance }
    }

    /// Type, group, instance.
    pub fn read_tgi(reader: &mut ByteReader<'_>) -> Result<Self> {
        let res_type = reader.read_u32()?;
        let res_group = reader.read_u32()?;
        let instance = reader.read_u64()?;
        Ok(Self { res_type, res_group, instance })
    }

    /// Instance, type, group (RCOL key lists).
    pub fn read_itg(reader: &mut ByteReader<'_>) -> Result<Self> {
        let instance = reader.read_u64()?;
        let res_type = reader.read_u32()?;
        let res_group = reader.read_u32()?;
        Ok(Self { res_type, res_group, instance })
    }

    /// Instance, group, type (CAS part key table).
    pub fn read_igt(reader: &mut ByteReader<'_>) -> Result<Self> {
        let instance = reader.read_u64()?;
        let res_group = reader.read_u32()?;
        let res_type = reader.read_u32()?;
        Ok(Self { res_type, res_group, instance })
    }

    pub fn write_tgi(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.res_type);
        writer.write_u32(self.res_group);
        writer.write_u64(self.instance);
    }

    pub fn write_itg(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.instance);
        writer.write_u32(self.res_type);
        writer.write_u32(self.res_group);
    }

    pub fn write_igt(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.instance);
        writer.write_u32(self.res_group);
        writer.write_u32(self.res_type);
    }
}

impl fmt::Display for TGI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}:{:08X}:{:016X}", self.res_type, self.res_group, self.instance)
    }
}

impl std::str::FromStr for TGI {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(crate::Error::format(format!("expected type:group:instance, got {s:?}")));
        }
        let hex = |p: &str| p.trim_start_matches("0x").trim_start_matches("0X").to_owned();
        let bad = |e: std::num::ParseIntError| crate::Error::format(format!("invalid key {s:?}: {e}"));
        Ok(Self {
            res_type: u32::from_str_radix(&hex(parts[0]), 16).map_err(bad)?,
            res_group: u32::from_str_radix(&hex(parts[1]), 16).map_err(bad)?,
            instance: u64::from_str_radix(&hex(parts[2]), 16).map_err(bad)?,
        })
    }
}

/// Index flags: which key words are stored once in the index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSchema {
    pub flags: u32,
}

impl IndexSchema {
    pub const CONSTANT_TYPE: u32 = 0x01;
    pub const CONSTANT_GROUP: u32 = 0x02;
    pub const CONSTANT_INSTANCE_HI: u32 = 0x04;
    pub const CONSTANT_INSTANCE_LO: u32 = 0x08;

    /// Key words plus offset, file size, mem size, compression and committed.
    pub const FIELD_COUNT: u32 = 9;
    /// Compression and committed share a single word.
    const WORDS_PER_RECORD: u32 = 8;

    pub fn new(flags: u32) -> Self {
        Self { flags }
    }

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// Number of key fields stored once in the index header.
    pub fn shared_field_count(&self) -> u32 {
        (self.flags & 0x0F).count_ones()
    }

    /// Number of fields stored for every entry.
    pub fn per_entry_field_count(&self) -> u32 {
        Self::FIELD_COUNT - self.shared_field_count()
    }

    /// Byte width of one per-entry index record.
    pub fn record_size(&self) -> usize {
        ((Self::WORDS_PER_RECORD - self.shared_field_count()) * 4) as usize
    }

    /// Byte width of the shared header, including the flags word.
    pub fn header_size(&self) -> usize {
        ((1 + self.shared_field_count()) * 4) as usize
    }
}

/// Key words stored once for every entry in the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedFields {
    pub res_type: Option<u32>,
    pub res_group: Option<u32>,
    pub instance_hi: Option<u32>,
    pub instance_lo: Option<u32>,
}

impl SharedFields {
    pub fn read(schema: IndexSchema, reader: &mut ByteReader<'_>) -> Result<Self> {
        let word = |flag: u32, reader: &mut ByteReader<'_>| -> Result<Option<u32>> {
            if schema.has(flag) {
                reader.read_u32().map(Some)
            } else {
                Ok(None)
            }
        };
        Ok(Self {
            res_type: word(IndexSchema::CONSTANT_TYPE, reader)?,
            res_group: word(IndexSchema::CONSTANT_GROUP, reader)?,
            instance_hi: word(IndexSchema::CONSTANT_INSTANCE_HI, reader)?,
            instance_lo: word(IndexSchema::CONSTANT_INSTANCE_LO, reader)?,
        })
    }

    pub fn schema(&self) -> IndexSchema {
        let mut flags = 0;
        if self.res_type.is_some() {
            flags |= IndexSchema::CONSTANT_TYPE;
        }
        if self.res_group.is_some() {
            flags |= IndexSchema::CONSTANT_GROUP;
        }
        if self.instance_hi.is_some() {
            flags |= IndexSchema::CONSTANT_INSTANCE_HI;
        }
        if self.instance_lo.is_some() {
            flags |= IndexSchema::CONSTANT_INSTANCE_LO;
        }
        IndexSchema::new(flags)
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.schema().flags);
        for word in [self.res_type, self.res_group, self.instance_hi, self.instance_lo]
            .into_iter()
            .flatten()
        {
            writer.write_u32(word);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    None,
    Zlib,
    RefPack,
    Streamable,
    Deleted,
    Other(u16),
}

impl From<u16> for CompressionKind {
    fn from(id: u16) -> Self {
        match id {
            0x0000 => CompressionKind::None,
            IndexEntry::ZLIB => CompressionKind::Zlib,
            0xFFFF => CompressionKind::RefPack,
            0xFFFE => CompressionKind::Streamable,
            0xFFE0 => CompressionKind::Deleted,
            other => CompressionKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub tgi: TGI,
    pub offset: u32,
    /// Stored size; the top bit flags the payload as compressed.
    pub filesize: u32,
    /// Decompressed size.
    pub memsize: u32,
    pub compression: u16,
    pub committed: u16,
}

impl IndexEntry {
    pub const ZLIB: u16 = 0x5A42;
    pub const COMPRESSED_FLAG: u32 = 0x8000_0000;

    /// Reads one record, filling key words from `shared` where the schema says so.
    pub fn read(shared: &SharedFields, reader: &mut ByteReader<'_>) -> Result<Self> {
        let res_type = match shared.res_type {
            Some(t) => t,
            None => reader.read_u32()?,
        };
        let res_group = match shared.res_group {
            Some(g) => g,
            None => reader.read_u32()?,
        };
        let instance_hi = match shared.instance_hi {
            Some(ihi) => ihi,
            None => reader.read_u32()?,
        };
        let instance_lo = match shared.instance_lo {
            Some(ilo) => ilo,
            None => reader.read_u32()?,
        };
        let offset = reader.read_u32()?;
        let filesize = reader.read_u32()?;
        let memsize = reader.read_u32()?;
        let compression = reader.read_u16()?;
        let committed = reader.read_u16()?;

        Ok(Self {
            tgi: TGI {
                res_type,
                res_group,
                instance: (u64::from(instance_hi) << 32) | u64::from(instance_lo),
            },
            offset,
            filesize,
            memsize,
            compression,
            committed,
        })
    }

    pub fn write(&self, shared: &SharedFields, writer: &mut ByteWriter) {
        if shared.res_type.is_none() {
            writer.write_u32(self.tgi.res_type);
        }
        if shared.res_group.is_none() {
            writer.write_u32(self.tgi.res_group);
        }
        if shared.instance_hi.is_none() {
            writer.write_u32((self.tgi.instance >> 32) as u32);
        }
        if shared.instance_lo.is_none() {
            writer.write_u32(self.tgi.instance as u32);
        }
        writer.write_u32(self.offset);
        writer.write_u32(self.filesize);
        writer.write_u32(self.memsize);
        writer.write_u16(self.compression);
        writer.write_u16(self.committed);
    }

    pub fn is_compressed(&self) -> bool {
        self.filesize & Self::COMPRESSED_FLAG != 0
    }

    /// Stored size with the compression flag masked off.
    pub fn size(&self) -> u32 {
        self.filesize & !Self::COMPRESSED_FLAG
    }

    pub fn compression_kind(&self) -> CompressionKind {
        CompressionKind::from(self.compression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_counts_add_up_for_every_schema() {
        for flags in 0..16 {
            let schema = IndexSchema::new(flags);
            assert_eq!(schema.shared_field_count() + schema.per_entry_field_count(), 9);
            assert_eq!(schema.record_size() + schema.header_size(), 36);
        }
    }

    #[test]
    fn key_parses_from_display_form() {
        let tgi = TGI::new(0x034AEECB, 0x80000000, 0x0123456789ABCDEF);
        assert_eq!(tgi.to_string().parse::<TGI>().unwrap(), tgi);
        assert!("12:34".parse::<TGI>().is_err());
    }
}
