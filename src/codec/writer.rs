use binrw::Endian;
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Growable byte sink with an explicit cursor.
///
/// `len()` is the high-water mark of everything written so far, so seeking
/// back and writing patches bytes in place without truncating the tail.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    endian: Endian,
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::with_capacity(256, Endian::Little)
    }

    pub fn with_endian(endian: Endian) -> Self {
        Self::with_capacity(256, endian)
    }

    pub fn with_capacity(capacity: usize, endian: Endian) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            pos: 0,
            len: 0,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves the cursor anywhere inside the written region, or to its end.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.len {
            return Err(Error::Bounds {
                needed_bits: 0,
                remaining: 0,
                position: pos,
                length: self.len,
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn into_inner(mut self) -> Vec<u8> {
        self.buf.truncate(self.len);
        self.buf
    }

    fn grow_for(&mut self, count: usize) {
        let needed = self.pos + count;
        if needed <= self.buf.len() {
            return;
        }
        let mut capacity = self.buf.len();
        while capacity < needed {
            capacity *= 2;
        }
        self.buf.resize(capacity, 0);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.grow_for(bytes.len());
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.len = self.len.max(self.pos);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_u8(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        match self.endian {
            Endian::Little => LittleEndian::write_u16(&mut bytes, value),
            Endian::Big => BigEndian::write_u16(&mut bytes, value),
        }
        self.write_bytes(&bytes);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        match self.endian {
            Endian::Little => LittleEndian::write_u32(&mut bytes, value),
            Endian::Big => BigEndian::write_u32(&mut bytes, value),
        }
        self.write_bytes(&bytes);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    /// Written as two 32-bit halves, low half first when little endian.
    pub fn write_u64(&mut self, value: u64) {
        let (hi, lo) = ((value >> 32) as u32, value as u32);
        match self.endian {
            Endian::Little => {
                self.write_u32(lo);
                self.write_u32(hi);
            }
            Endian::Big => {
                self.write_u32(hi);
                self.write_u32(lo);
            }
        }
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    pub fn write_fourcc(&mut self, tag: &[u8; 4]) {
        self.write_bytes(tag);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub fn write_var_u7(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                return;
            }
            self.write_u8(byte | 0x80);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_doubles_past_initial_capacity() {
        let mut writer = ByteWriter::with_capacity(2, Endian::Little);
        writer.write_u32(0xDEADBEEF);
        writer.write_u8(7);
        assert_eq!(writer.len(), 5);
        assert!(writer.buf.len() >= 5);
        assert_eq!(writer.into_inner(), vec![0xEF, 0xBE, 0xAD, 0xDE, 7]);
    }

    #[test]
    fn patching_keeps_high_water_mark() {
        let mut writer = ByteWriter::new();
        writer.write_u32(0);
        writer.write_u32(0x11111111);
        writer.seek(0).unwrap();
        writer.write_u16(0xABCD);
        assert_eq!(writer.position(), 2);
        assert_eq!(writer.len(), 8);
        assert_eq!(writer.as_slice(), &[0xCD, 0xAB, 0, 0, 0x11, 0x11, 0x11, 0x11]);
        assert!(writer.seek(9).is_err());
    }
}
