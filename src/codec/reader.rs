use binrw::Endian;

use crate::error::{Error, Result};

/// Extracts the bit run `[start, start + length)` from `field`, where `field`
/// holds a little-endian integer (bit 0 is the low bit of `field[0]`).
///
/// The run may straddle any number of bytes. `length` must be at most 64 and
/// the run must lie inside `field`.
pub fn read_bits(field: &[u8], start: usize, length: usize) -> u64 {
    debug_assert!(length <= 64);
    debug_assert!(start + length <= field.len() * 8);
    if length == 0 {
        return 0;
    }

    let first = start >> 3;
    let last = (start + length - 1) >> 3;
    let offset = start & 7;

    let mut sum = u64::from(field[first] >> offset);
    for (i, &byte) in field[first + 1..=last].iter().enumerate() {
        sum |= u64::from(byte) << (8 * (i + 1) - offset);
    }

    if length == 64 {
        sum
    } else {
        sum & ((1u64 << length) - 1)
    }
}

/// Cursor over an immutable byte buffer.
///
/// Every read is all-or-nothing: the bounds are checked before the cursor
/// moves, so a failed read leaves the reader where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_endian(data, Endian::Little)
    }

    pub fn with_endian(data: &'a [u8], endian: Endian) -> Self {
        Self { data, pos: 0, endian }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::Bounds {
                needed_bits: 0,
                remaining: 0,
                position: pos,
                length: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    fn check(&self, needed_bits: usize) -> Result<()> {
        let needed = needed_bits.div_ceil(8);
        if needed > self.remaining() {
            return Err(Error::Bounds {
                needed_bits,
                remaining: self.remaining(),
                position: self.pos,
                length: self.data.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        self.check(count.saturating_mul(8))?;
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Reads a `bits`-wide unsigned integer in the configured byte order.
    fn unsigned(&mut self, bits: usize) -> Result<u64> {
        let bytes = self.take(bits / 8)?;
        let value = read_bits(bytes, 0, bits);
        Ok(match self.endian {
            Endian::Little => value,
            Endian::Big => value.swap_bytes() >> (64 - bits),
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.unsigned(8).map(|v| v as u8)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_u8().map(|v| v as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.unsigned(16).map(|v| v as u16)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_u16().map(|v| v as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.unsigned(32).map(|v| v as u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_u32().map(|v| v as i32)
    }

    /// Two 32-bit words combined into one value; low word first when little endian.
    pub fn read_u64(&mut self) -> Result<u64> {
        self.check(64)?;
        let first = u64::from(self.read_u32()?);
        let second = u64::from(self.read_u32()?);
        Ok(match self.endian {
            Endian::Little => (second << 32) | first,
            Endian::Big => (first << 32) | second,
        })
    }

    /// Copies `size` bytes into a little-endian ordered field for bit extraction.
    fn float_field(&mut self, size: usize) -> Result<[u8; 8]> {
        let bytes = self.take(size)?;
        let mut field = [0u8; 8];
        field[..size].copy_from_slice(bytes);
        if self.endian == Endian::Big {
            field[..size].reverse();
        }
        Ok(field)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let field = self.float_field(4)?;
        let sign = read_bits(&field, 31, 1);
        let exponent = read_bits(&field, 23, 8);
        let mantissa = read_bits(&field, 0, 23);
        Ok(f32::from_bits(((sign << 31) | (exponent << 23) | mantissa) as u32))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let field = self.float_field(8)?;
        let sign = read_bits(&field, 63, 1);
        let exponent = read_bits(&field, 52, 11);
        let mantissa = read_bits(&field, 0, 52);
        Ok(f64::from_bits((sign << 63) | (exponent << 52) | mantissa))
    }

    /// Borrows the next `count` bytes.
    pub fn read_slice(&mut self, count: usize) -> Result<&'a [u8]> {
        if count == 0 {
            return Ok(&[]);
        }
        self.take(count)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.read_slice(count).map(<[u8]>::to_vec)
    }

    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        let bytes = self.take(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Reads `count` bytes and decodes them as UTF-8.
    pub fn read_string(&mut self, count: usize) -> Result<String> {
        let start = self.pos;
        let bytes = self.read_slice(count)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(e) => {
                self.pos = start;
                Err(Error::format(format!("invalid UTF-8 string at {start}: {e}")))
            }
        }
    }

    /// Little-endian base-128 length: seven payload bits per byte, high bit continues.
    pub fn read_var_u7(&mut self) -> Result<u32> {
        let start = self.pos;
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = match self.read_u8() {
                Ok(b) => b,
                Err(e) => {
                    self.pos = start;
                    return Err(e);
                }
            };
            if shift == 28 && byte & 0x7F > 0x0F {
                self.pos = start;
                return Err(Error::format(format!("7-bit encoded length at {start} overflows 32 bits")));
            }
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        self.pos = start;
        Err(Error::format(format!("7-bit encoded length at {start} is too long")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_bits(field: &[u8], start: usize, length: usize) -> u64 {
        let mut value = 0u128;
        for (i, &b) in field.iter().enumerate() {
            value |= u128::from(b) << (8 * i);
        }
        ((value >> start) & ((1u128 << length) - 1)) as u64
    }

    #[test]
    fn read_bits_matches_reference_for_every_run() {
        let field = [0xA5, 0x3C, 0xFF, 0x01, 0x80, 0x7E, 0x99, 0x42, 0xC3, 0x18];
        for start in 0..field.len() * 8 {
            for length in 0..=64.min(field.len() * 8 - start) {
                assert_eq!(
                    read_bits(&field, start, length),
                    reference_bits(&field, start, length),
                    "start {start} length {length}"
                );
            }
        }
    }

    #[test]
    fn failed_read_leaves_cursor() {
        let data = [1, 2, 3];
        let mut reader = ByteReader::new(&data);
        reader.read_u8().unwrap();
        let err = reader.read_u32().unwrap_err();
        match err {
            Error::Bounds { needed_bits, remaining, position, length } => {
                assert_eq!((needed_bits, remaining, position, length), (32, 2, 1, 3));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_u16().unwrap(), 0x0302);
    }

    #[test]
    fn unterminated_var_u7_is_rejected() {
        let data = [0xFF; 6];
        let mut reader = ByteReader::new(&data);
        assert!(matches!(reader.read_var_u7(), Err(Error::Format(_))));
        assert_eq!(reader.position(), 0);
    }
}
