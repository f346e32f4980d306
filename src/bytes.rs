// src/bytes.rs
use crate::error::ByteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

fn check_width(width: usize) -> Result<(), ByteError> {
    if width == 0 || width > 8 {
        return Err(ByteError::Width { width });
    }
    Ok(())
}

/// Returns `bytes[offset..offset + length]`, or a range error.
pub fn slice_checked(bytes: &[u8], offset: usize, length: usize) -> Result<&[u8], ByteError> {
    let range_error = || ByteError::Range {
        offset,
        length,
        available: bytes.len(),
    };

    let end = offset.checked_add(length).ok_or_else(range_error)?;
    bytes.get(offset..end).ok_or_else(range_error)
}

/// Reads an unsigned integer `width` bytes wide starting at `offset`.
pub fn bytes_to_uint(
    bytes: &[u8],
    offset: usize,
    width: usize,
    endian: Endian,
) -> Result<u64, ByteError> {
    check_width(width)?;
    let field = slice_checked(bytes, offset, width)?;

    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    let value = match endian {
        Endian::Big => field.iter().fold(0, fold),
        Endian::Little => field.iter().rev().fold(0, fold),
    };
    Ok(value)
}

pub fn bytes_to_uint_be(bytes: &[u8], offset: usize, width: usize) -> Result<u64, ByteError> {
    bytes_to_uint(bytes, offset, width, Endian::Big)
}

/// Writes `value` into exactly `width` bytes.
pub fn uint_to_bytes(value: u64, width: usize, endian: Endian) -> Result<Vec<u8>, ByteError> {
    check_width(width)?;
    if width < 8 && value >> (width * 8) != 0 {
        return Err(ByteError::Overflow { value, width });
    }

    let be = value.to_be_bytes();
    let mut out = be[8 - width..].to_vec();
    if endian == Endian::Little {
        out.reverse();
    }
    Ok(out)
}

pub fn uint_to_bytes_be(value: u64, width: usize) -> Result<Vec<u8>, ByteError> {
    uint_to_bytes(value, width, Endian::Big)
}

/// Forward-only cursor over a borrowed buffer. Every read is bounds checked.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, length: usize) -> Result<&'a [u8], ByteError> {
        let out = slice_checked(self.data, self.pos, length)?;
        self.pos += length;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, ByteError> {
        Ok(self.take(1)?[0])
    }

    pub fn be_u16(&mut self) -> Result<u16, ByteError> {
        let value = bytes_to_uint_be(self.data, self.pos, 2)?;
        self.pos += 2;
        Ok(value as u16)
    }

    pub fn be_u32(&mut self) -> Result<u32, ByteError> {
        let value = bytes_to_uint_be(self.data, self.pos, 4)?;
        self.pos += 4;
        Ok(value as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(&[0x01], 0, 1, 1)]
    #[case(&[0x01, 0x02], 0, 2, 0x0102)]
    #[case(&[0xFF, 0x00, 0x00, 0x01, 0x00], 1, 4, 0x100)]
    #[case(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x00, 0x00, 0x01], 0, 8, 0xDEAD_BEEF_0000_0001)]
    fn reads_big_endian(
        #[case] bytes: &[u8],
        #[case] offset: usize,
        #[case] width: usize,
        #[case] expected: u64,
    ) {
        assert_eq!(bytes_to_uint_be(bytes, offset, width), Ok(expected));
    }

    #[test]
    fn reads_little_endian() {
        assert_eq!(
            bytes_to_uint(&[0x01, 0x02, 0x03], 0, 3, Endian::Little),
            Ok(0x030201)
        );
    }

    #[test]
    fn read_past_end_is_range_error() {
        assert_eq!(
            bytes_to_uint_be(&[0x00, 0x01, 0x02], 1, 4),
            Err(ByteError::Range {
                offset: 1,
                length: 4,
                available: 3
            })
        );
    }

    #[test]
    fn zero_width_is_rejected() {
        assert_eq!(
            bytes_to_uint_be(&[0x00], 0, 0),
            Err(ByteError::Width { width: 0 })
        );
        assert_eq!(uint_to_bytes_be(0, 9), Err(ByteError::Width { width: 9 }));
    }

    #[test]
    fn writes_fixed_width() {
        assert_eq!(uint_to_bytes_be(0x0102, 4), Ok(vec![0, 0, 1, 2]));
        assert_eq!(
            uint_to_bytes(0x0102, 2, Endian::Little),
            Ok(vec![0x02, 0x01])
        );
        assert_eq!(uint_to_bytes_be(u64::MAX, 8), Ok(vec![0xFF; 8]));
    }

    #[test]
    fn value_too_wide_overflows() {
        assert_eq!(
            uint_to_bytes_be(256, 1),
            Err(ByteError::Overflow {
                value: 256,
                width: 1
            })
        );
        assert_eq!(uint_to_bytes_be(255, 1), Ok(vec![0xFF]));
    }

    #[test]
    fn slice_checked_handles_overflowing_offsets() {
        assert!(slice_checked(&[1, 2, 3], usize::MAX, 2).is_err());
        assert_eq!(slice_checked(&[1, 2, 3], 1, 2), Ok(&[2u8, 3][..]));
        assert_eq!(slice_checked(&[1, 2, 3], 3, 0), Ok(&[][..]));
    }

    #[test]
    fn reader_tracks_position() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0xAA];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.u8(), Ok(1));
        assert_eq!(reader.be_u16(), Ok(2));
        assert_eq!(reader.be_u32(), Ok(3));
        assert_eq!(reader.position(), 7);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.take(2).is_err());
        assert_eq!(reader.position(), 7);
        assert_eq!(reader.take(1), Ok(&[0xAA][..]));
        assert!(reader.is_empty());
    }
}
