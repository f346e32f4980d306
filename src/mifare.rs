// src/mifare.rs
//! MIFARE Classic memory layout arithmetic.
//!
//! Sectors 0-31 hold 4 blocks each, sectors 32-39 (4K tags only) hold 16.
//! The last block of every sector is the trailer holding keys and access
//! bits. Nothing here does I/O.

use crate::error::MifareError;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 6;

const SMALL_SECTORS: i64 = 32;
const SMALL_SECTOR_BLOCKS: i64 = 4;
const LARGE_SECTOR_BLOCKS: i64 = 16;
// first block of sector 32
const LARGE_SECTOR_START: i64 = SMALL_SECTORS * SMALL_SECTOR_BLOCKS;
const MAX_SECTORS: i64 = 40;
const TOTAL_BLOCKS: i64 = 256;

/// Well-known transport keys, tried in order when authenticating.
pub const COMMON_KEYS: [[u8; KEY_SIZE]; 8] = [
    [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5],
    [0xD3, 0xF7, 0xD3, 0xF7, 0xD3, 0xF7],
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    [0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5],
    [0x4D, 0x3A, 0x99, 0xC3, 0x51, 0xDD],
    [0x1A, 0x98, 0x2C, 0x7E, 0x45, 0x9A],
    [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagSize {
    Mini,
    OneK,
    TwoK,
    FourK,
}

impl TagSize {
    pub fn from_bytes(size: usize) -> Result<Self, MifareError> {
        match size {
            320 => Ok(TagSize::Mini),
            1024 => Ok(TagSize::OneK),
            2048 => Ok(TagSize::TwoK),
            4096 => Ok(TagSize::FourK),
            other => Err(MifareError::InvalidTagSize(other)),
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            TagSize::Mini => 320,
            TagSize::OneK => 1024,
            TagSize::TwoK => 2048,
            TagSize::FourK => 4096,
        }
    }

    pub fn sector_count(self) -> u8 {
        match self {
            TagSize::Mini => 5,
            TagSize::OneK => 16,
            TagSize::TwoK => 32,
            TagSize::FourK => 40,
        }
    }

    pub fn block_count(self) -> usize {
        self.bytes() / BLOCK_SIZE
    }
}

pub fn sector_count(tag_size_bytes: usize) -> Result<u8, MifareError> {
    TagSize::from_bytes(tag_size_bytes).map(TagSize::sector_count)
}

fn check_sector(sector: i64) -> Result<i64, MifareError> {
    if !(0..MAX_SECTORS).contains(&sector) {
        return Err(MifareError::InvalidSector(sector));
    }
    Ok(sector)
}

fn check_block(block: i64) -> Result<i64, MifareError> {
    if !(0..TOTAL_BLOCKS).contains(&block) {
        return Err(MifareError::InvalidBlock(block));
    }
    Ok(block)
}

pub fn block_count_in_sector(sector: i64) -> Result<u8, MifareError> {
    let sector = check_sector(sector)?;
    if sector < SMALL_SECTORS {
        Ok(SMALL_SECTOR_BLOCKS as u8)
    } else {
        Ok(LARGE_SECTOR_BLOCKS as u8)
    }
}

pub fn sector_to_first_block(sector: i64) -> Result<u8, MifareError> {
    let sector = check_sector(sector)?;
    let block = if sector < SMALL_SECTORS {
        sector * SMALL_SECTOR_BLOCKS
    } else {
        LARGE_SECTOR_START + (sector - SMALL_SECTORS) * LARGE_SECTOR_BLOCKS
    };
    Ok(block as u8)
}

pub fn block_to_sector(block: i64) -> Result<u8, MifareError> {
    let block = check_block(block)?;
    let sector = if block < LARGE_SECTOR_START {
        block / SMALL_SECTOR_BLOCKS
    } else {
        SMALL_SECTORS + (block - LARGE_SECTOR_START) / LARGE_SECTOR_BLOCKS
    };
    Ok(sector as u8)
}

pub fn trailer_block(sector: i64) -> Result<u8, MifareError> {
    Ok(sector_to_first_block(sector)? + (block_count_in_sector(sector)? - 1))
}

pub fn is_trailer_block(block: i64) -> Result<bool, MifareError> {
    let sector = block_to_sector(block)?;
    Ok(trailer_block(sector as i64)? as i64 == block)
}

/// A block addressed as (sector, block within sector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MifareAddress {
    pub sector: u8,
    pub block: u8,
}

impl MifareAddress {
    pub fn new(sector: i64, block: i64) -> Result<Self, MifareError> {
        let count = block_count_in_sector(sector)?;
        if !(0..count as i64).contains(&block) {
            let first = sector_to_first_block(sector)? as i64;
            return Err(MifareError::InvalidBlock(first + block));
        }
        Ok(Self {
            sector: sector as u8,
            block: block as u8,
        })
    }

    pub fn from_block(block: i64) -> Result<Self, MifareError> {
        let sector = block_to_sector(block)?;
        let first = sector_to_first_block(sector as i64)?;
        Ok(Self {
            sector,
            block: (block - first as i64) as u8,
        })
    }

    pub fn to_block(self) -> u8 {
        // fields were validated on construction
        let first = if (self.sector as i64) < SMALL_SECTORS {
            self.sector as i64 * SMALL_SECTOR_BLOCKS
        } else {
            LARGE_SECTOR_START + (self.sector as i64 - SMALL_SECTORS) * LARGE_SECTOR_BLOCKS
        };
        (first + self.block as i64) as u8
    }

    pub fn is_trailer(self) -> bool {
        let count = if (self.sector as i64) < SMALL_SECTORS {
            SMALL_SECTOR_BLOCKS
        } else {
            LARGE_SECTOR_BLOCKS
        };
        self.block as i64 == count - 1
    }
}

/// Blocks usable for NDEF data: every non-trailer block from sector 1 on.
/// Sector 0 holds the manufacturer block and the application directory.
pub fn data_blocks(size: TagSize) -> Vec<u8> {
    let mut blocks = Vec::new();
    for sector in 1..size.sector_count() as i64 {
        let (Ok(first), Ok(count)) = (sector_to_first_block(sector), block_count_in_sector(sector))
        else {
            continue;
        };
        // the last block in the sector is the trailer
        blocks.extend((0..count - 1).map(|offset| first + offset));
    }
    blocks
}

pub fn validate_key(key: &[u8]) -> Result<[u8; KEY_SIZE], MifareError> {
    key.try_into().map_err(|_| MifareError::InvalidKey(key.len()))
}

pub fn validate_block_data(data: &[u8]) -> Result<[u8; BLOCK_SIZE], MifareError> {
    data.try_into()
        .map_err(|_| MifareError::InvalidBlockData(data.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 4)]
    #[case(15, 60)]
    #[case(31, 124)]
    #[case(32, 128)]
    #[case(33, 144)]
    #[case(39, 240)]
    fn first_block_of_sector(#[case] sector: i64, #[case] block: u8) {
        assert_eq!(sector_to_first_block(sector), Ok(block));
        assert_eq!(block_to_sector(block as i64), Ok(sector as u8));
    }

    #[rstest]
    #[case(127, 31)]
    #[case(128, 32)]
    #[case(143, 32)]
    #[case(144, 33)]
    #[case(255, 39)]
    fn sector_of_block(#[case] block: i64, #[case] sector: u8) {
        assert_eq!(block_to_sector(block), Ok(sector));
    }

    #[test]
    fn blocks_per_sector() {
        assert_eq!(block_count_in_sector(31), Ok(4));
        assert_eq!(block_count_in_sector(32), Ok(16));
        assert_eq!(block_count_in_sector(0), Ok(4));
    }

    #[test]
    fn out_of_range_input() {
        assert_eq!(block_count_in_sector(-1), Err(MifareError::InvalidSector(-1)));
        assert_eq!(sector_to_first_block(40), Err(MifareError::InvalidSector(40)));
        assert_eq!(block_to_sector(-3), Err(MifareError::InvalidBlock(-3)));
        assert_eq!(block_to_sector(256), Err(MifareError::InvalidBlock(256)));
    }

    #[test]
    fn sector_counts_by_size() {
        assert_eq!(sector_count(320), Ok(5));
        assert_eq!(sector_count(1024), Ok(16));
        assert_eq!(sector_count(2048), Ok(32));
        assert_eq!(sector_count(4096), Ok(40));
        assert_eq!(sector_count(512), Err(MifareError::InvalidTagSize(512)));
        assert_eq!(TagSize::FourK.block_count(), 256);
    }

    #[test]
    fn every_block_maps_back() {
        for block in 0..256 {
            let address = MifareAddress::from_block(block).unwrap();
            assert_eq!(address.to_block() as i64, block);
            assert_eq!(
                MifareAddress::new(address.sector as i64, address.block as i64),
                Ok(address)
            );
        }
    }

    #[test]
    fn trailers() {
        assert_eq!(trailer_block(0), Ok(3));
        assert_eq!(trailer_block(31), Ok(127));
        assert_eq!(trailer_block(32), Ok(143));
        assert_eq!(is_trailer_block(7), Ok(true));
        assert_eq!(is_trailer_block(8), Ok(false));
        assert_eq!(is_trailer_block(255), Ok(true));
        assert!(MifareAddress::from_block(143).unwrap().is_trailer());
        assert!(!MifareAddress::from_block(142).unwrap().is_trailer());
    }

    #[test]
    fn address_rejects_block_outside_sector() {
        assert!(MifareAddress::new(1, 4).is_err());
        assert!(MifareAddress::new(32, 15).is_ok());
    }

    #[test]
    fn data_blocks_skip_sector_zero_and_trailers() {
        let blocks = data_blocks(TagSize::OneK);
        assert_eq!(blocks.len(), 15 * 3);
        assert_eq!(&blocks[..4], &[4, 5, 6, 8]);
        assert!(blocks.iter().all(|&b| !is_trailer_block(b as i64).unwrap()));

        let blocks = data_blocks(TagSize::FourK);
        assert_eq!(blocks.len(), 31 * 3 + 8 * 15);
        assert_eq!(blocks.last(), Some(&254));
    }

    #[test]
    fn key_and_block_validation() {
        assert_eq!(validate_key(&[0xFF; 6]), Ok([0xFF; 6]));
        assert_eq!(validate_key(&[0xFF; 5]), Err(MifareError::InvalidKey(5)));
        assert!(validate_block_data(&[0u8; 16]).is_ok());
        assert_eq!(
            validate_block_data(&[0u8; 17]),
            Err(MifareError::InvalidBlockData(17))
        );
    }
}
