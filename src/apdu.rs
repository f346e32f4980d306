// src/apdu.rs
use log::{debug, trace};

use crate::error::{MifareError, TagError};
use crate::mifare::{self, BLOCK_SIZE, KEY_SIZE, TagSize};

/// Anything that can exchange raw command/response frames with a tag.
pub trait Transceive {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TagError>;
}

impl<T: Transceive + ?Sized> Transceive for &mut T {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TagError> {
        (**self).transceive(command)
    }
}

#[cfg(feature = "pcsc")]
impl Transceive for pcsc::Card {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TagError> {
        let mut recv_buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
        let resp = self.transmit(command, &mut recv_buffer)?;
        Ok(resp.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    A,
    B,
}

impl KeyType {
    pub fn code(self) -> u8 {
        match self {
            KeyType::A => 0x60,
            KeyType::B => 0x61,
        }
    }
}

// Reader key slot used for every authentication
const KEY_SLOT: u8 = 0x00;

// Load Authentication Keys into Reader Memory
// FF 82 00 slot 06 [KEY]
pub fn load_key_command(key: &[u8; KEY_SIZE]) -> Vec<u8> {
    let mut apdu = vec![0xFF, 0x82, 0x00, KEY_SLOT, KEY_SIZE as u8];
    apdu.extend_from_slice(key);
    apdu
}

// General Authenticate
// FF 86 00 00 05 01 00 Block KeyType KeyNumber
pub fn authenticate_command(block: u8, key_type: KeyType) -> [u8; 10] {
    [
        0xFF,
        0x86,
        0x00,
        0x00,
        0x05,
        0x01,
        0x00,
        block,
        key_type.code(),
        KEY_SLOT,
    ]
}

// Read: FF B0 00 Block Len
pub fn read_binary_command(block: u8, length: u8) -> [u8; 5] {
    [0xFF, 0xB0, 0x00, block, length]
}

// Write: FF D6 00 Block Len [Data]
pub fn update_binary_command(block: u8, data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, block, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu
}

// Get UID: FF CA 00 00 00
pub const GET_UID_COMMAND: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// Splits off the status word, returning the data when it is `90 00`.
pub fn check_status<'r>(command: &'static str, resp: &'r [u8]) -> Result<&'r [u8], TagError> {
    match resp {
        [data @ .., 0x90, 0x00] => Ok(data),
        [.., sw1, sw2] => Err(TagError::Status {
            command,
            sw1: *sw1,
            sw2: *sw2,
        }),
        _ => Err(TagError::ShortResponse {
            command,
            len: resp.len(),
        }),
    }
}

fn exchange<T: Transceive + ?Sized>(
    tag: &mut T,
    command: &'static str,
    apdu: &[u8],
) -> Result<Vec<u8>, TagError> {
    trace!("{command} >> {}", hex::encode(apdu));
    let resp = tag.transceive(apdu)?;
    trace!("{command} << {}", hex::encode(&resp));
    check_status(command, &resp).map(<[u8]>::to_vec)
}

pub fn get_uid<T: Transceive + ?Sized>(tag: &mut T) -> Result<Vec<u8>, TagError> {
    exchange(tag, "get uid", &GET_UID_COMMAND)
}

pub fn read_binary<T: Transceive + ?Sized>(
    tag: &mut T,
    block: u8,
    length: u8,
) -> Result<Vec<u8>, TagError> {
    let data = exchange(tag, "read binary", &read_binary_command(block, length))?;
    if data.len() < length as usize {
        return Err(TagError::ShortResponse {
            command: "read binary",
            len: data.len(),
        });
    }
    Ok(data)
}

pub fn update_binary<T: Transceive + ?Sized>(
    tag: &mut T,
    block: u8,
    data: &[u8],
) -> Result<(), TagError> {
    exchange(tag, "update binary", &update_binary_command(block, data)).map(|_| ())
}

/// MIFARE Classic operations over a borrowed transport.
pub struct MifareClassic<'a, T: Transceive + ?Sized> {
    tag: &'a mut T,
    size: TagSize,
}

impl<'a, T: Transceive + ?Sized> MifareClassic<'a, T> {
    pub fn new(tag: &'a mut T, size: TagSize) -> Self {
        Self { tag, size }
    }

    pub fn size(&self) -> TagSize {
        self.size
    }

    pub fn sector_count(&self) -> u8 {
        self.size.sector_count()
    }

    fn check_sector(&self, sector: i64) -> Result<(), MifareError> {
        if sector >= self.sector_count() as i64 {
            return Err(MifareError::InvalidSector(sector));
        }
        mifare::block_count_in_sector(sector).map(|_| ())
    }

    fn check_block(&self, block: i64) -> Result<u8, MifareError> {
        if block >= self.size.block_count() as i64 {
            return Err(MifareError::InvalidBlock(block));
        }
        mifare::MifareAddress::from_block(block).map(|address| address.to_block())
    }

    pub fn block_count_in_sector(&self, sector: i64) -> Result<u8, TagError> {
        self.check_sector(sector)?;
        Ok(mifare::block_count_in_sector(sector)?)
    }

    pub fn sector_to_block(&self, sector: i64) -> Result<u8, TagError> {
        self.check_sector(sector)?;
        Ok(mifare::sector_to_first_block(sector)?)
    }

    pub fn authenticate_a(&mut self, sector: i64, key: &[u8]) -> Result<(), TagError> {
        self.authenticate(sector, key, KeyType::A)
    }

    pub fn authenticate_b(&mut self, sector: i64, key: &[u8]) -> Result<(), TagError> {
        self.authenticate(sector, key, KeyType::B)
    }

    pub fn authenticate(
        &mut self,
        sector: i64,
        key: &[u8],
        key_type: KeyType,
    ) -> Result<(), TagError> {
        let key = mifare::validate_key(key)?;
        let block = self.sector_to_block(sector)?;

        exchange(self.tag, "load key", &load_key_command(&key))?;
        exchange(
            self.tag,
            "authenticate",
            &authenticate_command(block, key_type),
        )?;
        debug!("authenticated sector {sector} with key {key_type:?}");
        Ok(())
    }

    pub fn read_block(&mut self, block: i64) -> Result<[u8; BLOCK_SIZE], TagError> {
        let block = self.check_block(block)?;
        let data = read_binary(self.tag, block, BLOCK_SIZE as u8)?;
        Ok(mifare::validate_block_data(&data[..BLOCK_SIZE])?)
    }

    /// Reads every block of `sector`, trailer included. The sector must
    /// already be authenticated.
    pub fn read_sector(&mut self, sector: i64) -> Result<Vec<u8>, TagError> {
        let first = self.sector_to_block(sector)? as i64;
        let count = self.block_count_in_sector(sector)? as i64;

        let mut data = Vec::with_capacity(count as usize * BLOCK_SIZE);
        for block in first..first + count {
            data.extend(self.read_block(block)?);
        }
        Ok(data)
    }

    /// Writes one 16-byte data block. Sector trailers are refused, see
    /// [`MifareClassic::write_trailer`].
    pub fn write_block(&mut self, block: i64, data: &[u8]) -> Result<(), TagError> {
        let data = mifare::validate_block_data(data)?;
        let block = self.check_block(block)?;
        if mifare::is_trailer_block(block as i64)? {
            return Err(MifareError::TrailerBlock(block).into());
        }
        update_binary(self.tag, block, &data)
    }

    /// Rewrites the keys and access bits of `sector`. A wrong trailer locks
    /// the sector for good.
    pub fn write_trailer(&mut self, sector: i64, data: &[u8]) -> Result<(), TagError> {
        let data = mifare::validate_block_data(data)?;
        self.check_sector(sector)?;
        let block = mifare::trailer_block(sector)?;
        update_binary(self.tag, block, &data)
    }

    pub fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TagError> {
        self.tag.transceive(command)
    }
}

/// Scripted in-memory tag used by the unit tests. Understands the pseudo
/// APDUs above against a flat block memory.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    pub struct FakeTag {
        pub memory: Vec<u8>,
        pub unit: usize,
        // per-sector key A; `None` means no authentication needed (NTAG)
        pub sector_keys: Option<Vec<[u8; KEY_SIZE]>>,
        pub loaded_key: Option<[u8; KEY_SIZE]>,
        pub authenticated: Option<u8>,
        pub log: Vec<Vec<u8>>,
    }

    const OK: [u8; 2] = [0x90, 0x00];
    const FAIL: [u8; 2] = [0x63, 0x00];

    impl FakeTag {
        pub fn mifare(size: TagSize, key: [u8; KEY_SIZE]) -> Self {
            Self {
                memory: vec![0; size.bytes()],
                unit: BLOCK_SIZE,
                sector_keys: Some(vec![key; size.sector_count() as usize]),
                loaded_key: None,
                authenticated: None,
                log: Vec::new(),
            }
        }

        pub fn ntag(pages: usize) -> Self {
            Self {
                memory: vec![0; pages * 4],
                unit: 4,
                sector_keys: None,
                loaded_key: None,
                authenticated: None,
                log: Vec::new(),
            }
        }

        fn accessible(&self, block: u8) -> bool {
            match &self.sector_keys {
                None => true,
                Some(_) => mifare::block_to_sector(block as i64).ok() == self.authenticated,
            }
        }
    }

    impl Transceive for FakeTag {
        fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TagError> {
            self.log.push(command.to_vec());
            let resp = match command {
                [0xFF, 0x82, 0x00, _, 0x06, key @ ..] if key.len() == KEY_SIZE => {
                    self.loaded_key = key.try_into().ok();
                    OK.to_vec()
                }
                [0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, 0x60, _] => {
                    let sector = mifare::block_to_sector(*block as i64).ok();
                    let key = sector.and_then(|s| {
                        self.sector_keys.as_ref().and_then(|keys| keys.get(s as usize))
                    });
                    if key.is_some() && key == self.loaded_key.as_ref() {
                        self.authenticated = sector;
                        OK.to_vec()
                    } else {
                        self.authenticated = None;
                        FAIL.to_vec()
                    }
                }
                [0xFF, 0x86, ..] => FAIL.to_vec(),
                [0xFF, 0xB0, 0x00, block, len] => {
                    let start = *block as usize * self.unit;
                    let end = start + *len as usize;
                    if !self.accessible(*block) || end > self.memory.len() {
                        FAIL.to_vec()
                    } else {
                        let mut resp = self.memory[start..end].to_vec();
                        resp.extend(OK);
                        resp
                    }
                }
                [0xFF, 0xD6, 0x00, block, len, data @ ..] if data.len() == *len as usize => {
                    let start = *block as usize * self.unit;
                    let end = start + data.len();
                    if !self.accessible(*block) || end > self.memory.len() {
                        FAIL.to_vec()
                    } else {
                        self.memory[start..end].copy_from_slice(data);
                        OK.to_vec()
                    }
                }
                [0xFF, 0xCA, 0x00, 0x00, 0x00] => vec![0x04, 0xA1, 0xB2, 0xC3, 0x90, 0x00],
                _ => vec![0x6A, 0x81],
            };
            Ok(resp)
        }
    }
}
