// src/cards.rs
use log::{debug, info, warn};

use crate::apdu::{self, KeyType, MifareClassic, Transceive};
use crate::error::{TagError, TlvError};
use crate::message;
use crate::mifare::{self, BLOCK_SIZE, COMMON_KEYS, KEY_SIZE, TagSize};
use crate::tlv;
use crate::types::NdefMessage;

/// Keys tried, in order, when a sector has to be authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRing {
    pub keys: Vec<[u8; KEY_SIZE]>,
}

impl Default for KeyRing {
    fn default() -> Self {
        Self {
            keys: COMMON_KEYS.to_vec(),
        }
    }
}

impl KeyRing {
    pub fn new(keys: Vec<[u8; KEY_SIZE]>) -> Self {
        Self { keys }
    }

    /// Tries every key as key A, then as key B.
    pub fn authenticate<T: Transceive + ?Sized>(
        &self,
        classic: &mut MifareClassic<'_, T>,
        sector: u8,
    ) -> Result<(), TagError> {
        for key_type in [KeyType::A, KeyType::B] {
            for key in &self.keys {
                match classic.authenticate(sector as i64, key, key_type) {
                    Ok(()) => return Ok(()),
                    // rejected key
                    Err(TagError::Status { .. }) => continue,
                    Err(err) => return Err(err),
                }
            }
        }
        warn!("Could not authenticate sector {sector}");
        Err(TagError::AuthFailed { sector })
    }
}

/// Tag family, as reported by a PC/SC reader in the ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Classic(TagSize),
    Ntag,
}

impl CardKind {
    /// Reads the PC/SC part 3 card name (ATR bytes 13-14) of a contactless
    /// storage card.
    pub fn from_atr(atr: &[u8]) -> Option<Self> {
        // 3B 8F 80 01 80 4F 0C A0 00 00 03 06 SS NN NN ...
        match atr {
            [0x3B, _, _, _, 0x80, 0x4F, _, _, _, _, _, _, _, 0x00, name, ..] => match name {
                0x01 => Some(CardKind::Classic(TagSize::OneK)),
                0x02 => Some(CardKind::Classic(TagSize::FourK)),
                0x26 => Some(CardKind::Classic(TagSize::Mini)),
                0x03 => Some(CardKind::Ntag),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Outcome of looking for a complete NDEF TLV in what has been read so far.
/// A zero-length NDEF TLV (`03 00 FE`) is a formatted tag with no message.
fn complete_message(memory: &[u8]) -> Option<Result<NdefMessage, TagError>> {
    match tlv::unwrap(memory) {
        Ok([]) => Some(Ok(NdefMessage::default())),
        Ok(ndef) => Some(message::decode(ndef).map_err(TagError::from)),
        Err(TlvError::Truncated { .. }) | Err(TlvError::NoNdefTlv) => None,
        Err(err) => Some(Err(err.into())),
    }
}

/// Reads the NDEF message stored across the data blocks of a MIFARE Classic
/// tag, stopping as soon as the NDEF TLV is complete.
pub fn read_mifare<T: Transceive + ?Sized>(
    tag: &mut T,
    size: TagSize,
    keys: &KeyRing,
) -> Result<NdefMessage, TagError> {
    let mut classic = MifareClassic::new(tag, size);
    let mut memory = Vec::new();
    let mut current_sector = None;

    for block in mifare::data_blocks(size) {
        // We must authenticate at the start of every sector
        let sector = mifare::block_to_sector(block as i64)?;
        if current_sector != Some(sector) {
            keys.authenticate(&mut classic, sector)?;
            current_sector = Some(sector);
        }

        memory.extend(classic.read_block(block as i64)?);
        if let Some(message) = complete_message(&memory) {
            debug!("NDEF TLV complete after block {block}");
            return message;
        }
    }

    Err(match tlv::unwrap(&memory) {
        Err(err) => err.into(),
        Ok(_) => TlvError::NoNdefTlv.into(),
    })
}

/// Writes `message` into the data blocks of a MIFARE Classic tag, starting
/// at sector 1. An empty message formats the tag with an empty record.
pub fn write_mifare<T: Transceive + ?Sized>(
    tag: &mut T,
    size: TagSize,
    keys: &KeyRing,
    message: &NdefMessage,
) -> Result<(), TagError> {
    let data = tlv::wrap(&message::encode_allow_empty(message)?)?;
    let blocks = mifare::data_blocks(size);
    let available = blocks.len() * BLOCK_SIZE;
    if data.len() > available {
        return Err(TagError::Capacity {
            needed: data.len(),
            available,
        });
    }

    let mut classic = MifareClassic::new(tag, size);
    let mut current_sector = None;

    for (chunk, &block) in data.chunks(BLOCK_SIZE).zip(&blocks) {
        let sector = mifare::block_to_sector(block as i64)?;
        if current_sector != Some(sector) {
            keys.authenticate(&mut classic, sector)?;
            current_sector = Some(sector);
        }

        // Pad with 0s
        let mut padded = [0u8; BLOCK_SIZE];
        padded[..chunk.len()].copy_from_slice(chunk);
        classic.write_block(block as i64, &padded)?;
    }

    info!("Wrote {} bytes of NDEF data to MIFARE Classic", data.len());
    Ok(())
}

/// NTAG21x user memory: 4-byte pages starting at page 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtagModel {
    Ntag213,
    Ntag215,
    Ntag216,
}

pub const NTAG_PAGE_SIZE: usize = 4;
pub const NTAG_FIRST_USER_PAGE: u8 = 4;
/// Bytes 2 and 3 of this page are the static lock bytes.
pub const NTAG_STATIC_LOCK_PAGE: u8 = 2;
/// Capability container. Byte 3 is the write access condition.
pub const NTAG_CC_PAGE: u8 = 3;

const CC_READ_ONLY: u8 = 0x0F;

impl NtagModel {
    pub fn last_user_page(self) -> u8 {
        match self {
            NtagModel::Ntag213 => 39,
            NtagModel::Ntag215 => 129,
            NtagModel::Ntag216 => 225,
        }
    }

    pub fn user_bytes(self) -> usize {
        (self.last_user_page() - NTAG_FIRST_USER_PAGE + 1) as usize * NTAG_PAGE_SIZE
    }

    /// Model from the data area size (byte 2) of the capability container.
    pub fn from_capability_container(cc: &[u8; NTAG_PAGE_SIZE]) -> Result<Self, TagError> {
        match cc[2] {
            0x12 => Ok(NtagModel::Ntag213),
            0x3E => Ok(NtagModel::Ntag215),
            0x6D => Ok(NtagModel::Ntag216),
            size => Err(TagError::UnknownNtag(size)),
        }
    }

    /// Page holding the dynamic lock bytes, right after user memory.
    pub fn dynamic_lock_page(self) -> u8 {
        self.last_user_page() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Lock the tag with [`make_read_only`] once the message is written.
    pub read_only: bool,
}

fn read_page<T: Transceive + ?Sized>(
    tag: &mut T,
    page: u8,
) -> Result<[u8; NTAG_PAGE_SIZE], TagError> {
    let data = apdu::read_binary(tag, page, NTAG_PAGE_SIZE as u8)?;
    let mut out = [0u8; NTAG_PAGE_SIZE];
    out.copy_from_slice(&data[..NTAG_PAGE_SIZE]);
    Ok(out)
}

/// Reads the capability container to tell NTAG213, 215 and 216 apart.
pub fn detect_ntag<T: Transceive + ?Sized>(tag: &mut T) -> Result<NtagModel, TagError> {
    let model = NtagModel::from_capability_container(&read_page(tag, NTAG_CC_PAGE)?)?;
    debug!("capability container reports {model:?}");
    Ok(model)
}

/// Reads the NDEF message from an NTAG, four pages per read command.
pub fn read_ntag<T: Transceive + ?Sized>(
    tag: &mut T,
    model: NtagModel,
) -> Result<NdefMessage, TagError> {
    let mut memory = Vec::new();
    let mut page = NTAG_FIRST_USER_PAGE;

    while page <= model.last_user_page() {
        let pages_left = (model.last_user_page() - page + 1) as usize;
        let length = pages_left.min(4) * NTAG_PAGE_SIZE;
        memory.extend(apdu::read_binary(tag, page, length as u8)?);

        if let Some(message) = complete_message(&memory) {
            return message;
        }
        page = page.saturating_add(4);
    }

    Err(match tlv::unwrap(&memory) {
        Err(err) => err.into(),
        Ok(_) => TlvError::NoNdefTlv.into(),
    })
}

/// Writes `message` to an NTAG one page (4 bytes) at a time.
pub fn write_ntag<T: Transceive + ?Sized>(
    tag: &mut T,
    model: NtagModel,
    message: &NdefMessage,
) -> Result<(), TagError> {
    write_ntag_with(tag, model, message, WriteOptions::default())
}

/// Like [`write_ntag`]. With `read_only` set, the tag is locked after the
/// write; an empty message then formats the tag read-only.
pub fn write_ntag_with<T: Transceive + ?Sized>(
    tag: &mut T,
    model: NtagModel,
    message: &NdefMessage,
    options: WriteOptions,
) -> Result<(), TagError> {
    let mut data = tlv::wrap(&message::encode_allow_empty(message)?)?;
    if data.len() > model.user_bytes() {
        return Err(TagError::Capacity {
            needed: data.len(),
            available: model.user_bytes(),
        });
    }

    // Pad to multiple of 4
    while data.len() % NTAG_PAGE_SIZE != 0 {
        data.push(0x00);
    }

    for (page, chunk) in (NTAG_FIRST_USER_PAGE..).zip(data.chunks(NTAG_PAGE_SIZE)) {
        apdu::update_binary(tag, page, chunk)?;
    }

    info!("Wrote {} bytes of NDEF data to NTAG", data.len());

    if options.read_only {
        make_read_only(tag, model)?;
    }
    Ok(())
}

/// Permanently locks an NTAG: the capability container is marked read-only,
/// then every dynamic and static lock bit is set. There is no way back.
pub fn make_read_only<T: Transceive + ?Sized>(
    tag: &mut T,
    model: NtagModel,
) -> Result<(), TagError> {
    let mut cc = read_page(tag, NTAG_CC_PAGE)?;
    cc[3] = CC_READ_ONLY;
    apdu::update_binary(tag, NTAG_CC_PAGE, &cc)?;

    // byte 3 is reserved
    let page = model.dynamic_lock_page();
    let mut dynamic = read_page(tag, page)?;
    dynamic[..3].fill(0xFF);
    apdu::update_binary(tag, page, &dynamic)?;

    // Static lock bits last, they also lock the capability container
    let mut static_lock = read_page(tag, NTAG_STATIC_LOCK_PAGE)?;
    static_lock[2..].fill(0xFF);
    apdu::update_binary(tag, NTAG_STATIC_LOCK_PAGE, &static_lock)?;

    info!("NTAG is now read-only");
    Ok(())
}
