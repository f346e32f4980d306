// src/error.rs
use thiserror::Error;

use crate::well_known::RecordKind;

/// Errors from the checked byte helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ByteError {
    #[error("range {offset}..{offset}+{length} is outside a buffer of {available} bytes")]
    Range {
        offset: usize,
        length: usize,
        available: usize,
    },
    #[error("integer width {width} is not supported (1 to 8 bytes)")]
    Width { width: usize },
    #[error("value {value} does not fit in {width} byte(s)")]
    Overflow { value: u64, width: usize },
}

/// Structural violations of the NDEF binary layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefError {
    #[error("malformed record at offset {offset}: {reason}")]
    MalformedRecord { offset: usize, reason: String },
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("message truncated: {0}")]
    TruncatedMessage(String),
    #[error("an NDEF message needs at least one record")]
    EmptyMessage,
    #[error(transparent)]
    Bytes(#[from] ByteError),
}

/// Errors from the well-known record builders and parsers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WellKnownError {
    #[error("record is not a {expected} record")]
    NotThisKind { expected: RecordKind },
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: RecordKind, reason: String },
    #[error("invalid {kind} field: {reason}")]
    InvalidField { kind: RecordKind, reason: String },
}

impl WellKnownError {
    pub fn is_not_this_kind(&self) -> bool {
        matches!(self, WellKnownError::NotThisKind { .. })
    }
}

/// Invalid input to the MIFARE Classic memory arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MifareError {
    #[error("invalid sector {0}")]
    InvalidSector(i64),
    #[error("invalid block {0}")]
    InvalidBlock(i64),
    #[error("unsupported MIFARE Classic size of {0} bytes")]
    InvalidTagSize(usize),
    #[error("key should be 6 bytes, got {0}")]
    InvalidKey(usize),
    #[error("block data should be 16 bytes, got {0}")]
    InvalidBlockData(usize),
    #[error("block {0} is a sector trailer")]
    TrailerBlock(u8),
}

/// Errors while locating the NDEF TLV inside raw tag memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    #[error("no NDEF TLV found")]
    NoNdefTlv,
    #[error("TLV at offset {offset} is truncated")]
    Truncated { offset: usize },
    #[error("NDEF message of {0} bytes does not fit in a TLV")]
    TooLong(usize),
}

/// Errors raised while talking to a tag.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("transmit error: {0}")]
    Transmit(String),
    #[error("{command} failed with status {sw1:02X}{sw2:02X}")]
    Status {
        command: &'static str,
        sw1: u8,
        sw2: u8,
    },
    #[error("{command} returned a response of {len} bytes")]
    ShortResponse { command: &'static str, len: usize },
    #[error("could not authenticate sector {sector}")]
    AuthFailed { sector: u8 },
    #[error("capability container size {0:#04x} does not match a known NTAG")]
    UnknownNtag(u8),
    #[error("message of {needed} bytes does not fit the {available} bytes on the tag")]
    Capacity { needed: usize, available: usize },
    #[error(transparent)]
    Mifare(#[from] MifareError),
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Ndef(#[from] NdefError),
}

#[cfg(feature = "pcsc")]
impl From<pcsc::Error> for TagError {
    fn from(err: pcsc::Error) -> Self {
        TagError::Transmit(err.to_string())
    }
}
