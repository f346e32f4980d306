// src/lib.rs
//! NDEF record/message codec and MIFARE Classic memory model.
//!
//! The codec is pure: it turns tag bytes into [`NdefMessage`] values and
//! back. [`apdu`] and [`cards`] layer PC/SC style tag commands on top of a
//! caller-supplied [`apdu::Transceive`] transport.

pub mod apdu;
pub mod bytes;
pub mod cards;
pub mod error;
pub mod message;
pub mod mifare;
pub mod record;
pub mod tlv;
pub mod types;
pub mod well_known;

pub use error::{ByteError, MifareError, NdefError, TagError, TlvError, WellKnownError};
pub use types::{DecodePolicy, Framing, NdefMessage, NdefRecord, RecordFlags, Tnf};
pub use well_known::{KnownRecord, RecordKind};
