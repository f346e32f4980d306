// src/tlv.rs
use log::{debug, trace};

use crate::bytes::ByteReader;
use crate::error::TlvError;

pub const TLV_NULL: u8 = 0x00;
pub const TLV_LOCK_CONTROL: u8 = 0x01;
pub const TLV_MEMORY_CONTROL: u8 = 0x02;
pub const TLV_NDEF: u8 = 0x03;
pub const TLV_PROPRIETARY: u8 = 0xFD;
pub const TLV_TERMINATOR: u8 = 0xFE;

/// Wraps an NDEF message in the TLV the tag memory stores it in:
/// `03 len value FE`, with the 3-byte `FF hi lo` length form from 255 bytes.
pub fn wrap(ndef: &[u8]) -> Result<Vec<u8>, TlvError> {
    let len = ndef.len();
    if len > u16::MAX as usize {
        return Err(TlvError::TooLong(len));
    }

    let mut tlv = Vec::with_capacity(len + 5);
    // T = 0x03 (NDEF Message)
    tlv.push(TLV_NDEF);

    // L (Length)
    if len < 0xFF {
        tlv.push(len as u8);
    } else {
        tlv.push(0xFF);
        tlv.extend_from_slice(&(len as u16).to_be_bytes());
    }

    // V (Value)
    tlv.extend_from_slice(ndef);

    // Terminator
    tlv.push(TLV_TERMINATOR);

    Ok(tlv)
}

/// Finds the first NDEF TLV in raw tag memory and returns its value.
pub fn unwrap(memory: &[u8]) -> Result<&[u8], TlvError> {
    let mut reader = ByteReader::new(memory);

    while !reader.is_empty() {
        let offset = reader.position();
        let truncated = |_| TlvError::Truncated { offset };

        match reader.u8().map_err(truncated)? {
            TLV_NULL => continue,
            TLV_TERMINATOR => break,
            tag => {
                let len = match reader.u8().map_err(truncated)? {
                    0xFF => reader.be_u16().map_err(truncated)? as usize,
                    len => len as usize,
                };
                let value = reader.take(len).map_err(truncated)?;
                match tag {
                    TLV_NDEF => return Ok(value),
                    TLV_LOCK_CONTROL | TLV_MEMORY_CONTROL | TLV_PROPRIETARY => {
                        trace!("skipped TLV {tag:#04x} of {len} bytes at {offset}");
                    }
                    _ => debug!("skipped reserved TLV {tag:#04x} of {len} bytes at {offset}"),
                }
            }
        }
    }

    Err(TlvError::NoNdefTlv)
}

/// Number of bytes [`wrap`] produces for a message of `ndef_len` bytes.
pub fn wrapped_len(ndef_len: usize) -> usize {
    let header = if ndef_len < 0xFF { 2 } else { 4 };
    header + ndef_len + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wraps_short_message() {
        let tlv = wrap(&[0xD0, 0x00, 0x00]).unwrap();
        assert_eq!(tlv, vec![0x03, 0x03, 0xD0, 0x00, 0x00, 0xFE]);
        assert_eq!(tlv.len(), wrapped_len(3));
    }

    #[test]
    fn wraps_long_message_with_three_byte_length() {
        let ndef = vec![0xAB; 300];
        let tlv = wrap(&ndef).unwrap();
        assert_eq!(&tlv[..4], &[0x03, 0xFF, 0x01, 0x2C]);
        assert_eq!(tlv.last(), Some(&0xFE));
        assert_eq!(tlv.len(), wrapped_len(300));
        assert_eq!(unwrap(&tlv).unwrap(), &ndef[..]);
    }

    #[test]
    fn length_255_uses_long_form() {
        let tlv = wrap(&[0u8; 255]).unwrap();
        assert_eq!(&tlv[..4], &[0x03, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn oversized_message_is_rejected() {
        assert_eq!(wrap(&vec![0u8; 70_000]), Err(TlvError::TooLong(70_000)));
    }

    #[test]
    fn unwrap_skips_null_and_control_tlvs() {
        let memory = [
            0x00, 0x00, // NULL padding
            0x01, 0x03, 0xA0, 0x10, 0x44, // lock control
            0x02, 0x03, 0xBC, 0x03, 0x13, // memory control
            0xFD, 0x01, 0x77, // proprietary
            0x03, 0x02, 0xAA, 0xBB, // NDEF
            0xFE, 0x00, 0x00,
        ];
        assert_eq!(unwrap(&memory).unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn unwrap_stops_at_terminator() {
        assert_eq!(unwrap(&[0xFE, 0x03, 0x00]), Err(TlvError::NoNdefTlv));
        assert_eq!(unwrap(&[0x00, 0x00]), Err(TlvError::NoNdefTlv));
    }

    #[test]
    fn unwrap_reports_truncation() {
        assert_eq!(
            unwrap(&[0x00, 0x03, 0x05, 0xD0]),
            Err(TlvError::Truncated { offset: 1 })
        );
        assert_eq!(unwrap(&[0x03]), Err(TlvError::Truncated { offset: 0 }));
    }
}
