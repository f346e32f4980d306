// src/record.rs
use log::trace;

use crate::bytes::{ByteReader, uint_to_bytes_be};
use crate::error::{ByteError, NdefError};
use crate::types::{
    DecodePolicy, DecodedRecord, FLAG_CF, FLAG_IL, FLAG_MB, FLAG_ME, FLAG_SR, Framing, NdefRecord,
    RecordFlags, TNF_MASK, Tnf,
};

/// Decodes one record starting at `offset`, returning it together with the
/// number of bytes it occupied.
pub fn decode(bytes: &[u8], offset: usize) -> Result<(DecodedRecord, usize), NdefError> {
    decode_with(bytes, offset, DecodePolicy::default())
}

pub fn decode_with(
    bytes: &[u8],
    offset: usize,
    policy: DecodePolicy,
) -> Result<(DecodedRecord, usize), NdefError> {
    let mut reader = ByteReader::at(bytes, offset);
    let malformed = |field: &str, err: ByteError| NdefError::MalformedRecord {
        offset,
        reason: format!("{field}: {err}"),
    };

    // 1. Header
    let header = reader.u8().map_err(|e| malformed("header", e))?;
    let flags = RecordFlags::from_header(header);
    let tnf = Tnf::from_bits(header & TNF_MASK);

    // 2. Type Length
    let type_len = reader.u8().map_err(|e| malformed("type length", e))? as usize;

    // 3. Payload Length (1 byte for Short Record, 4 bytes otherwise)
    let payload_len = if flags.short_record {
        reader.u8().map_err(|e| malformed("payload length", e))? as usize
    } else {
        reader.be_u32().map_err(|e| malformed("payload length", e))? as usize
    };

    // 4. ID Length (if present)
    let id_len = if flags.id_present {
        reader.u8().map_err(|e| malformed("id length", e))? as usize
    } else {
        0
    };

    trace!(
        "record header {header:#04x} at {offset}: tnf={tnf:?} type_len={type_len} id_len={id_len} payload_len={payload_len}"
    );

    // 5. Type, ID, Payload
    let record_type = reader.take(type_len).map_err(|e| malformed("type", e))?;
    let id = if flags.id_present {
        Some(reader.take(id_len).map_err(|e| malformed("id", e))?.to_vec())
    } else {
        None
    };
    let payload = reader
        .take(payload_len)
        .map_err(|e| malformed("payload", e))?;

    let record = NdefRecord {
        tnf,
        record_type: record_type.to_vec(),
        id,
        payload: payload.to_vec(),
    };

    if policy.strict_tnf {
        check_strict(&record, flags, offset)?;
    }

    let consumed = reader.position() - offset;
    Ok((DecodedRecord { record, flags }, consumed))
}

fn check_strict(record: &NdefRecord, flags: RecordFlags, offset: usize) -> Result<(), NdefError> {
    let reason = match record.tnf {
        Tnf::Reserved => Some("reserved type name format"),
        Tnf::Empty
            if !record.record_type.is_empty()
                || !record.id_bytes().is_empty()
                || !record.payload.is_empty() =>
        {
            Some("empty record with type, id or payload")
        }
        Tnf::Unknown if !record.record_type.is_empty() => Some("unknown record with a type"),
        Tnf::Unchanged if !record.record_type.is_empty() || flags.id_present => {
            Some("unchanged record with a type or id")
        }
        Tnf::WellKnown | Tnf::MimeMedia | Tnf::AbsoluteUri | Tnf::External
            if record.record_type.is_empty() =>
        {
            Some("missing record type")
        }
        _ => None,
    };

    match reason {
        Some(reason) => Err(NdefError::MalformedRecord {
            offset,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Encodes one record. SR and IL are derived from the record (IL whenever an
/// id is present, even a zero-length one); MB, ME and CF come from `framing`.
pub fn encode(record: &NdefRecord, framing: Framing) -> Result<Vec<u8>, NdefError> {
    let id_present = record.id.is_some();
    let id = record.id_bytes();
    let short_record = record.payload.len() <= u8::MAX as usize;

    let type_len = u8::try_from(record.record_type.len()).map_err(|_| ByteError::Overflow {
        value: record.record_type.len() as u64,
        width: 1,
    })?;
    let id_len = u8::try_from(id.len()).map_err(|_| ByteError::Overflow {
        value: id.len() as u64,
        width: 1,
    })?;

    let mut header = record.tnf.bits();
    if framing.message_begin {
        header |= FLAG_MB;
    }
    if framing.message_end {
        header |= FLAG_ME;
    }
    if framing.chunked {
        header |= FLAG_CF;
    }
    if short_record {
        header |= FLAG_SR;
    }
    if id_present {
        header |= FLAG_IL;
    }

    let mut out = Vec::with_capacity(6 + type_len as usize + id.len() + record.payload.len());
    out.push(header);
    out.push(type_len);
    if short_record {
        out.push(record.payload.len() as u8);
    } else {
        out.extend(uint_to_bytes_be(record.payload.len() as u64, 4)?);
    }
    if id_present {
        out.push(id_len);
    }
    out.extend_from_slice(&record.record_type);
    out.extend_from_slice(id);
    out.extend_from_slice(&record.payload);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn text_record() -> NdefRecord {
        NdefRecord::new(Tnf::WellKnown, b"T".to_vec(), b"\x02enHello".to_vec())
    }

    #[test]
    fn decodes_short_text_record() {
        let bytes = [
            0xD1, 0x01, 0x08, b'T', 0x02, b'e', b'n', b'H', b'e', b'l', b'l', b'o',
        ];
        let (decoded, consumed) = decode(&bytes, 0).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.record, text_record());
        assert!(decoded.flags.message_begin);
        assert!(decoded.flags.message_end);
        assert!(decoded.flags.short_record);
        assert!(!decoded.flags.id_present);
    }

    #[test]
    fn decodes_at_offset_with_id_and_long_length() {
        let mut bytes = vec![0xAA, 0xBB];
        // MB, IL, TNF=MIME, 4-byte length
        bytes.extend([0x8A, 0x03, 0x00, 0x00, 0x00, 0x02, 0x01]);
        bytes.extend(b"a/b");
        bytes.push(b'7');
        bytes.extend([0x01, 0x02]);

        let (decoded, consumed) = decode(&bytes, 2).unwrap();
        assert_eq!(consumed, bytes.len() - 2);
        assert_eq!(decoded.record.tnf, Tnf::MimeMedia);
        assert_eq!(decoded.record.record_type, b"a/b");
        assert_eq!(decoded.record.id, Some(b"7".to_vec()));
        assert_eq!(decoded.record.payload, vec![0x01, 0x02]);
        assert!(!decoded.flags.short_record);
    }

    #[rstest]
    #[case::no_header(&[])]
    #[case::no_type_length(&[0xD1])]
    #[case::short_long_length(&[0xC1, 0x01, 0x00, 0x00])]
    #[case::type_overrun(&[0xD1, 0x05, 0x00, b'T'])]
    #[case::payload_overrun(&[0xD1, 0x01, 0x05, b'T', b'a'])]
    #[case::id_overrun(&[0xD9, 0x01, 0x00, 0x04, b'T', b'i'])]
    fn truncated_fields_are_malformed(#[case] bytes: &[u8]) {
        let err = decode(bytes, 0).unwrap_err();
        assert!(matches!(err, NdefError::MalformedRecord { offset: 0, .. }), "{err:?}");
    }

    #[test]
    fn reserved_tnf_is_preserved_by_default() {
        let bytes = [0xD7, 0x01, 0x01, b'x', 0x42];
        let (decoded, _) = decode(&bytes, 0).unwrap();
        assert_eq!(decoded.record.tnf, Tnf::Reserved);
        assert_eq!(encode(&decoded.record, Framing::SOLE).unwrap(), bytes);
    }

    #[rstest]
    #[case::reserved(&[0xD7, 0x01, 0x01, b'x', 0x42])]
    #[case::empty_with_payload(&[0xD0, 0x00, 0x01, 0x42])]
    #[case::unknown_with_type(&[0xD5, 0x01, 0x00, b'x'])]
    #[case::well_known_without_type(&[0xD1, 0x00, 0x00])]
    fn strict_policy_rejects(#[case] bytes: &[u8]) {
        assert!(decode(bytes, 0).is_ok());
        assert!(matches!(
            decode_with(bytes, 0, DecodePolicy::STRICT),
            Err(NdefError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn encode_matches_known_bytes() {
        let bytes = encode(&text_record(), Framing::SOLE).unwrap();
        assert_eq!(
            bytes,
            vec![0xD1, 0x01, 0x08, b'T', 0x02, b'e', b'n', b'H', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn encode_leaves_framing_to_caller() {
        let record = text_record();
        let middle = Framing {
            message_begin: false,
            message_end: false,
            chunked: true,
        };
        assert_eq!(encode(&record, middle).unwrap()[0], 0x31);
    }

    #[test]
    fn short_record_boundary() {
        let at_limit = NdefRecord::new(Tnf::Unknown, Vec::new(), vec![0u8; 255]);
        let bytes = encode(&at_limit, Framing::SOLE).unwrap();
        assert_eq!(bytes[0] & FLAG_SR, FLAG_SR);
        assert_eq!(bytes.len(), 3 + 255);

        let over = NdefRecord::new(Tnf::Unknown, Vec::new(), vec![0u8; 256]);
        let bytes = encode(&over, Framing::SOLE).unwrap();
        assert_eq!(bytes[0] & FLAG_SR, 0);
        assert_eq!(&bytes[2..6], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(bytes.len(), 6 + 256);
    }

    #[test]
    fn id_sets_il_flag() {
        let record = text_record().with_id(b"id".to_vec());
        let bytes = encode(&record, Framing::SOLE).unwrap();
        assert_eq!(bytes[0] & FLAG_IL, FLAG_IL);
        assert_eq!(&bytes[1..4], &[0x01, 0x08, 0x02]);
    }

    #[test]
    fn oversized_type_overflows() {
        let record = NdefRecord::new(Tnf::External, vec![b'a'; 256], Vec::new());
        assert!(matches!(
            encode(&record, Framing::SOLE),
            Err(NdefError::Bytes(ByteError::Overflow { width: 1, .. }))
        ));
    }

    #[test]
    fn zero_length_id_survives_round_trip() {
        // MB ME SR IL, TNF=Unknown, id length 0, payload 0x42
        let bytes = [0xDD, 0x00, 0x01, 0x00, 0x42];
        let (decoded, _) = decode(&bytes, 0).unwrap();
        assert_eq!(decoded.record.id, Some(Vec::new()));

        let encoded = encode(&decoded.record, Framing::SOLE).unwrap();
        assert_eq!(encoded, bytes);
        assert_eq!(decode(&encoded, 0).unwrap().0.record, decoded.record);
    }

    #[rstest]
    #[case(text_record())]
    #[case(NdefRecord::empty())]
    #[case(text_record().with_id(b"urn:x".to_vec()))]
    #[case(NdefRecord::new(
        Tnf::MimeMedia,
        b"application/octet-stream".to_vec(),
        vec![7u8; 1000]
    ))]
    #[case(NdefRecord { id: Some(Vec::new()), ..text_record() })]
    fn round_trip(#[case] record: NdefRecord) {
        let bytes = encode(&record, Framing::SOLE).unwrap();
        assert_eq!(encode(&record, Framing::SOLE).unwrap(), bytes);

        let (decoded, consumed) = decode(&bytes, 0).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.record, record);
    }
}
