// src/message.rs
use std::num::NonZeroUsize;

use log::{debug, trace};

use crate::error::NdefError;
use crate::record;
use crate::types::{DecodePolicy, Framing, NdefMessage, NdefRecord, Tnf};

/// Bytes of a message holding only an empty record (MB, ME, SR, TNF=Empty).
pub const EMPTY_MESSAGE: [u8; 3] = [0xD0, 0x00, 0x00];

pub fn decode(bytes: &[u8]) -> Result<NdefMessage, NdefError> {
    decode_with(bytes, DecodePolicy::default())
}

/// Decodes a complete message, reassembling chunked records.
pub fn decode_with(bytes: &[u8], policy: DecodePolicy) -> Result<NdefMessage, NdefError> {
    if bytes.is_empty() {
        return Err(NdefError::EmptyMessage);
    }

    let mut records = Vec::new();
    // first chunk of an open chain, payload accumulated so far
    let mut chain: Option<NdefRecord> = None;
    let mut offset = 0;
    let mut index = 0;
    let mut ended = false;

    while offset < bytes.len() {
        if ended {
            return Err(NdefError::MalformedMessage(format!(
                "{} byte(s) after the message end record",
                bytes.len() - offset
            )));
        }

        let (decoded, consumed) = record::decode_with(bytes, offset, policy)?;
        let flags = decoded.flags;

        if index == 0 && !flags.message_begin {
            return Err(NdefError::MalformedMessage(
                "first record is missing the message begin flag".into(),
            ));
        }
        if index > 0 && flags.message_begin {
            return Err(NdefError::MalformedMessage(format!(
                "record {index} repeats the message begin flag"
            )));
        }

        match chain.as_mut() {
            Some(head) => {
                let chunk = decoded.record;
                if chunk.tnf != Tnf::Unchanged || !chunk.record_type.is_empty() || flags.id_present
                {
                    return Err(NdefError::MalformedMessage(format!(
                        "record {index} continues a chunk chain but is not an unchanged chunk"
                    )));
                }
                trace!("chunk {index}: +{} payload bytes", chunk.payload.len());
                head.payload.extend_from_slice(&chunk.payload);

                if !flags.chunked {
                    if let Some(head) = chain.take() {
                        debug!(
                            "reassembled chunked record of {} bytes",
                            head.payload.len()
                        );
                        records.push(head);
                    }
                }
            }
            None if policy.strict_tnf && decoded.record.tnf == Tnf::Unchanged => {
                return Err(NdefError::MalformedMessage(format!(
                    "record {index} is unchanged but does not continue a chunk chain"
                )));
            }
            None if flags.chunked => {
                trace!("chunk chain opened at record {index}");
                chain = Some(decoded.record);
            }
            None => records.push(decoded.record),
        }

        if flags.message_end {
            if chain.is_some() {
                return Err(NdefError::TruncatedMessage(
                    "message ends inside a chunked record".into(),
                ));
            }
            ended = true;
        }

        offset += consumed;
        index += 1;
    }

    if chain.is_some() {
        return Err(NdefError::TruncatedMessage(
            "input ends inside a chunked record".into(),
        ));
    }
    if !ended {
        return Err(NdefError::TruncatedMessage(
            "input ends before the message end record".into(),
        ));
    }

    Ok(NdefMessage::new(records))
}

/// Encodes a message, setting MB on the first record and ME on the last.
pub fn encode(message: &NdefMessage) -> Result<Vec<u8>, NdefError> {
    if message.is_empty() {
        return Err(NdefError::EmptyMessage);
    }

    let count = message.len();
    let mut out = Vec::new();
    for (i, record) in message.iter().enumerate() {
        out.extend(record::encode(record, Framing::at(i, count))?);
    }
    Ok(out)
}

/// Like [`encode`], but an empty message becomes [`EMPTY_MESSAGE`], which is
/// what a freshly formatted tag holds.
pub fn encode_allow_empty(message: &NdefMessage) -> Result<Vec<u8>, NdefError> {
    if message.is_empty() {
        return Ok(EMPTY_MESSAGE.to_vec());
    }
    encode(message)
}

/// Encodes a message, splitting payloads longer than `chunk_size` into
/// chunk chains.
pub fn encode_chunked(
    message: &NdefMessage,
    chunk_size: NonZeroUsize,
) -> Result<Vec<u8>, NdefError> {
    if message.is_empty() {
        return Err(NdefError::EmptyMessage);
    }

    let mut parts: Vec<(NdefRecord, bool)> = Vec::new();
    for record in message {
        if record.payload.len() <= chunk_size.get() {
            parts.push((record.clone(), false));
            continue;
        }

        let chunks: Vec<&[u8]> = record.payload.chunks(chunk_size.get()).collect();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let part = if i == 0 {
                NdefRecord {
                    tnf: record.tnf,
                    record_type: record.record_type.clone(),
                    id: record.id.clone(),
                    payload: chunk.to_vec(),
                }
            } else {
                NdefRecord::new(Tnf::Unchanged, Vec::new(), chunk.to_vec())
            };
            parts.push((part, i != last));
        }
    }

    let count = parts.len();
    let mut out = Vec::new();
    for (i, (part, chunked)) in parts.iter().enumerate() {
        let framing = Framing {
            chunked: *chunked,
            ..Framing::at(i, count)
        };
        out.extend(record::encode(part, framing)?);
    }
    Ok(out)
}
