// src/types.rs
use serde::{Deserialize, Serialize};

/// Type Name Format: how to interpret a record's type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tnf {
    Empty,
    WellKnown,
    MimeMedia,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
    // kept as opaque data on decode
    Reserved,
}

impl Tnf {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Tnf::Empty,
            1 => Tnf::WellKnown,
            2 => Tnf::MimeMedia,
            3 => Tnf::AbsoluteUri,
            4 => Tnf::External,
            5 => Tnf::Unknown,
            6 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Tnf::Empty => 0,
            Tnf::WellKnown => 1,
            Tnf::MimeMedia => 2,
            Tnf::AbsoluteUri => 3,
            Tnf::External => 4,
            Tnf::Unknown => 5,
            Tnf::Unchanged => 6,
            Tnf::Reserved => 7,
        }
    }
}

// Header byte: MB ME CF SR IL TNF(3)
pub const FLAG_MB: u8 = 0x80;
pub const FLAG_ME: u8 = 0x40;
pub const FLAG_CF: u8 = 0x20;
pub const FLAG_SR: u8 = 0x10;
pub const FLAG_IL: u8 = 0x08;
pub const TNF_MASK: u8 = 0x07;

/// Framing flags read from a record header. Not part of the record's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RecordFlags {
    pub message_begin: bool,
    pub message_end: bool,
    pub chunked: bool,
    pub short_record: bool,
    pub id_present: bool,
}

impl RecordFlags {
    pub fn from_header(header: u8) -> Self {
        Self {
            message_begin: header & FLAG_MB != 0,
            message_end: header & FLAG_ME != 0,
            chunked: header & FLAG_CF != 0,
            short_record: header & FLAG_SR != 0,
            id_present: header & FLAG_IL != 0,
        }
    }
}

/// Message-level framing the caller supplies when encoding one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Framing {
    pub message_begin: bool,
    pub message_end: bool,
    pub chunked: bool,
}

impl Framing {
    /// Framing of a record that is the whole message.
    pub const SOLE: Framing = Framing {
        message_begin: true,
        message_end: true,
        chunked: false,
    };

    pub fn at(index: usize, count: usize) -> Self {
        Self {
            message_begin: index == 0,
            message_end: index + 1 == count,
            chunked: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NdefRecord {
    pub tnf: Tnf,
    #[serde(with = "hex_bytes")]
    pub record_type: Vec<u8>,
    #[serde(with = "hex_bytes_opt", default)]
    pub id: Option<Vec<u8>>,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

impl NdefRecord {
    pub fn new(tnf: Tnf, record_type: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tnf,
            record_type: record_type.into(),
            id: None,
            payload: payload.into(),
        }
    }

    /// Sets the id. An empty id means no id at all.
    pub fn with_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        let id = id.into();
        self.id = if id.is_empty() { None } else { Some(id) };
        self
    }

    /// The canonical empty record written to blank tags.
    pub fn empty() -> Self {
        Self::new(Tnf::Empty, Vec::new(), Vec::new())
    }

    pub fn type_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.record_type).ok()
    }

    pub fn id_bytes(&self) -> &[u8] {
        self.id.as_deref().unwrap_or_default()
    }
}

/// A record together with the header flags it was decoded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub record: NdefRecord,
    pub flags: RecordFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NdefMessage {
    pub records: Vec<NdefRecord>,
}

impl NdefMessage {
    pub fn new(records: Vec<NdefRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NdefRecord> {
        self.records.iter()
    }
}

impl From<Vec<NdefRecord>> for NdefMessage {
    fn from(records: Vec<NdefRecord>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<NdefRecord> for NdefMessage {
    fn from_iter<I: IntoIterator<Item = NdefRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a NdefMessage {
    type Item = &'a NdefRecord;
    type IntoIter = std::slice::Iter<'a, NdefRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Decoder options. The default is permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodePolicy {
    /// Reject reserved TNF values and TNF/field combinations the NDEF
    /// format forbids.
    pub strict_tnf: bool,
}

impl DecodePolicy {
    pub const STRICT: DecodePolicy = DecodePolicy { strict_tnf: true };
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
