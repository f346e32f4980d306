// src/well_known.rs
use std::fmt;

use serde::Serialize;

use crate::error::WellKnownError;
use crate::types::{NdefRecord, Tnf, hex_bytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    Text,
    Uri,
    Mime,
    AbsoluteUri,
    External,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Text => "text",
            RecordKind::Uri => "URI",
            RecordKind::Mime => "MIME",
            RecordKind::AbsoluteUri => "absolute URI",
            RecordKind::External => "external",
        };
        f.write_str(name)
    }
}

/// URI identifier codes from the NFC Forum URI record type definition.
/// Code 0x00 means the payload carries the whole URI.
pub const URI_PREFIXES: [&str; 36] = [
    "",                           // 0x00
    "http://www.",                // 0x01
    "https://www.",               // 0x02
    "http://",                    // 0x03
    "https://",                   // 0x04
    "tel:",                       // 0x05
    "mailto:",                    // 0x06
    "ftp://anonymous:anonymous@", // 0x07
    "ftp://ftp.",                 // 0x08
    "ftps://",                    // 0x09
    "sftp://",                    // 0x0A
    "smb://",                     // 0x0B
    "nfs://",                     // 0x0C
    "ftp://",                     // 0x0D
    "dav://",                     // 0x0E
    "news:",                      // 0x0F
    "telnet://",                  // 0x10
    "imap:",                      // 0x11
    "rtsp://",                    // 0x12
    "urn:",                       // 0x13
    "pop:",                       // 0x14
    "sip:",                       // 0x15
    "sips:",                      // 0x16
    "tftp:",                      // 0x17
    "btspp://",                   // 0x18
    "btl2cap://",                 // 0x19
    "btgoep://",                  // 0x1A
    "tcpobex://",                 // 0x1B
    "irdaobex://",                // 0x1C
    "file://",                    // 0x1D
    "urn:epc:id:",                // 0x1E
    "urn:epc:tag:",               // 0x1F
    "urn:epc:pat:",               // 0x20
    "urn:epc:raw:",               // 0x21
    "urn:epc:",                   // 0x22
    "urn:nfc:",                   // 0x23
];

pub const TEXT_TYPE: &[u8] = b"T";
pub const URI_TYPE: &[u8] = b"U";

const TEXT_UTF16: u8 = 0x80;
const TEXT_LANG_MASK: u8 = 0x3F;

/// A typed view over one record kind.
pub trait WellKnownRecord: Sized {
    const KIND: RecordKind;

    fn build(&self) -> Result<NdefRecord, WellKnownError>;

    /// Fails with `NotThisKind` when `record` is some other kind.
    fn parse(record: &NdefRecord) -> Result<Self, WellKnownError>;
}

fn not_this_kind<T>(expected: RecordKind) -> Result<T, WellKnownError> {
    Err(WellKnownError::NotThisKind { expected })
}

fn malformed(kind: RecordKind, reason: impl Into<String>) -> WellKnownError {
    WellKnownError::MalformedPayload {
        kind,
        reason: reason.into(),
    }
}

fn invalid(kind: RecordKind, reason: impl Into<String>) -> WellKnownError {
    WellKnownError::InvalidField {
        kind,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRecord {
    pub text: String,
    pub lang: String,
    pub encoding: TextEncoding,
}

impl TextRecord {
    pub fn new(text: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: lang.into(),
            encoding: TextEncoding::Utf8,
        }
    }

    pub fn utf16(mut self) -> Self {
        self.encoding = TextEncoding::Utf16;
        self
    }
}

impl WellKnownRecord for TextRecord {
    const KIND: RecordKind = RecordKind::Text;

    fn build(&self) -> Result<NdefRecord, WellKnownError> {
        let lang = self.lang.as_bytes();
        if !self.lang.is_ascii() || lang.len() > TEXT_LANG_MASK as usize {
            return Err(invalid(
                Self::KIND,
                format!("language code `{}` must be ASCII and at most 63 bytes", self.lang),
            ));
        }

        // Status byte: encoding (bit 7) | lang length (bits 0-5)
        let mut status = lang.len() as u8;
        if self.encoding == TextEncoding::Utf16 {
            status |= TEXT_UTF16;
        }

        let mut payload = vec![status];
        payload.extend_from_slice(lang);
        match self.encoding {
            TextEncoding::Utf8 => payload.extend_from_slice(self.text.as_bytes()),
            TextEncoding::Utf16 => {
                // a leading U+FEFF or U+FFFE would be read back as a byte order mark
                if self.text.starts_with(['\u{feff}', '\u{fffe}']) {
                    payload.extend_from_slice(&UTF16_BE_BOM);
                }
                payload.extend(self.text.encode_utf16().flat_map(u16::to_be_bytes));
            }
        }

        Ok(NdefRecord::new(Tnf::WellKnown, TEXT_TYPE, payload))
    }

    fn parse(record: &NdefRecord) -> Result<Self, WellKnownError> {
        if record.tnf != Tnf::WellKnown || record.record_type != TEXT_TYPE {
            return not_this_kind(Self::KIND);
        }

        let (&status, rest) = record
            .payload
            .split_first()
            .ok_or_else(|| malformed(Self::KIND, "missing status byte"))?;
        let lang_len = (status & TEXT_LANG_MASK) as usize;
        if lang_len > rest.len() {
            return Err(malformed(
                Self::KIND,
                format!(
                    "language code of {lang_len} bytes overruns a {} byte payload",
                    record.payload.len()
                ),
            ));
        }

        let (lang, text) = rest.split_at(lang_len);
        let lang = std::str::from_utf8(lang)
            .map_err(|_| malformed(Self::KIND, "language code is not ASCII"))?
            .to_string();

        let (encoding, text) = if status & TEXT_UTF16 != 0 {
            (TextEncoding::Utf16, decode_utf16(text)?)
        } else {
            let text = std::str::from_utf8(text)
                .map_err(|_| malformed(Self::KIND, "text is not valid UTF-8"))?;
            (TextEncoding::Utf8, text.to_string())
        };

        Ok(Self {
            text,
            lang,
            encoding,
        })
    }
}

const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];

fn decode_utf16(bytes: &[u8]) -> Result<String, WellKnownError> {
    if bytes.len() % 2 != 0 {
        return Err(malformed(RecordKind::Text, "odd UTF-16 byte count"));
    }

    // big-endian unless a byte order mark says otherwise
    let (little_endian, body) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => (false, bytes),
    };

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            if little_endian {
                u16::from_le_bytes(pair)
            } else {
                u16::from_be_bytes(pair)
            }
        })
        .collect();

    String::from_utf16(&units).map_err(|_| malformed(RecordKind::Text, "text is not valid UTF-16"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UriRecord {
    pub uri: String,
}

impl UriRecord {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// Longest abbreviation matching the start of `uri`, as (code, prefix length).
    pub fn abbreviation(uri: &str) -> (u8, usize) {
        URI_PREFIXES
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, prefix)| uri.starts_with(*prefix))
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(code, prefix)| (code as u8, prefix.len()))
            .unwrap_or((0, 0))
    }
}

impl WellKnownRecord for UriRecord {
    const KIND: RecordKind = RecordKind::Uri;

    fn build(&self) -> Result<NdefRecord, WellKnownError> {
        let (code, prefix_len) = Self::abbreviation(&self.uri);

        let mut payload = vec![code];
        payload.extend_from_slice(&self.uri.as_bytes()[prefix_len..]);
        Ok(NdefRecord::new(Tnf::WellKnown, URI_TYPE, payload))
    }

    fn parse(record: &NdefRecord) -> Result<Self, WellKnownError> {
        if record.tnf != Tnf::WellKnown || record.record_type != URI_TYPE {
            return not_this_kind(Self::KIND);
        }

        let (&code, rest) = record
            .payload
            .split_first()
            .ok_or_else(|| malformed(Self::KIND, "missing identifier code"))?;
        let prefix = URI_PREFIXES
            .get(code as usize)
            .ok_or_else(|| malformed(Self::KIND, format!("unknown identifier code {code:#04x}")))?;
        let rest = std::str::from_utf8(rest)
            .map_err(|_| malformed(Self::KIND, "URI is not valid UTF-8"))?;

        Ok(Self::new(format!("{prefix}{rest}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MimeRecord {
    pub mime_type: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl MimeRecord {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

impl WellKnownRecord for MimeRecord {
    const KIND: RecordKind = RecordKind::Mime;

    fn build(&self) -> Result<NdefRecord, WellKnownError> {
        if self.mime_type.is_empty() || !self.mime_type.is_ascii() {
            return Err(invalid(Self::KIND, "MIME type must be non-empty ASCII"));
        }
        Ok(NdefRecord::new(
            Tnf::MimeMedia,
            self.mime_type.as_bytes(),
            self.data.clone(),
        ))
    }

    fn parse(record: &NdefRecord) -> Result<Self, WellKnownError> {
        if record.tnf != Tnf::MimeMedia {
            return not_this_kind(Self::KIND);
        }
        let mime_type = record
            .type_str()
            .ok_or_else(|| malformed(Self::KIND, "MIME type is not valid UTF-8"))?;
        Ok(Self::new(mime_type, record.payload.clone()))
    }
}

/// The record type is the URI; the payload is left empty on build and
/// ignored on parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbsoluteUriRecord {
    pub uri: String,
}

impl AbsoluteUriRecord {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl WellKnownRecord for AbsoluteUriRecord {
    const KIND: RecordKind = RecordKind::AbsoluteUri;

    fn build(&self) -> Result<NdefRecord, WellKnownError> {
        if self.uri.is_empty() {
            return Err(invalid(Self::KIND, "URI must not be empty"));
        }
        Ok(NdefRecord::new(
            Tnf::AbsoluteUri,
            self.uri.as_bytes(),
            Vec::new(),
        ))
    }

    fn parse(record: &NdefRecord) -> Result<Self, WellKnownError> {
        if record.tnf != Tnf::AbsoluteUri {
            return not_this_kind(Self::KIND);
        }
        let uri = record
            .type_str()
            .ok_or_else(|| malformed(Self::KIND, "URI is not valid UTF-8"))?;
        Ok(Self::new(uri))
    }
}

/// NFC Forum external type `domain:type`. Both parts are case-insensitive
/// and stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalRecord {
    pub domain: String,
    pub type_name: String,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl ExternalRecord {
    pub fn new(
        domain: impl Into<String>,
        type_name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            domain: domain.into().to_lowercase(),
            type_name: type_name.into().to_lowercase(),
            data: data.into(),
        }
    }

    pub fn record_type(&self) -> String {
        format!("{}:{}", self.domain, self.type_name)
    }
}

impl WellKnownRecord for ExternalRecord {
    const KIND: RecordKind = RecordKind::External;

    fn build(&self) -> Result<NdefRecord, WellKnownError> {
        if self.domain.is_empty() || self.type_name.is_empty() {
            return Err(invalid(Self::KIND, "domain and type must not be empty"));
        }
        if self.domain.contains(':') {
            return Err(invalid(Self::KIND, "domain must not contain ':'"));
        }
        Ok(NdefRecord::new(
            Tnf::External,
            self.record_type().to_lowercase(),
            self.data.clone(),
        ))
    }

    fn parse(record: &NdefRecord) -> Result<Self, WellKnownError> {
        if record.tnf != Tnf::External {
            return not_this_kind(Self::KIND);
        }
        let record_type = record
            .type_str()
            .ok_or_else(|| malformed(Self::KIND, "type is not valid UTF-8"))?;
        let (domain, type_name) = record_type
            .split_once(':')
            .ok_or_else(|| malformed(Self::KIND, format!("type `{record_type}` has no ':'")))?;
        Ok(Self::new(domain, type_name, record.payload.clone()))
    }
}

/// Android Application Record: opens (or installs) `package` on Android.
pub fn android_application_record(package: &str) -> ExternalRecord {
    ExternalRecord::new("android.com", "pkg", package.as_bytes())
}

/// One of the record kinds this crate understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum KnownRecord {
    Text(TextRecord),
    Uri(UriRecord),
    Mime(MimeRecord),
    AbsoluteUri(AbsoluteUriRecord),
    External(ExternalRecord),
}

impl KnownRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            KnownRecord::Text(_) => RecordKind::Text,
            KnownRecord::Uri(_) => RecordKind::Uri,
            KnownRecord::Mime(_) => RecordKind::Mime,
            KnownRecord::AbsoluteUri(_) => RecordKind::AbsoluteUri,
            KnownRecord::External(_) => RecordKind::External,
        }
    }

    pub fn build(&self) -> Result<NdefRecord, WellKnownError> {
        match self {
            KnownRecord::Text(r) => r.build(),
            KnownRecord::Uri(r) => r.build(),
            KnownRecord::Mime(r) => r.build(),
            KnownRecord::AbsoluteUri(r) => r.build(),
            KnownRecord::External(r) => r.build(),
        }
    }

    /// Tries each kind in a fixed order (Text, Uri, Mime, AbsoluteUri,
    /// External) and returns the first answer that is not `NotThisKind`.
    pub fn parse(record: &NdefRecord) -> Result<Self, WellKnownError> {
        let attempts: [fn(&NdefRecord) -> Result<KnownRecord, WellKnownError>; 5] = [
            |r| TextRecord::parse(r).map(KnownRecord::Text),
            |r| UriRecord::parse(r).map(KnownRecord::Uri),
            |r| MimeRecord::parse(r).map(KnownRecord::Mime),
            |r| AbsoluteUriRecord::parse(r).map(KnownRecord::AbsoluteUri),
            |r| ExternalRecord::parse(r).map(KnownRecord::External),
        ];

        let mut last = WellKnownError::NotThisKind {
            expected: RecordKind::External,
        };
        for attempt in attempts {
            match attempt(record) {
                Err(err) if err.is_not_this_kind() => last = err,
                result => return result,
            }
        }
        Err(last)
    }
}

impl From<TextRecord> for KnownRecord {
    fn from(r: TextRecord) -> Self {
        KnownRecord::Text(r)
    }
}

impl From<UriRecord> for KnownRecord {
    fn from(r: UriRecord) -> Self {
        KnownRecord::Uri(r)
    }
}

impl From<MimeRecord> for KnownRecord {
    fn from(r: MimeRecord) -> Self {
        KnownRecord::Mime(r)
    }
}

impl From<AbsoluteUriRecord> for KnownRecord {
    fn from(r: AbsoluteUriRecord) -> Self {
        KnownRecord::AbsoluteUri(r)
    }
}

impl From<ExternalRecord> for KnownRecord {
    fn from(r: ExternalRecord) -> Self {
        KnownRecord::External(r)
    }
}
