#[cfg(feature = "pcsc")]
mod reader;

use std::num::NonZeroUsize;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, error};
use serde::Serialize;

use nfc_ndef::well_known::{
    AbsoluteUriRecord, ExternalRecord, MimeRecord, TextRecord, UriRecord,
    android_application_record,
};
#[cfg(feature = "pcsc")]
use nfc_ndef::cards::WriteOptions;
use nfc_ndef::{DecodePolicy, KnownRecord, NdefMessage, NdefRecord, message, mifare, tlv};

#[derive(Parser, Debug)]
#[command(
    name = "nfc-ndef",
    version,
    about = "Encode and decode NDEF messages and MIFARE Classic addresses"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a hex encoded NDEF message and print it as JSON
    Decode {
        /// Message bytes as hex
        data: String,
        /// Input is raw tag memory holding an NDEF TLV
        #[arg(long)]
        tlv: bool,
        /// Reject reserved TNF values and invalid TNF/field combinations
        #[arg(long)]
        strict: bool,
    },
    /// Encode a single-record NDEF message and print it as hex
    Encode {
        /// Wrap the message in an NDEF TLV ready for tag memory
        #[arg(long)]
        tlv: bool,
        /// Split payloads larger than this into chunked records
        #[arg(long)]
        chunk_size: Option<NonZeroUsize>,
        #[command(subcommand)]
        record: RecordArg,
    },
    /// Print MIFARE Classic addressing for a sector or a block
    Mifare {
        #[arg(
            long,
            conflicts_with = "block",
            required_unless_present = "block",
            allow_hyphen_values = true
        )]
        sector: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        block: Option<i64>,
        /// Tag size in bytes (320, 1024, 2048 or 4096)
        #[arg(long, default_value_t = 1024)]
        size: usize,
    },
    /// Read the NDEF message from the card on the first PC/SC reader
    #[cfg(feature = "pcsc")]
    Read,
    /// Write a single-record NDEF message to the card on the first PC/SC reader
    #[cfg(feature = "pcsc")]
    Write {
        /// Lock the tag after writing (NTAG only, cannot be undone)
        #[arg(long)]
        read_only: bool,
        #[command(subcommand)]
        record: RecordArg,
    },
    /// Format the card with an empty NDEF message
    #[cfg(feature = "pcsc")]
    Format {
        /// Lock the tag after formatting (NTAG only, cannot be undone)
        #[arg(long)]
        read_only: bool,
    },
    /// Make the card on the first PC/SC reader permanently read-only (NTAG only)
    #[cfg(feature = "pcsc")]
    Lock,
}

#[derive(Subcommand, Debug, Clone)]
enum RecordArg {
    /// Well-known text record
    Text {
        text: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long)]
        utf16: bool,
    },
    /// Well-known URI record, prefix abbreviated automatically
    Uri { uri: String },
    /// MIME media record with a hex payload
    Mime {
        mime_type: String,
        #[arg(long, default_value = "")]
        data: String,
    },
    /// Absolute URI record
    AbsoluteUri { uri: String },
    /// NFC Forum external type record with a hex payload
    External {
        domain: String,
        type_name: String,
        #[arg(long, default_value = "")]
        data: String,
    },
    /// Android application record
    AndroidApp { package: String },
}

impl RecordArg {
    fn into_known(self) -> Result<KnownRecord> {
        let known = match self {
            RecordArg::Text { text, lang, utf16 } => {
                let record = TextRecord::new(text, lang);
                let record = if utf16 { record.utf16() } else { record };
                record.into()
            }
            RecordArg::Uri { uri } => UriRecord::new(uri).into(),
            RecordArg::Mime { mime_type, data } => {
                let data = hex::decode(data).context("MIME payload is not valid hex")?;
                MimeRecord::new(mime_type, data).into()
            }
            RecordArg::AbsoluteUri { uri } => AbsoluteUriRecord::new(uri).into(),
            RecordArg::External {
                domain,
                type_name,
                data,
            } => {
                let data = hex::decode(data).context("external payload is not valid hex")?;
                ExternalRecord::new(domain, type_name, data).into()
            }
            RecordArg::AndroidApp { package } => android_application_record(&package).into(),
        };
        Ok(known)
    }

    fn into_message(self) -> Result<NdefMessage> {
        let record = self.into_known()?.build()?;
        Ok(NdefMessage::new(vec![record]))
    }
}

#[derive(Serialize)]
struct RecordView<'a> {
    #[serde(flatten)]
    record: &'a NdefRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    known: Option<KnownRecord>,
}

fn print_message(message: &NdefMessage) -> Result<()> {
    let views: Vec<RecordView<'_>> = message
        .iter()
        .map(|record| RecordView {
            record,
            known: KnownRecord::parse(record)
                .inspect_err(|err| debug!("record not interpreted: {err}"))
                .ok(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

#[derive(Serialize)]
struct MifareView {
    sector: u8,
    first_block: u8,
    block_count: u8,
    trailer_block: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_in_sector: Option<u8>,
}

fn mifare_view(sector: Option<i64>, block: Option<i64>, size: usize) -> Result<MifareView> {
    let size = mifare::TagSize::from_bytes(size)?;
    let address = match (sector, block) {
        (_, Some(block)) => Some(mifare::MifareAddress::from_block(block)?),
        _ => None,
    };
    let sector = match (address, sector) {
        (Some(address), _) => address.sector as i64,
        (None, Some(sector)) => sector,
        (None, None) => anyhow::bail!("either --sector or --block is required"),
    };
    if sector >= size.sector_count() as i64 {
        return Err(nfc_ndef::MifareError::InvalidSector(sector).into());
    }

    Ok(MifareView {
        sector: sector as u8,
        first_block: mifare::sector_to_first_block(sector)?,
        block_count: mifare::block_count_in_sector(sector)?,
        trailer_block: mifare::trailer_block(sector)?,
        block: address.map(|a| a.to_block()),
        block_in_sector: address.map(|a| a.block),
    })
}

fn encode(message: &NdefMessage, chunk_size: Option<NonZeroUsize>, wrap: bool) -> Result<Vec<u8>> {
    let bytes = match chunk_size {
        Some(chunk_size) => message::encode_chunked(message, chunk_size)?,
        None => message::encode(message)?,
    };
    if wrap {
        return Ok(tlv::wrap(&bytes)?);
    }
    Ok(bytes)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Decode { data, tlv, strict } => {
            let input = hex::decode(data.trim()).context("input is not valid hex")?;
            let ndef = if tlv { tlv::unwrap(&input)? } else { &input[..] };
            let policy = DecodePolicy { strict_tnf: strict };
            let message = message::decode_with(ndef, policy)?;
            print_message(&message)
        }
        Command::Encode {
            tlv,
            chunk_size,
            record,
        } => {
            let message = record.into_message()?;
            println!("{}", hex::encode(encode(&message, chunk_size, tlv)?));
            Ok(())
        }
        Command::Mifare {
            sector,
            block,
            size,
        } => {
            let view = mifare_view(sector, block, size)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        #[cfg(feature = "pcsc")]
        Command::Read => {
            let message = reader::read_first_card()?;
            print_message(&message)
        }
        #[cfg(feature = "pcsc")]
        Command::Write { read_only, record } => {
            let message = record.into_message()?;
            reader::write_first_card(&message, WriteOptions { read_only })?;
            println!("Data Written Successfully!");
            Ok(())
        }
        #[cfg(feature = "pcsc")]
        Command::Format { read_only } => {
            reader::write_first_card(&NdefMessage::default(), WriteOptions { read_only })?;
            println!("Tag formatted");
            Ok(())
        }
        #[cfg(feature = "pcsc")]
        Command::Lock => {
            reader::lock_first_card()?;
            println!("Tag is now read-only");
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}
