// src/reader.rs
use anyhow::{Context as _, Result, anyhow, bail};
use log::info;
use pcsc::{Card, Context, Protocols, Scope, ShareMode};

use nfc_ndef::NdefMessage;
use nfc_ndef::apdu;
use nfc_ndef::cards::{self, CardKind, KeyRing, WriteOptions};

fn connect_first_card() -> Result<(Card, CardKind)> {
    let ctx = Context::establish(Scope::User).context("Failed to establish PC/SC context")?;

    let mut readers_buf = [0; 2048];
    let reader = ctx
        .list_readers(&mut readers_buf)?
        .next()
        .ok_or_else(|| anyhow!("No reader connected"))?
        .to_owned();
    info!("Using reader {reader:?}");

    let mut card = ctx
        .connect(&reader, ShareMode::Shared, Protocols::ANY)
        .context("No card found on reader")?;

    let mut names_buf = [0u8; 128];
    let mut atr_buf = [0u8; 64];
    let kind = {
        let status = card.status2(&mut names_buf, &mut atr_buf)?;
        CardKind::from_atr(status.atr())
    };
    let Some(kind) = kind else {
        bail!("Unsupported card type");
    };

    let uid = apdu::get_uid(&mut card)?;
    info!("Card {} detected: {kind:?}", hex::encode(uid));
    Ok((card, kind))
}

pub fn read_first_card() -> Result<NdefMessage> {
    let (mut card, kind) = connect_first_card()?;
    let message = match kind {
        CardKind::Classic(size) => cards::read_mifare(&mut card, size, &KeyRing::default())?,
        CardKind::Ntag => {
            let model = cards::detect_ntag(&mut card)?;
            cards::read_ntag(&mut card, model)?
        }
    };
    Ok(message)
}

pub fn write_first_card(message: &NdefMessage, options: WriteOptions) -> Result<()> {
    let (mut card, kind) = connect_first_card()?;
    match kind {
        CardKind::Classic(_) if options.read_only => {
            bail!("Read-only is only supported on NTAG")
        }
        CardKind::Classic(size) => {
            cards::write_mifare(&mut card, size, &KeyRing::default(), message)?
        }
        CardKind::Ntag => {
            let model = cards::detect_ntag(&mut card)?;
            cards::write_ntag_with(&mut card, model, message, options)?
        }
    }
    Ok(())
}

pub fn lock_first_card() -> Result<()> {
    let (mut card, kind) = connect_first_card()?;
    match kind {
        CardKind::Ntag => {
            let model = cards::detect_ntag(&mut card)?;
            cards::make_read_only(&mut card, model)?
        }
        CardKind::Classic(_) => bail!("Read-only is only supported on NTAG"),
    }
    Ok(())
}
