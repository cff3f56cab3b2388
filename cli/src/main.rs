//! BadgeLink demo CLI.
//!
//! Drives the core engines from the command line: credential encoding, the
//! HCE APDU engine, the encryption vault, and an in-process BLE loopback
//! between a peripheral and a central engine.

use anyhow::{bail, Context, Result};
use badgelink_core::credential::codec;
use badgelink_core::nfc::hce::{parse_aid, HceConfig, HceEngine};
use badgelink_core::platform::{AlwaysOnRadio, MemoryKeyStore};
use badgelink_core::{CredentialVault, WireProfile};
use clap::{Parser, Subcommand};
use std::sync::Arc;

mod sim;

#[derive(Parser)]
#[command(name = "badgelink-cli", version, about = "BadgeLink credential demo tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode a credential into one of the wire layouts
    Encode {
        #[command(subcommand)]
        layout: EncodeLayout,
    },
    /// Feed command APDUs through the NFC HCE engine
    Hce {
        /// Hex-encoded command APDUs, e.g. 00A40400 005A 0099
        apdus: Vec<String>,
        /// Require the SELECT payload to match the configured AID
        #[arg(long)]
        strict: bool,
        /// AID to configure (hex), defaults to the built-in AID
        #[arg(long)]
        aid: Option<String>,
    },
    /// Encrypt a credential with the vault and decrypt it back
    Vault {
        /// Credential text to seal
        text: String,
    },
    /// Run the in-process peripheral/central loopback demo
    Loopback {
        /// Card serial number to advertise
        #[arg(long, default_value = "123456789")]
        csn: String,
    },
}

#[derive(Subcommand)]
enum EncodeLayout {
    /// 8-byte big-endian card serial number
    Csn { serial: String },
    /// Suprema credential: header, user id, expiry date
    Suprema {
        user_id: u32,
        /// Expiry date as YYYYMMDD; unparsable input maps to the no-expiry
        /// sentinel
        expiry: String,
    },
    /// iBeacon manufacturer frame for the combo profile
    Ibeacon,
    /// Legacy text credential, transmitted as UTF-8 bytes
    Legacy { text: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Encode { layout } => encode(layout),
        Command::Hce { apdus, strict, aid } => hce(apdus, strict, aid),
        Command::Vault { text } => vault(&text),
        Command::Loopback { csn } => sim::run_loopback(&csn).await,
    }
}

fn encode(layout: EncodeLayout) -> Result<()> {
    match layout {
        EncodeLayout::Csn { serial } => {
            let serial = codec::parse_csn(&serial);
            println!("serial : {serial}");
            println!("bytes  : {}", codec::format_csn_hex(serial));
        }
        EncodeLayout::Suprema { user_id, expiry } => {
            let expiry = codec::parse_expiry(&expiry);
            let bytes = codec::encode_suprema(user_id, expiry);
            println!("bytes  : {}", hex_spaced(&bytes));
        }
        EncodeLayout::Ibeacon => {
            let request = badgelink_core::advertise_request_for(WireProfile::IBeaconCombo);
            let mfg = request
                .manufacturer_data
                .context("combo profile always carries manufacturer data")?;
            println!("company: {:#06X}", mfg.company_id);
            println!("frame  : {}", hex_spaced(&mfg.payload));
        }
        EncodeLayout::Legacy { text } => {
            println!("bytes  : {}", hex_spaced(&codec::encode_legacy(&text)));
        }
    }
    Ok(())
}

fn hce(apdus: Vec<String>, strict: bool, aid: Option<String>) -> Result<()> {
    if apdus.is_empty() {
        bail!("no APDUs given; try 00A40400 005A 0099");
    }

    let engine = HceEngine::with_config(
        Arc::new(AlwaysOnRadio),
        HceConfig {
            strict_aid_matching: strict,
        },
    );
    if let Some(aid) = aid {
        let aid = parse_aid(&aid)?;
        let credential = engine.credential();
        engine.configure(aid, credential);
    }
    engine.activate()?;

    for apdu in apdus {
        let command = hex::decode(apdu.trim()).with_context(|| format!("bad APDU hex: {apdu}"))?;
        let response = engine.handle_apdu(&command);
        println!(
            "{} -> {}  (selected: {})",
            hex_spaced(&command),
            hex_spaced(&response),
            engine.is_selected()
        );
    }
    Ok(())
}

fn vault(text: &str) -> Result<()> {
    let vault = CredentialVault::new(Arc::new(MemoryKeyStore::new()));
    vault.ensure_key()?;

    let sealed = vault.encrypt(text.as_bytes())?;
    let opened = vault.decrypt(&sealed.ciphertext, &sealed.iv)?;

    let report = serde_json::json!({
        "plaintext": text,
        "ciphertext_hex": sealed.to_hex(),
        "iv_hex": hex::encode_upper(&sealed.iv),
        "roundtrip_ok": opened == text.as_bytes(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
