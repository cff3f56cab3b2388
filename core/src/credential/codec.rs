//! Binary credential layouts.
//!
//! All operations here are pure and total. Unparsable numeric input is
//! recovered with documented fallback constants instead of an error: the
//! transports on the other end of these bytes cannot do anything useful with
//! a parse failure, so callers validate upstream and the codec stays lenient.

use uuid::Uuid;

/// Serial substituted when a CSN string does not parse as a number
pub const CSN_FALLBACK_SERIAL: u64 = 1;

/// Expiry sentinel meaning "no expiry / invalid date"
pub const NO_EXPIRY_SENTINEL: u32 = 0xFFFF_FFFF;

/// Two-byte header opening every Suprema credential
pub const SUPREMA_HEADER: [u8; 2] = [0x53, 0x55];

/// Two-byte iBeacon type/length prefix inside Apple manufacturer data
pub const IBEACON_PREFIX: [u8; 2] = [0x02, 0x15];

/// Encode a card serial number as 8 bytes, most significant byte first.
pub fn encode_csn(serial: u64) -> [u8; 8] {
    serial.to_be_bytes()
}

/// Inverse of [`encode_csn`].
pub fn decode_csn(bytes: &[u8; 8]) -> u64 {
    u64::from_be_bytes(*bytes)
}

/// Parse a CSN string leniently.
///
/// Non-numeric input falls back to [`CSN_FALLBACK_SERIAL`], so the encoded
/// form is `00 00 00 00 00 00 00 01` rather than a failure.
pub fn parse_csn(text: &str) -> u64 {
    text.trim().parse().unwrap_or(CSN_FALLBACK_SERIAL)
}

/// Space-separated uppercase hex rendering of an encoded CSN, for
/// diagnostics and demo output.
pub fn format_csn_hex(serial: u64) -> String {
    encode_csn(serial)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse an expiry date string (YYYYMMDD) leniently.
///
/// Unparsable input falls back to [`NO_EXPIRY_SENTINEL`]. Values wider than
/// 32 bits are truncated to their low 32 bits, matching the fixed-width
/// wire field.
pub fn parse_expiry(text: &str) -> u32 {
    text.trim()
        .parse::<u64>()
        .map(|date| date as u32)
        .unwrap_or(NO_EXPIRY_SENTINEL)
}

/// Suprema credential layout: `[0x53, 0x55] || be32(user_id) || be32(expiry)`.
pub fn encode_suprema(user_id: u32, expiry_yyyymmdd: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    out.extend_from_slice(&SUPREMA_HEADER);
    out.extend_from_slice(&user_id.to_be_bytes());
    out.extend_from_slice(&expiry_yyyymmdd.to_be_bytes());
    out
}

/// iBeacon frame: `[0x02, 0x15] || uuid || be16(major) || be16(minor) || tx`.
///
/// 23 bytes total, carried as Apple manufacturer data in the advertisement.
pub fn encode_ibeacon(uuid: Uuid, major: u16, minor: u16, tx_power: i8) -> Vec<u8> {
    let mut out = Vec::with_capacity(23);
    out.extend_from_slice(&IBEACON_PREFIX);
    out.extend_from_slice(uuid.as_bytes());
    out.extend_from_slice(&major.to_be_bytes());
    out.extend_from_slice(&minor.to_be_bytes());
    out.push(tx_power as u8);
    out
}

/// Legacy credential layout: the text payload's UTF-8 bytes, unmodified.
pub fn encode_legacy(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}
