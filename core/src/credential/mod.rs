//! Transport-agnostic credential model.
//!
//! A [`CredentialInput`] is created once per transmission request and encoded
//! into the binary layout the selected [`WireProfile`] expects before it goes
//! anywhere near a radio.

pub mod codec;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One credential, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialInput {
    /// Opaque bytes, transmitted unmodified (typically AEAD ciphertext)
    Raw(Vec<u8>),
    /// Numeric card serial number, encoded big-endian over 8 bytes
    CardSerialNumber(u64),
    /// User id plus expiry date in YYYYMMDD form
    UserCredential { user_id: u32, expiry_yyyymmdd: u32 },
}

impl CredentialInput {
    /// Encode this credential into the wire layout of `profile`.
    ///
    /// Total: every input encodes under every profile. Inputs without a
    /// natural representation in a profile fall back to the closest layout
    /// rather than failing (see [`codec`] for the per-layout rules).
    pub fn encode(&self, profile: WireProfile) -> Vec<u8> {
        match profile {
            WireProfile::CsnMobile => match self {
                CredentialInput::Raw(bytes) => bytes.clone(),
                CredentialInput::CardSerialNumber(serial) => codec::encode_csn(*serial).to_vec(),
                CredentialInput::UserCredential { user_id, .. } => {
                    codec::encode_csn(u64::from(*user_id)).to_vec()
                }
            },
            WireProfile::Suprema => match self {
                CredentialInput::Raw(bytes) => bytes.clone(),
                CredentialInput::CardSerialNumber(serial) => {
                    codec::encode_suprema(*serial as u32, codec::NO_EXPIRY_SENTINEL)
                }
                CredentialInput::UserCredential {
                    user_id,
                    expiry_yyyymmdd,
                } => codec::encode_suprema(*user_id, *expiry_yyyymmdd),
            },
            WireProfile::Legacy | WireProfile::IBeaconCombo => match self {
                CredentialInput::Raw(bytes) => bytes.clone(),
                CredentialInput::CardSerialNumber(serial) => {
                    codec::encode_legacy(&serial.to_string())
                }
                CredentialInput::UserCredential {
                    user_id,
                    expiry_yyyymmdd,
                } => codec::encode_suprema(*user_id, *expiry_yyyymmdd),
            },
        }
    }
}

/// Wire profile for a BLE peripheral session.
///
/// Exactly one profile is active per session. `IBeaconCombo` is additive
/// framing over `Legacy`: the same GATT service, plus an iBeacon
/// manufacturer-data broadcast alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireProfile {
    /// Single read-only credential characteristic under the legacy UUIDs
    Legacy,
    /// CSN Mobile plus Template-on-Mobile dual-service layout
    CsnMobile,
    /// Suprema-style TX/RX service
    Suprema,
    /// Legacy GATT plus iBeacon manufacturer-data advertisement
    IBeaconCombo,
}

impl fmt::Display for WireProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireProfile::Legacy => write!(f, "Legacy"),
            WireProfile::CsnMobile => write!(f, "CsnMobile"),
            WireProfile::Suprema => write!(f, "Suprema"),
            WireProfile::IBeaconCombo => write!(f, "IBeaconCombo"),
        }
    }
}
