//! NFC host card emulation.

pub mod hce;

pub use hce::{HceConfig, HceEngine, HceState, NfcError, DEFAULT_AID};
