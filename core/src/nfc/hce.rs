/// NFC HCE command/response engine emulating a DESFire-like contactless card
///
/// One APDU in, one APDU out, always. The reader-side transport cannot
/// recover from an engine that raises instead of responding, so every
/// malformed command maps to a well-formed (if negative) status word.
use crate::platform::RadioCapability;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Header every SELECT-by-AID command starts with
pub const SELECT_AID_PREFIX: [u8; 4] = [0x00, 0xA4, 0x04, 0x00];

/// Success status word
pub const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Generic error status word, returned for empty/unreadable commands
pub const SW_GENERIC_ERROR: [u8; 2] = [0x6F, 0x00];

/// Instruction-not-supported status word
pub const SW_INS_NOT_SUPPORTED: [u8; 2] = [0x6D, 0x00];

/// File-not-found status word, returned on strict AID mismatch
pub const SW_FILE_NOT_FOUND: [u8; 2] = [0x6A, 0x82];

/// Default application identifier presented to readers (hex)
pub const DEFAULT_AID: &str = "F0394148148100";

/// Byte form of [`DEFAULT_AID`]
pub const DEFAULT_AID_BYTES: [u8; 7] = [0xF0, 0x39, 0x41, 0x48, 0x14, 0x81, 0x00];

/// DESFire Get Version instruction code
const INS_GET_VERSION: u8 = 0x5A;

/// DESFire Authenticate instruction code
const INS_AUTHENTICATE: u8 = 0x60;

/// Engine selection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HceState {
    /// No AID selected yet
    Idle,
    /// A SELECT was accepted; the reader is talking to our application
    Selected,
}

/// Engine configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HceConfig {
    /// Match the SELECT command's AID payload against the configured AID
    /// instead of accepting any SELECT. Off by default: readers in the
    /// field select with AIDs the handset has no business rejecting.
    pub strict_aid_matching: bool,
}

/// Errors for HCE lifecycle operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NfcError {
    #[error("NFC hardware not available")]
    HardwareUnavailable,
    #[error("NFC is disabled")]
    HardwareDisabled,
    #[error("Invalid AID: {0}")]
    InvalidAid(String),
}

/// Parse a hex AID string into bytes.
pub fn parse_aid(aid_hex: &str) -> Result<Vec<u8>, NfcError> {
    hex::decode(aid_hex).map_err(|_| NfcError::InvalidAid(aid_hex.to_string()))
}

#[derive(Debug, Clone)]
struct HceSession {
    aid: Vec<u8>,
    credential: Vec<u8>,
    access_rights: String,
    state: HceState,
}

impl Default for HceSession {
    fn default() -> Self {
        Self {
            aid: DEFAULT_AID_BYTES.to_vec(),
            credential: Vec::new(),
            access_rights: "READ_WRITE".to_string(),
            state: HceState::Idle,
        }
    }
}

/// The HCE request/response state machine.
///
/// Cheaply cloneable; clones share the same session.
#[derive(Clone)]
pub struct HceEngine {
    capability: Arc<dyn RadioCapability>,
    config: HceConfig,
    session: Arc<RwLock<HceSession>>,
}

impl HceEngine {
    /// Create an engine over the given NFC capability provider.
    pub fn new(capability: Arc<dyn RadioCapability>) -> Self {
        Self::with_config(capability, HceConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(capability: Arc<dyn RadioCapability>, config: HceConfig) -> Self {
        Self {
            capability,
            config,
            session: Arc::new(RwLock::new(HceSession::default())),
        }
    }

    /// Check that card emulation can run at all.
    ///
    /// Fails when the NFC controller is missing or switched off; succeeds
    /// without side effects otherwise.
    pub fn activate(&self) -> Result<(), NfcError> {
        if !self.capability.is_available() {
            return Err(NfcError::HardwareUnavailable);
        }
        if !self.capability.is_enabled() {
            return Err(NfcError::HardwareDisabled);
        }
        debug!(aid = %hex::encode_upper(&self.session.read().aid), "HCE active");
        Ok(())
    }

    /// Replace the session's AID and credential atomically.
    ///
    /// Resets selection state: the reader has to SELECT again.
    pub fn configure(&self, aid: Vec<u8>, credential: Vec<u8>) {
        let mut session = self.session.write();
        session.aid = aid;
        session.credential = credential;
        session.state = HceState::Idle;
    }

    /// Replace only the credential bytes and their access-rights label.
    pub fn set_credential(&self, credential: Vec<u8>, access_rights: impl Into<String>) {
        let mut session = self.session.write();
        session.credential = credential;
        session.access_rights = access_rights.into();
    }

    /// Currently configured AID
    pub fn aid(&self) -> Vec<u8> {
        self.session.read().aid.clone()
    }

    /// Currently configured credential bytes
    pub fn credential(&self) -> Vec<u8> {
        self.session.read().credential.clone()
    }

    /// Access-rights label attached to the credential
    pub fn access_rights(&self) -> String {
        self.session.read().access_rights.clone()
    }

    /// Whether a SELECT has been accepted since the last configure/deactivate
    pub fn is_selected(&self) -> bool {
        self.session.read().state == HceState::Selected
    }

    /// Handle one command APDU and produce its response.
    ///
    /// Dispatch order: empty command, SELECT-by-AID header, then DESFire
    /// instruction byte. DESFire instructions are answered even before a
    /// SELECT was seen; real cards reject that, but readers in the field
    /// tolerate the permissive behavior and some depend on it.
    pub fn handle_apdu(&self, command: &[u8]) -> Vec<u8> {
        if command.is_empty() {
            debug!("empty APDU");
            return SW_GENERIC_ERROR.to_vec();
        }

        debug!(
            apdu = %hex::encode_upper(command),
            len = command.len(),
            "reader command"
        );

        if command.len() >= SELECT_AID_PREFIX.len() && command[..4] == SELECT_AID_PREFIX {
            return self.handle_select(command);
        }

        match command.get(1) {
            Some(&INS_GET_VERSION) => {
                debug!("Get Version");
                SW_SUCCESS.to_vec()
            }
            Some(&INS_AUTHENTICATE) => {
                debug!("Authenticate");
                SW_SUCCESS.to_vec()
            }
            Some(ins) => {
                debug!(ins = %format!("{ins:02X}"), "unsupported instruction");
                SW_INS_NOT_SUPPORTED.to_vec()
            }
            // Single-byte command: no instruction byte to dispatch on
            None => SW_GENERIC_ERROR.to_vec(),
        }
    }

    /// Deactivation notice from the transport: the reader disengaged.
    pub fn on_deactivated(&self, reason: i32) {
        self.session.write().state = HceState::Idle;
        debug!(reason, "HCE deactivated");
    }

    fn handle_select(&self, command: &[u8]) -> Vec<u8> {
        let mut session = self.session.write();

        if self.config.strict_aid_matching && !Self::select_matches(command, &session.aid) {
            debug!("SELECT rejected: AID mismatch");
            return SW_FILE_NOT_FOUND.to_vec();
        }

        session.state = HceState::Selected;
        debug!("SELECT accepted");
        SW_SUCCESS.to_vec()
    }

    // SELECT layout: CLA INS P1 P2 Lc AID... — compare the Lc-sized payload.
    fn select_matches(command: &[u8], aid: &[u8]) -> bool {
        let Some(&lc) = command.get(4) else {
            return false;
        };
        let payload = command.get(5..5 + lc as usize);
        payload == Some(aid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{AlwaysOnRadio, MockRadioCapability};

    fn engine() -> HceEngine {
        HceEngine::new(Arc::new(AlwaysOnRadio))
    }

    #[test]
    fn test_empty_apdu_returns_generic_error() {
        assert_eq!(engine().handle_apdu(&[]), vec![0x6F, 0x00]);
    }

    #[test]
    fn test_single_byte_apdu_returns_generic_error() {
        assert_eq!(engine().handle_apdu(&[0x00]), vec![0x6F, 0x00]);
    }

    #[test]
    fn test_select_aid_returns_success_regardless_of_suffix() {
        let engine = engine();
        assert_eq!(
            engine.handle_apdu(&[0x00, 0xA4, 0x04, 0x00]),
            vec![0x90, 0x00]
        );
        assert_eq!(
            engine.handle_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x07, 0xF0, 0x39, 0x41, 0x48, 0x14, 0x81, 0x00]),
            vec![0x90, 0x00]
        );
        assert_eq!(
            engine.handle_apdu(&[0x00, 0xA4, 0x04, 0x00, 0xFF, 0xFF]),
            vec![0x90, 0x00]
        );
    }

    #[test]
    fn test_select_transitions_to_selected() {
        let engine = engine();
        assert!(!engine.is_selected());
        engine.handle_apdu(&[0x00, 0xA4, 0x04, 0x00]);
        assert!(engine.is_selected());
    }

    #[test]
    fn test_get_version_returns_success() {
        assert_eq!(engine().handle_apdu(&[0x00, 0x5A, 0x00]), vec![0x90, 0x00]);
    }

    #[test]
    fn test_authenticate_returns_success() {
        assert_eq!(engine().handle_apdu(&[0x00, 0x60]), vec![0x90, 0x00]);
    }

    #[test]
    fn test_unknown_instruction_not_supported() {
        assert_eq!(engine().handle_apdu(&[0x00, 0x99, 0x01]), vec![0x6D, 0x00]);
        assert_eq!(engine().handle_apdu(&[0x00, 0x00]), vec![0x6D, 0x00]);
    }

    #[test]
    fn test_desfire_commands_answered_in_idle_state() {
        // Permissive by design: no SELECT required before DESFire dispatch
        let engine = engine();
        assert!(!engine.is_selected());
        assert_eq!(engine.handle_apdu(&[0x00, 0x5A]), vec![0x90, 0x00]);
    }

    #[test]
    fn test_configure_replaces_session_and_resets_selection() {
        let engine = engine();
        engine.handle_apdu(&[0x00, 0xA4, 0x04, 0x00]);
        assert!(engine.is_selected());

        engine.configure(vec![0xA0, 0x00], vec![0x01, 0x02]);
        assert!(!engine.is_selected());
        assert_eq!(engine.aid(), vec![0xA0, 0x00]);
        assert_eq!(engine.credential(), vec![0x01, 0x02]);
    }

    #[test]
    fn test_set_credential_keeps_aid() {
        let engine = engine();
        let aid = engine.aid();
        engine.set_credential(vec![0xCC], "READ_ONLY");
        assert_eq!(engine.aid(), aid);
        assert_eq!(engine.credential(), vec![0xCC]);
        assert_eq!(engine.access_rights(), "READ_ONLY");
    }

    #[test]
    fn test_default_aid() {
        let engine = engine();
        assert_eq!(hex::encode_upper(engine.aid()), DEFAULT_AID);
    }

    #[test]
    fn test_parse_aid_rejects_non_hex() {
        assert!(parse_aid("zz").is_err());
        assert_eq!(
            parse_aid("F0394148148100").expect("Valid AID"),
            vec![0xF0, 0x39, 0x41, 0x48, 0x14, 0x81, 0x00]
        );
    }

    #[test]
    fn test_on_deactivated_resets_selection() {
        let engine = engine();
        engine.handle_apdu(&[0x00, 0xA4, 0x04, 0x00]);
        engine.on_deactivated(0);
        assert!(!engine.is_selected());
    }

    #[test]
    fn test_activate_checks_capability() {
        let mut missing = MockRadioCapability::new();
        missing.expect_is_available().return_const(false);
        let engine = HceEngine::new(Arc::new(missing));
        assert_eq!(engine.activate(), Err(NfcError::HardwareUnavailable));

        let mut disabled = MockRadioCapability::new();
        disabled.expect_is_available().return_const(true);
        disabled.expect_is_enabled().return_const(false);
        let engine = HceEngine::new(Arc::new(disabled));
        assert_eq!(engine.activate(), Err(NfcError::HardwareDisabled));

        assert!(self::engine().activate().is_ok());
    }

    #[test]
    fn test_strict_matching_accepts_configured_aid() {
        let engine = HceEngine::with_config(
            Arc::new(AlwaysOnRadio),
            HceConfig {
                strict_aid_matching: true,
            },
        );
        engine.configure(vec![0xF0, 0x39], vec![]);

        let select = [0x00, 0xA4, 0x04, 0x00, 0x02, 0xF0, 0x39];
        assert_eq!(engine.handle_apdu(&select), vec![0x90, 0x00]);
        assert!(engine.is_selected());
    }

    #[test]
    fn test_strict_matching_rejects_other_aid() {
        let engine = HceEngine::with_config(
            Arc::new(AlwaysOnRadio),
            HceConfig {
                strict_aid_matching: true,
            },
        );
        engine.configure(vec![0xF0, 0x39], vec![]);

        let select = [0x00, 0xA4, 0x04, 0x00, 0x02, 0xAA, 0xBB];
        assert_eq!(engine.handle_apdu(&select), vec![0x6A, 0x82]);
        assert!(!engine.is_selected());

        // Truncated payload is a mismatch, not a panic
        let short = [0x00, 0xA4, 0x04, 0x00, 0x07, 0xF0];
        assert_eq!(engine.handle_apdu(&short), vec![0x6A, 0x82]);
    }

    #[test]
    fn test_clones_share_session() {
        let engine = engine();
        let clone = engine.clone();
        engine.configure(vec![0x01], vec![0x02]);
        assert_eq!(clone.aid(), vec![0x01]);
    }
}
