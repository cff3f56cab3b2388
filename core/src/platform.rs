//! Platform collaborator contracts.
//!
//! The core never touches radio or keystore hardware directly. Each engine
//! talks to the platform through one of the traits below: a synchronous
//! accept/reject call goes out, and the substantive result comes back later
//! through the engine's callback methods.

use crate::ble::profile::{AdvertiseRequest, GattProfile, ScanConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// Capability snapshot for a single radio (NFC or BLE).
#[cfg_attr(test, mockall::automock)]
pub trait RadioCapability: Send + Sync {
    /// Whether the radio hardware exists on this device
    fn is_available(&self) -> bool;
    /// Whether the radio is currently switched on
    fn is_enabled(&self) -> bool;
    /// Whether the capability grant for this radio has been given
    fn has_permission(&self) -> bool;
}

/// Peripheral-side BLE transport: advertising plus a GATT server.
///
/// `start_advertising` receives the full advertisement descriptor and the
/// GATT profile to expose; read requests from remote centrals come back via
/// [`crate::ble::peripheral::PeripheralEngine::on_characteristic_read`].
pub trait BleAdvertiser: Send + Sync {
    fn start_advertising(
        &self,
        request: &AdvertiseRequest,
        profile: &GattProfile,
    ) -> Result<(), String>;
    fn stop_advertising(&self);
}

/// Central-side BLE transport: scanning and a single GATT client session.
///
/// Every method is accept/reject only; discovery results, read payloads and
/// notification data arrive through the central engine's callbacks.
pub trait BleConnector: Send + Sync {
    fn start_scan(&self, config: &ScanConfig) -> Result<(), String>;
    fn stop_scan(&self);
    fn connect(&self, address: &str) -> Result<(), String>;
    fn disconnect(&self);
    fn discover_services(&self);
    fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<(), String>;
    fn write_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), String>;
    fn write_descriptor(
        &self,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), String>;
    fn set_notifications(&self, service: Uuid, characteristic: Uuid, enabled: bool);
}

/// Protected key storage outside the process's general memory.
///
/// Implementations are expected to be backed by a hardware keystore on a
/// real device. Key material passes through this boundary only at
/// create/load time; callers of the vault never see it.
pub trait SecureKeyStore: Send + Sync {
    fn save_key(&self, alias: &str, material: &[u8]) -> Result<(), String>;
    fn load_key(&self, alias: &str) -> Option<Vec<u8>>;
}

/// Capability provider that reports everything present, enabled and
/// granted. For demos and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnRadio;

impl RadioCapability for AlwaysOnRadio {
    fn is_available(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn has_permission(&self) -> bool {
        true
    }
}

/// In-memory [`SecureKeyStore`] for demos and tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn save_key(&self, alias: &str, material: &[u8]) -> Result<(), String> {
        self.keys.lock().insert(alias.to_string(), material.to_vec());
        Ok(())
    }

    fn load_key(&self, alias: &str) -> Option<Vec<u8>> {
        self.keys.lock().get(alias).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_on_radio_grants_everything() {
        let radio = AlwaysOnRadio;
        assert!(radio.is_available());
        assert!(radio.is_enabled());
        assert!(radio.has_permission());
    }

    #[test]
    fn test_memory_key_store_roundtrip() {
        let store = MemoryKeyStore::new();
        assert!(store.is_empty());

        store.save_key("alias", &[1, 2, 3]).expect("Save key");
        assert_eq!(store.len(), 1);
        assert_eq!(store.load_key("alias"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_memory_key_store_missing_alias() {
        let store = MemoryKeyStore::new();
        assert_eq!(store.load_key("nope"), None);
    }

    #[test]
    fn test_memory_key_store_overwrite() {
        let store = MemoryKeyStore::new();
        store.save_key("alias", &[1]).expect("Save key");
        store.save_key("alias", &[2]).expect("Save key");
        assert_eq!(store.load_key("alias"), Some(vec![2]));
    }

    #[test]
    fn test_mock_radio_capability() {
        let mut radio = MockRadioCapability::new();
        radio.expect_is_available().return_const(true);
        radio.expect_is_enabled().return_const(false);
        assert!(radio.is_available());
        assert!(!radio.is_enabled());
    }
}
