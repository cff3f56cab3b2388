// BadgeLink — phone-as-credential core
//
// "Can a handset stand in for the badge in your pocket?"
//
// Everything here is transport state machines and byte layouts; the radios,
// the keystore and the screens live on the other side of the platform traits.

pub mod ble;
pub mod credential;
pub mod crypto;
pub mod nfc;
pub mod platform;

pub use ble::central::{
    CentralEngine, CentralError, CentralEvent, ConnectionState, RemoteCharacteristic,
    RemoteService, ScanResult, ScanState,
};
pub use ble::peripheral::{
    AdvertiseFailure, AdvertisingStatus, PeripheralEngine, PeripheralError, PeripheralEvent,
};
pub use ble::profile::{
    advertise_request_for, AdvertiseConfig, AdvertiseRequest, GattCharacteristic, GattProfile,
    GattService, ScanConfig,
};
pub use credential::{codec, CredentialInput, WireProfile};
pub use crypto::{CredentialVault, CryptoError, EncryptedPayload};
pub use nfc::hce::{HceConfig, HceEngine, NfcError, DEFAULT_AID};
pub use platform::{
    AlwaysOnRadio, BleAdvertiser, BleConnector, MemoryKeyStore, RadioCapability, SecureKeyStore,
};
