//! BLE credential transport: peripheral and central engines.
//!
//! The UUIDs below are part of the wire contract with access-control
//! readers and companion devices. Changing any of them breaks interop.

pub mod central;
pub mod peripheral;
pub mod profile;

use uuid::Uuid;

/// CSN Mobile service
pub const CSN_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000FFE0_0000_1000_8000_00805F9B34FB);

/// CSN Mobile credential characteristic
pub const CSN_CHAR_UUID: Uuid = Uuid::from_u128(0x0000FFE1_0000_1000_8000_00805F9B34FB);

/// Template-on-Mobile service
pub const TOM_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000FFE2_0000_1000_8000_00805F9B34FB);

/// Template-on-Mobile characteristic
pub const TOM_CHAR_UUID: Uuid = Uuid::from_u128(0x0000FFE3_0000_1000_8000_00805F9B34FB);

/// Suprema-style service
pub const SUPREMA_SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

/// Suprema TX characteristic (credential out, read + notify)
pub const SUPREMA_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);

/// Suprema RX characteristic (reader commands in, write)
pub const SUPREMA_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

/// Legacy credential service
pub const LEGACY_SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789ABC);

/// Legacy credential characteristic
pub const LEGACY_CHAR_UUID: Uuid = Uuid::from_u128(0x87654321_4321_4321_4321_CBA987654321);

/// iBeacon proximity UUID broadcast in the combo profile
pub const IBEACON_PROXIMITY_UUID: Uuid = Uuid::from_u128(0xB9407F30_F5F8_466E_AFF9_25556B57FE6D);

/// Client characteristic configuration descriptor
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805F9B34FB);

/// Apple's Bluetooth SIG company identifier, carrier of iBeacon frames
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// iBeacon major value for the combo profile
pub const IBEACON_MAJOR: u16 = 1;

/// iBeacon minor value for the combo profile
pub const IBEACON_MINOR: u16 = 1;

/// Calibrated TX power byte for the iBeacon frame (-59 dBm at 1 m)
pub const IBEACON_CALIBRATED_TX: i8 = -59;

/// CCCD value enabling notifications
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_uuids_render_canonically() {
        assert_eq!(
            CSN_SERVICE_UUID.to_string(),
            "0000ffe0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CSN_CHAR_UUID.to_string(),
            "0000ffe1-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            TOM_SERVICE_UUID.to_string(),
            "0000ffe2-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            TOM_CHAR_UUID.to_string(),
            "0000ffe3-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            LEGACY_SERVICE_UUID.to_string(),
            "12345678-1234-1234-1234-123456789abc"
        );
        assert_eq!(
            LEGACY_CHAR_UUID.to_string(),
            "87654321-4321-4321-4321-cba987654321"
        );
        assert_eq!(
            CCCD_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_suprema_uuids_render_canonically() {
        assert_eq!(
            SUPREMA_SERVICE_UUID.to_string(),
            "6e400001-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(
            SUPREMA_TX_CHAR_UUID.to_string(),
            "6e400002-b5a3-f393-e0a9-e50e24dcca9e"
        );
        assert_eq!(
            SUPREMA_RX_CHAR_UUID.to_string(),
            "6e400003-b5a3-f393-e0a9-e50e24dcca9e"
        );
    }

    #[test]
    fn test_ibeacon_constants() {
        assert_eq!(
            IBEACON_PROXIMITY_UUID.to_string(),
            "b9407f30-f5f8-466e-aff9-25556b57fe6d"
        );
        assert_eq!(APPLE_COMPANY_ID, 0x004C);
        assert_eq!(IBEACON_MAJOR, 1);
        assert_eq!(IBEACON_MINOR, 1);
        assert_eq!(IBEACON_CALIBRATED_TX as u8, 0xC5);
    }
}
