/// GATT profile construction for the supported wire profiles
///
/// A profile is built once per advertising session from a WireProfile and a
/// payload, and stays immutable until the session stops. The types here are
/// platform-neutral descriptors; the BLE transport collaborator maps them
/// onto whatever the radio stack wants.
use crate::ble::{
    APPLE_COMPANY_ID, CSN_CHAR_UUID, CSN_SERVICE_UUID, IBEACON_CALIBRATED_TX, IBEACON_MAJOR,
    IBEACON_MINOR, IBEACON_PROXIMITY_UUID, LEGACY_CHAR_UUID, LEGACY_SERVICE_UUID,
    SUPREMA_RX_CHAR_UUID, SUPREMA_SERVICE_UUID, SUPREMA_TX_CHAR_UUID, TOM_CHAR_UUID,
    TOM_SERVICE_UUID,
};
use crate::credential::{codec, WireProfile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Advertising interval/latency trade-off requested from the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertiseMode {
    /// Compatibility-friendly middle ground
    Balanced,
    /// Fastest discovery, highest power draw
    LowLatency,
    /// Battery saver
    LowPower,
}

/// Requested transmit power level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPowerLevel {
    High,
    Medium,
    Low,
    UltraLow,
}

/// Scan interval/latency trade-off for the central engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    LowLatency,
    Balanced,
    LowPower,
}

/// Which advertisement packets trigger a scan callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackType {
    /// Every received advertisement (duplicates included)
    AllMatches,
    /// Only the first advertisement from each device
    FirstMatch,
}

/// Advertising settings handed to the platform advertiser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiseConfig {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    pub connectable: bool,
    /// 0 means advertise until stopped
    pub timeout_ms: u32,
    pub include_device_name: bool,
    pub include_tx_power: bool,
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            mode: AdvertiseMode::Balanced,
            tx_power: TxPowerLevel::High,
            connectable: true,
            timeout_ms: 0,
            include_device_name: true,
            include_tx_power: true,
        }
    }
}

impl AdvertiseConfig {
    /// Set the advertise mode
    pub fn with_mode(mut self, mode: AdvertiseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set whether the local TX power level is included in the packet
    pub fn with_include_tx_power(mut self, include: bool) -> Self {
        self.include_tx_power = include;
        self
    }
}

/// Scan settings handed to the platform scanner. No filters: discovery is
/// unfiltered by design and the consumer collapses duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub mode: ScanMode,
    pub callback_type: CallbackType,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::LowLatency,
            callback_type: CallbackType::AllMatches,
        }
    }
}

/// Manufacturer-specific advertisement data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub payload: Vec<u8>,
}

/// Complete advertisement descriptor for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiseRequest {
    pub config: AdvertiseConfig,
    pub service_uuids: Vec<Uuid>,
    pub manufacturer_data: Option<ManufacturerData>,
}

/// Characteristic properties visible to remote centrals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharProps {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
}

/// Characteristic access permissions enforced by the GATT server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharPerms {
    pub read: bool,
    pub write: bool,
}

/// One characteristic in the served GATT profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub properties: CharProps,
    pub permissions: CharPerms,
    pub value: Vec<u8>,
    /// Whether a client characteristic configuration descriptor is attached
    pub has_cccd: bool,
}

impl GattCharacteristic {
    /// Read-only characteristic holding a fixed value
    pub fn read_only(uuid: Uuid, value: Vec<u8>) -> Self {
        Self {
            uuid,
            properties: CharProps {
                read: true,
                ..Default::default()
            },
            permissions: CharPerms {
                read: true,
                write: false,
            },
            value,
            has_cccd: false,
        }
    }

    /// Readable + notifying characteristic with a CCCD attached
    pub fn read_notify(uuid: Uuid, value: Vec<u8>) -> Self {
        Self {
            uuid,
            properties: CharProps {
                read: true,
                write: false,
                notify: true,
            },
            permissions: CharPerms {
                read: true,
                write: false,
            },
            value,
            has_cccd: true,
        }
    }

    /// Write-only characteristic with no initial value
    pub fn write_only(uuid: Uuid) -> Self {
        Self {
            uuid,
            properties: CharProps {
                write: true,
                ..Default::default()
            },
            permissions: CharPerms {
                read: false,
                write: true,
            },
            value: Vec::new(),
            has_cccd: false,
        }
    }
}

/// One primary service in the served GATT profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// The full set of services served during one advertising session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattProfile {
    pub services: Vec<GattService>,
}

impl GattProfile {
    /// Build the GATT layout for `profile`, with `payload` as the served
    /// credential bytes.
    pub fn for_profile(profile: WireProfile, payload: &[u8]) -> Self {
        let services = match profile {
            WireProfile::CsnMobile => vec![
                GattService {
                    uuid: CSN_SERVICE_UUID,
                    characteristics: vec![GattCharacteristic::read_only(
                        CSN_CHAR_UUID,
                        payload.to_vec(),
                    )],
                },
                // ToM carries the same bytes as CSN: placeholder until a
                // real biometric template source exists
                GattService {
                    uuid: TOM_SERVICE_UUID,
                    characteristics: vec![GattCharacteristic::read_only(
                        TOM_CHAR_UUID,
                        payload.to_vec(),
                    )],
                },
            ],
            WireProfile::Suprema => vec![GattService {
                uuid: SUPREMA_SERVICE_UUID,
                characteristics: vec![
                    GattCharacteristic::read_notify(SUPREMA_TX_CHAR_UUID, payload.to_vec()),
                    GattCharacteristic::write_only(SUPREMA_RX_CHAR_UUID),
                ],
            }],
            WireProfile::Legacy | WireProfile::IBeaconCombo => vec![GattService {
                uuid: LEGACY_SERVICE_UUID,
                characteristics: vec![GattCharacteristic::read_only(
                    LEGACY_CHAR_UUID,
                    payload.to_vec(),
                )],
            }],
        };
        Self { services }
    }

    pub fn service(&self, uuid: Uuid) -> Option<&GattService> {
        self.services.iter().find(|s| s.uuid == uuid)
    }

    /// Find a characteristic's value anywhere in the profile.
    pub fn characteristic_value(&self, uuid: Uuid) -> Option<&[u8]> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == uuid)
            .map(|c| c.value.as_slice())
    }

    /// Service UUIDs in declaration order
    pub fn service_uuids(&self) -> Vec<Uuid> {
        self.services.iter().map(|s| s.uuid).collect()
    }
}

/// Build the advertisement descriptor for `profile`.
///
/// Profile selection is exclusive per session; `IBeaconCombo` is the one
/// additive case, layering the iBeacon manufacturer frame over the legacy
/// advertisement.
pub fn advertise_request_for(profile: WireProfile) -> AdvertiseRequest {
    match profile {
        WireProfile::CsnMobile => AdvertiseRequest {
            config: AdvertiseConfig::default(),
            service_uuids: vec![CSN_SERVICE_UUID, TOM_SERVICE_UUID],
            manufacturer_data: None,
        },
        WireProfile::Suprema => AdvertiseRequest {
            config: AdvertiseConfig::default()
                .with_mode(AdvertiseMode::LowLatency)
                .with_include_tx_power(false),
            service_uuids: vec![SUPREMA_SERVICE_UUID],
            manufacturer_data: None,
        },
        WireProfile::Legacy => AdvertiseRequest {
            config: AdvertiseConfig::default(),
            service_uuids: vec![LEGACY_SERVICE_UUID],
            manufacturer_data: None,
        },
        WireProfile::IBeaconCombo => AdvertiseRequest {
            config: AdvertiseConfig::default(),
            service_uuids: vec![LEGACY_SERVICE_UUID, IBEACON_PROXIMITY_UUID],
            manufacturer_data: Some(ManufacturerData {
                company_id: APPLE_COMPANY_ID,
                payload: codec::encode_ibeacon(
                    IBEACON_PROXIMITY_UUID,
                    IBEACON_MAJOR,
                    IBEACON_MINOR,
                    IBEACON_CALIBRATED_TX,
                ),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csn_profile_serves_both_services_with_same_payload() {
        let payload = vec![0x00, 0x00, 0x00, 0x00, 0x07, 0x5B, 0xCD, 0x15];
        let profile = GattProfile::for_profile(WireProfile::CsnMobile, &payload);

        assert_eq!(profile.services.len(), 2);
        assert_eq!(
            profile.characteristic_value(CSN_CHAR_UUID),
            Some(payload.as_slice())
        );
        assert_eq!(
            profile.characteristic_value(TOM_CHAR_UUID),
            Some(payload.as_slice())
        );
    }

    #[test]
    fn test_csn_characteristics_are_read_only() {
        let profile = GattProfile::for_profile(WireProfile::CsnMobile, &[0x01]);
        let service = profile.service(CSN_SERVICE_UUID).expect("CSN service");
        let ch = service.characteristic(CSN_CHAR_UUID).expect("CSN char");

        assert!(ch.properties.read);
        assert!(!ch.properties.write);
        assert!(!ch.properties.notify);
        assert!(!ch.has_cccd);
    }

    #[test]
    fn test_suprema_profile_tx_rx_shape() {
        let profile = GattProfile::for_profile(WireProfile::Suprema, &[0x53, 0x55]);
        let service = profile
            .service(SUPREMA_SERVICE_UUID)
            .expect("Suprema service");

        let tx = service
            .characteristic(SUPREMA_TX_CHAR_UUID)
            .expect("TX char");
        assert!(tx.properties.read);
        assert!(tx.properties.notify);
        assert!(tx.has_cccd);
        assert_eq!(tx.value, vec![0x53, 0x55]);

        let rx = service
            .characteristic(SUPREMA_RX_CHAR_UUID)
            .expect("RX char");
        assert!(rx.properties.write);
        assert!(!rx.properties.read);
        assert!(rx.value.is_empty());
    }

    #[test]
    fn test_legacy_profile_single_service() {
        let profile = GattProfile::for_profile(WireProfile::Legacy, b"secret");
        assert_eq!(profile.services.len(), 1);
        assert_eq!(
            profile.characteristic_value(LEGACY_CHAR_UUID),
            Some(b"secret".as_slice())
        );
    }

    #[test]
    fn test_ibeacon_combo_gatt_matches_legacy() {
        let legacy = GattProfile::for_profile(WireProfile::Legacy, b"x");
        let combo = GattProfile::for_profile(WireProfile::IBeaconCombo, b"x");
        assert_eq!(legacy, combo);
    }

    #[test]
    fn test_advertise_request_csn() {
        let request = advertise_request_for(WireProfile::CsnMobile);
        assert_eq!(
            request.service_uuids,
            vec![CSN_SERVICE_UUID, TOM_SERVICE_UUID]
        );
        assert_eq!(request.config.mode, AdvertiseMode::Balanced);
        assert!(request.config.include_device_name);
        assert!(request.config.include_tx_power);
        assert!(request.config.connectable);
        assert_eq!(request.config.timeout_ms, 0);
        assert!(request.manufacturer_data.is_none());
    }

    #[test]
    fn test_advertise_request_suprema_low_latency() {
        let request = advertise_request_for(WireProfile::Suprema);
        assert_eq!(request.config.mode, AdvertiseMode::LowLatency);
        assert!(!request.config.include_tx_power);
        assert_eq!(request.service_uuids, vec![SUPREMA_SERVICE_UUID]);
    }

    #[test]
    fn test_advertise_request_ibeacon_combo() {
        let request = advertise_request_for(WireProfile::IBeaconCombo);
        assert_eq!(
            request.service_uuids,
            vec![LEGACY_SERVICE_UUID, IBEACON_PROXIMITY_UUID]
        );

        let mfg = request.manufacturer_data.expect("Manufacturer data");
        assert_eq!(mfg.company_id, 0x004C);
        assert_eq!(mfg.payload.len(), 23);
        assert_eq!(mfg.payload[..2], [0x02, 0x15]);
        assert_eq!(mfg.payload[22], 0xC5);
    }

    #[test]
    fn test_characteristic_value_missing_uuid() {
        let profile = GattProfile::for_profile(WireProfile::Legacy, b"x");
        assert_eq!(profile.characteristic_value(CSN_CHAR_UUID), None);
    }

    #[test]
    fn test_service_uuids_order() {
        let profile = GattProfile::for_profile(WireProfile::CsnMobile, &[]);
        assert_eq!(
            profile.service_uuids(),
            vec![CSN_SERVICE_UUID, TOM_SERVICE_UUID]
        );
    }
}
