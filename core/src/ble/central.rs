/// BLE central engine: scan, connect, and pull credential bytes from a peer
///
/// The engine holds at most one GATT client session. Scanning is independent
/// of the connection state, but a new connect attempt while one is pending
/// is refused rather than queued or merged. Received bytes are handed back
/// unchanged; decoding and decryption are the consumer's business.
use crate::ble::profile::ScanConfig;
use crate::ble::{
    CCCD_UUID, CSN_CHAR_UUID, CSN_SERVICE_UUID, ENABLE_NOTIFICATION_VALUE, TOM_CHAR_UUID,
    TOM_SERVICE_UUID,
};
use crate::platform::{BleConnector, RadioCapability};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// GATT client connection state. At most one remote device occupies
/// `Connecting`/`Connected` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Scanning state, independent of the connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// One discovered device, reported once per received advertisement.
/// Deduplication across radio packets is the consumer's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub address: String,
    pub name: Option<String>,
    pub rssi: i16,
}

/// The central's view of a characteristic on the connected peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCharacteristic {
    pub uuid: Uuid,
    /// Raw platform property bitmask, preserved for diagnostics
    pub properties: u32,
    pub has_cccd: bool,
}

/// The central's view of a service on the connected peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub characteristics: Vec<RemoteCharacteristic>,
}

/// Events emitted by the central engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentralEvent {
    DeviceFound(ScanResult),
    ScanFailed { code: i32 },
    Connected { address: String },
    Disconnected { address: String },
    ServicesDiscovered { services: Vec<RemoteService> },
    CharacteristicRead { uuid: Uuid, data: Vec<u8> },
    CharacteristicWritten { uuid: Uuid, success: bool },
    NotificationReceived { uuid: Uuid, data: Vec<u8> },
    NotificationsEnabled { success: bool },
}

impl fmt::Display for CentralEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CentralEvent::DeviceFound(result) => {
                write!(
                    f,
                    "DeviceFound {{ {} rssi: {} }}",
                    result.address, result.rssi
                )
            }
            CentralEvent::ScanFailed { code } => write!(f, "ScanFailed {{ code: {code} }}"),
            CentralEvent::Connected { address } => write!(f, "Connected {{ {address} }}"),
            CentralEvent::Disconnected { address } => write!(f, "Disconnected {{ {address} }}"),
            CentralEvent::ServicesDiscovered { services } => {
                write!(f, "ServicesDiscovered {{ count: {} }}", services.len())
            }
            CentralEvent::CharacteristicRead { uuid, data } => {
                write!(f, "CharacteristicRead {{ {uuid}, {} bytes }}", data.len())
            }
            CentralEvent::CharacteristicWritten { uuid, success } => {
                write!(f, "CharacteristicWritten {{ {uuid}, success: {success} }}")
            }
            CentralEvent::NotificationReceived { uuid, data } => {
                write!(
                    f,
                    "NotificationReceived {{ {uuid}, {} bytes }}",
                    data.len()
                )
            }
            CentralEvent::NotificationsEnabled { success } => {
                write!(f, "NotificationsEnabled {{ success: {success} }}")
            }
        }
    }
}

/// Errors for central engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CentralError {
    #[error("Bluetooth radio not present")]
    RadioUnavailable,
    #[error("Bluetooth is disabled")]
    RadioDisabled,
    #[error("Bluetooth scan/connect permission not granted")]
    PermissionDenied,
    #[error("Scan already active")]
    AlreadyScanning,
    #[error("No device connected")]
    NotConnected,
    #[error("A connection attempt is already in progress")]
    ConnectionInProgress,
    #[error("CSN/ToM characteristic not found on peer")]
    CharacteristicNotFound,
    #[error("Transport error: {0}")]
    Transport(String),
}

struct CentralInner {
    scan: ScanState,
    connection: ConnectionState,
    target: Option<String>,
    services: Vec<RemoteService>,
}

impl Default for CentralInner {
    fn default() -> Self {
        Self {
            scan: ScanState::Idle,
            connection: ConnectionState::Disconnected,
            target: None,
            services: Vec::new(),
        }
    }
}

/// The central engine. Cheaply cloneable; clones share one session and one
/// event stream.
#[derive(Clone)]
pub struct CentralEngine {
    capability: Arc<dyn RadioCapability>,
    connector: Arc<dyn BleConnector>,
    inner: Arc<RwLock<CentralInner>>,
    events: UnboundedSender<CentralEvent>,
    receiver: Arc<Mutex<Option<UnboundedReceiver<CentralEvent>>>>,
}

impl CentralEngine {
    /// Create an engine over the given capability provider and connector.
    pub fn new(capability: Arc<dyn RadioCapability>, connector: Arc<dyn BleConnector>) -> Self {
        let (events, receiver) = unbounded_channel();
        Self {
            capability,
            connector,
            inner: Arc::new(RwLock::new(CentralInner::default())),
            events,
            receiver: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    /// Take the event stream. Yields `Some` exactly once.
    pub fn take_events(&self) -> Option<UnboundedReceiver<CentralEvent>> {
        self.receiver.lock().take()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read().connection
    }

    /// Current scanning state
    pub fn scan_state(&self) -> ScanState {
        self.inner.read().scan
    }

    /// Address of the current connect target, if any
    pub fn target(&self) -> Option<String> {
        self.inner.read().target.clone()
    }

    /// Start unfiltered device discovery.
    pub fn start_scan(&self) -> Result<(), CentralError> {
        self.check_capability()?;

        let mut inner = self.inner.write();
        if inner.scan == ScanState::Scanning {
            return Err(CentralError::AlreadyScanning);
        }

        self.connector
            .start_scan(&ScanConfig::default())
            .map_err(CentralError::Transport)?;
        inner.scan = ScanState::Scanning;
        info!("scan started");
        Ok(())
    }

    /// Stop discovery. Idempotent.
    pub fn stop_scan(&self) -> Result<(), CentralError> {
        let mut inner = self.inner.write();
        if inner.scan == ScanState::Idle {
            return Ok(());
        }
        self.connector.stop_scan();
        inner.scan = ScanState::Idle;
        info!("scan stopped");
        Ok(())
    }

    /// Connect to a peripheral by address.
    ///
    /// Only one target may be in `Connecting`/`Connected` at a time; a
    /// second call while one is outstanding fails with
    /// `ConnectionInProgress` instead of replacing the target. An active
    /// scan is stopped first so discovery and connection setup do not
    /// compete for the radio.
    pub fn connect(&self, address: &str) -> Result<(), CentralError> {
        self.check_capability()?;

        let mut inner = self.inner.write();
        if inner.connection != ConnectionState::Disconnected {
            return Err(CentralError::ConnectionInProgress);
        }

        if inner.scan == ScanState::Scanning {
            debug!("stopping scan before connect");
            self.connector.stop_scan();
            inner.scan = ScanState::Idle;
        }

        inner.connection = ConnectionState::Connecting;
        inner.target = Some(address.to_string());
        drop(inner);

        if let Err(err) = self.connector.connect(address) {
            let mut inner = self.inner.write();
            inner.connection = ConnectionState::Disconnected;
            inner.target = None;
            return Err(CentralError::Transport(err));
        }

        info!(address, "connecting");
        Ok(())
    }

    /// Tear down the current session unconditionally. Safe to call when
    /// already disconnected.
    pub fn disconnect(&self) -> Result<(), CentralError> {
        self.connector.disconnect();
        let mut inner = self.inner.write();
        inner.connection = ConnectionState::Disconnected;
        inner.target = None;
        inner.services.clear();
        info!("disconnected");
        Ok(())
    }

    /// Request a read of the peer's credential characteristic.
    ///
    /// Lookup order is fixed: the CSN service/characteristic first, then
    /// Template-on-Mobile. The read result arrives asynchronously as a
    /// `CharacteristicRead` event.
    pub fn read_characteristic(&self) -> Result<(), CentralError> {
        let (service, characteristic) = self.lookup_credential_characteristic()?;
        debug!(%service, %characteristic.uuid, "read requested");
        self.connector
            .read_characteristic(service, characteristic.uuid)
            .map_err(CentralError::Transport)
    }

    /// Write `data` to the peer's credential characteristic, same fallback
    /// lookup as [`Self::read_characteristic`]. The outcome arrives as a
    /// `CharacteristicWritten` event.
    pub fn write_characteristic(&self, data: &[u8]) -> Result<(), CentralError> {
        let (service, characteristic) = self.lookup_credential_characteristic()?;
        self.connector
            .write_characteristic(service, characteristic.uuid, data)
            .map_err(CentralError::Transport)
    }

    /// Enable notification delivery for the credential characteristic.
    ///
    /// Returns `Ok(true)` when the CCCD write was issued, `Ok(false)` when
    /// the peer omits the descriptor — notifications may silently not
    /// arrive in that case, but some peripherals work without it.
    pub fn enable_notifications(&self) -> Result<bool, CentralError> {
        let (service, characteristic) = self.lookup_credential_characteristic()?;

        self.connector
            .set_notifications(service, characteristic.uuid, true);

        if !characteristic.has_cccd {
            warn!(
                %characteristic.uuid,
                "peer has no CCCD descriptor; notifications may not work"
            );
            return Ok(false);
        }

        self.connector
            .write_descriptor(
                service,
                characteristic.uuid,
                CCCD_UUID,
                &ENABLE_NOTIFICATION_VALUE,
            )
            .map_err(CentralError::Transport)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Platform callbacks
    // ------------------------------------------------------------------

    /// A device advertisement was received.
    pub fn on_device_found(&self, result: ScanResult) {
        self.emit(CentralEvent::DeviceFound(result));
    }

    /// The platform scanner failed.
    pub fn on_scan_failed(&self, code: i32) {
        warn!(code, "scan failed");
        self.inner.write().scan = ScanState::Idle;
        self.emit(CentralEvent::ScanFailed { code });
    }

    /// The link came up. Triggers automatic service discovery.
    pub fn on_connected(&self, address: &str) {
        debug!(address, "connected");
        self.inner.write().connection = ConnectionState::Connected;
        self.emit(CentralEvent::Connected {
            address: address.to_string(),
        });
        self.connector.discover_services();
    }

    /// The link went down.
    pub fn on_disconnected(&self, address: &str) {
        debug!(address, "peer disconnected");
        let mut inner = self.inner.write();
        inner.connection = ConnectionState::Disconnected;
        inner.target = None;
        inner.services.clear();
        drop(inner);
        self.emit(CentralEvent::Disconnected {
            address: address.to_string(),
        });
    }

    /// Service discovery finished.
    pub fn on_services_discovered(&self, services: Vec<RemoteService>) {
        debug!(count = services.len(), "services discovered");
        self.inner.write().services = services.clone();
        self.emit(CentralEvent::ServicesDiscovered { services });
    }

    /// A read round trip completed.
    pub fn on_characteristic_read(&self, uuid: Uuid, data: Vec<u8>) {
        self.emit(CentralEvent::CharacteristicRead { uuid, data });
    }

    /// A write round trip completed.
    pub fn on_characteristic_write(&self, uuid: Uuid, success: bool) {
        self.emit(CentralEvent::CharacteristicWritten { uuid, success });
    }

    /// The peer pushed a notification.
    pub fn on_notification(&self, uuid: Uuid, data: Vec<u8>) {
        self.emit(CentralEvent::NotificationReceived { uuid, data });
    }

    /// A descriptor write completed. Only the CCCD is interesting.
    pub fn on_descriptor_write(&self, descriptor: Uuid, success: bool) {
        if descriptor == CCCD_UUID {
            self.emit(CentralEvent::NotificationsEnabled { success });
        }
    }

    fn check_capability(&self) -> Result<(), CentralError> {
        if !self.capability.is_available() {
            return Err(CentralError::RadioUnavailable);
        }
        if !self.capability.is_enabled() {
            return Err(CentralError::RadioDisabled);
        }
        if !self.capability.has_permission() {
            return Err(CentralError::PermissionDenied);
        }
        Ok(())
    }

    // CSN first, then ToM. Requires a connected session with discovery done.
    fn lookup_credential_characteristic(
        &self,
    ) -> Result<(Uuid, RemoteCharacteristic), CentralError> {
        let inner = self.inner.read();
        if inner.connection != ConnectionState::Connected {
            return Err(CentralError::NotConnected);
        }

        for (service_uuid, char_uuid) in [
            (CSN_SERVICE_UUID, CSN_CHAR_UUID),
            (TOM_SERVICE_UUID, TOM_CHAR_UUID),
        ] {
            let found = inner
                .services
                .iter()
                .find(|s| s.uuid == service_uuid)
                .and_then(|s| s.characteristics.iter().find(|c| c.uuid == char_uuid));
            if let Some(characteristic) = found {
                return Ok((service_uuid, characteristic.clone()));
            }
        }

        Err(CentralError::CharacteristicNotFound)
    }

    fn emit(&self, event: CentralEvent) {
        let _ = self.events.send(event);
    }
}
