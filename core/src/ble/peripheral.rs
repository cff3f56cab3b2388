/// BLE peripheral engine: advertise a credential and serve it over GATT
///
/// The engine owns the advertisement lifecycle and the served profile, and
/// turns the platform's callbacks into an outbound event stream. It performs
/// no blocking I/O itself; all radio work happens in the BleAdvertiser
/// collaborator.
use crate::ble::profile::{advertise_request_for, GattProfile};
use crate::credential::WireProfile;
use crate::platform::{BleAdvertiser, RadioCapability};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Decoded advertising failure vocabulary.
///
/// Platform codes 1 through 5 map onto the named variants; anything else is
/// `Unknown`. The raw code always travels with the event for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertiseFailure {
    DataTooLarge,
    TooManyAdvertisers,
    AlreadyStarted,
    InternalError,
    FeatureUnsupported,
    Unknown,
}

impl AdvertiseFailure {
    /// Decode a platform advertising error code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AdvertiseFailure::DataTooLarge,
            2 => AdvertiseFailure::TooManyAdvertisers,
            3 => AdvertiseFailure::AlreadyStarted,
            4 => AdvertiseFailure::InternalError,
            5 => AdvertiseFailure::FeatureUnsupported,
            _ => AdvertiseFailure::Unknown,
        }
    }
}

impl fmt::Display for AdvertiseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvertiseFailure::DataTooLarge => write!(f, "DataTooLarge"),
            AdvertiseFailure::TooManyAdvertisers => write!(f, "TooManyAdvertisers"),
            AdvertiseFailure::AlreadyStarted => write!(f, "AlreadyStarted"),
            AdvertiseFailure::InternalError => write!(f, "InternalError"),
            AdvertiseFailure::FeatureUnsupported => write!(f, "FeatureUnsupported"),
            AdvertiseFailure::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Events emitted by the peripheral engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeripheralEvent {
    /// Advertising is on the air
    AdvertiseStarted,
    /// The platform refused or aborted advertising
    AdvertiseFailed { code: i32, reason: AdvertiseFailure },
    /// A remote central connected
    Connected { address: String },
    /// A remote central disconnected
    Disconnected { address: String },
    /// A remote central read the credential characteristic
    CredentialRead { address: String },
}

impl fmt::Display for PeripheralEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralEvent::AdvertiseStarted => write!(f, "AdvertiseStarted"),
            PeripheralEvent::AdvertiseFailed { code, reason } => {
                write!(f, "AdvertiseFailed {{ code: {code}, reason: {reason} }}")
            }
            PeripheralEvent::Connected { address } => write!(f, "Connected {{ {address} }}"),
            PeripheralEvent::Disconnected { address } => {
                write!(f, "Disconnected {{ {address} }}")
            }
            PeripheralEvent::CredentialRead { address } => {
                write!(f, "CredentialRead {{ {address} }}")
            }
        }
    }
}

/// Errors for peripheral engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeripheralError {
    #[error("Bluetooth radio not present")]
    RadioUnavailable,
    #[error("Bluetooth is disabled")]
    RadioDisabled,
    #[error("Bluetooth advertise permission not granted")]
    PermissionDenied,
    #[error("Advertising already active")]
    AlreadyAdvertising,
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Snapshot of the current advertising session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisingStatus {
    pub advertising: bool,
    pub gatt_server_open: bool,
    pub profile: Option<WireProfile>,
    pub service_uuids: Vec<Uuid>,
}

#[derive(Default)]
struct PeripheralInner {
    profile: Option<WireProfile>,
    gatt: Option<GattProfile>,
    advertising: bool,
    connected: HashSet<String>,
}

/// The peripheral engine. Cheaply cloneable; clones share one session and
/// one event stream.
#[derive(Clone)]
pub struct PeripheralEngine {
    capability: Arc<dyn RadioCapability>,
    advertiser: Arc<dyn BleAdvertiser>,
    inner: Arc<RwLock<PeripheralInner>>,
    events: UnboundedSender<PeripheralEvent>,
    receiver: Arc<Mutex<Option<UnboundedReceiver<PeripheralEvent>>>>,
}

impl PeripheralEngine {
    /// Create an engine over the given capability provider and advertiser.
    pub fn new(capability: Arc<dyn RadioCapability>, advertiser: Arc<dyn BleAdvertiser>) -> Self {
        let (events, receiver) = unbounded_channel();
        Self {
            capability,
            advertiser,
            inner: Arc::new(RwLock::new(PeripheralInner::default())),
            events,
            receiver: Arc::new(Mutex::new(Some(receiver))),
        }
    }

    /// Take the event stream. Yields `Some` exactly once.
    pub fn take_events(&self) -> Option<UnboundedReceiver<PeripheralEvent>> {
        self.receiver.lock().take()
    }

    /// Start advertising `payload` under `profile`.
    ///
    /// Builds the GATT profile fresh, discarding any prior one. Fails
    /// synchronously on missing hardware, disabled radio, missing
    /// permission, or a session that is already advertising; the
    /// `AdvertiseStarted` / `AdvertiseFailed` outcome arrives on the event
    /// stream once the radio reports back.
    pub fn start(&self, profile: WireProfile, payload: &[u8]) -> Result<(), PeripheralError> {
        if !self.capability.is_available() {
            return Err(PeripheralError::RadioUnavailable);
        }
        if !self.capability.is_enabled() {
            return Err(PeripheralError::RadioDisabled);
        }
        if !self.capability.has_permission() {
            return Err(PeripheralError::PermissionDenied);
        }

        let mut inner = self.inner.write();
        if inner.advertising {
            return Err(PeripheralError::AlreadyAdvertising);
        }

        let gatt = GattProfile::for_profile(profile, payload);
        let request = advertise_request_for(profile);

        self.advertiser
            .start_advertising(&request, &gatt)
            .map_err(PeripheralError::Transport)?;

        info!(%profile, payload_len = payload.len(), "advertising requested");
        inner.profile = Some(profile);
        inner.gatt = Some(gatt);
        inner.advertising = true;
        Ok(())
    }

    /// Stop advertising and close the GATT server. Idempotent.
    pub fn stop(&self) -> Result<(), PeripheralError> {
        let mut inner = self.inner.write();
        if !inner.advertising && inner.gatt.is_none() {
            return Ok(());
        }

        self.advertiser.stop_advertising();
        inner.advertising = false;
        inner.profile = None;
        inner.gatt = None;
        inner.connected.clear();
        info!("advertising stopped");
        Ok(())
    }

    /// Whether an advertising session is active
    pub fn is_advertising(&self) -> bool {
        self.inner.read().advertising
    }

    /// Snapshot of the current session
    pub fn status(&self) -> AdvertisingStatus {
        let inner = self.inner.read();
        AdvertisingStatus {
            advertising: inner.advertising,
            gatt_server_open: inner.gatt.is_some(),
            profile: inner.profile,
            service_uuids: inner
                .gatt
                .as_ref()
                .map(GattProfile::service_uuids)
                .unwrap_or_default(),
        }
    }

    // ------------------------------------------------------------------
    // Platform callbacks
    // ------------------------------------------------------------------

    /// The radio confirmed advertising is on the air.
    pub fn on_advertise_started(&self) {
        debug!("advertise started");
        self.emit(PeripheralEvent::AdvertiseStarted);
    }

    /// The radio refused or aborted advertising.
    pub fn on_advertise_failed(&self, code: i32) {
        let reason = AdvertiseFailure::from_code(code);
        warn!(code, %reason, "advertise failed");
        self.inner.write().advertising = false;
        self.emit(PeripheralEvent::AdvertiseFailed { code, reason });
    }

    /// A remote central connected to the GATT server.
    pub fn on_central_connected(&self, address: &str) {
        debug!(address, "central connected");
        self.inner.write().connected.insert(address.to_string());
        self.emit(PeripheralEvent::Connected {
            address: address.to_string(),
        });
    }

    /// A remote central disconnected.
    pub fn on_central_disconnected(&self, address: &str) {
        debug!(address, "central disconnected");
        self.inner.write().connected.remove(address);
        self.emit(PeripheralEvent::Disconnected {
            address: address.to_string(),
        });
    }

    /// A remote central issued a read request.
    ///
    /// Returns the full stored value for the characteristic, or `None` when
    /// the UUID is not part of the served profile. Reads never mutate
    /// session state; offset/chunking is the transport's business.
    pub fn on_characteristic_read(&self, address: &str, characteristic: Uuid) -> Option<Vec<u8>> {
        let value = {
            let inner = self.inner.read();
            inner
                .gatt
                .as_ref()?
                .characteristic_value(characteristic)?
                .to_vec()
        };

        debug!(
            address,
            %characteristic,
            len = value.len(),
            "credential read by central"
        );
        self.emit(PeripheralEvent::CredentialRead {
            address: address.to_string(),
        });
        Some(value)
    }

    fn emit(&self, event: PeripheralEvent) {
        // Receiver may be gone if the consumer dropped the stream; events
        // are fire-and-forget at that point.
        let _ = self.events.send(event);
    }
}
