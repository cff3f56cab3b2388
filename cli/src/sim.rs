//! In-process BLE loopback: a peripheral and a central engine wired to the
//! same simulated link, with events printed as they arrive.

use anyhow::{Context, Result};
use badgelink_core::credential::codec;
use badgelink_core::platform::{AlwaysOnRadio, BleAdvertiser, BleConnector};
use badgelink_core::{
    AdvertiseRequest, CentralEngine, CentralEvent, GattProfile, PeripheralEngine,
    RemoteCharacteristic, RemoteService, ScanConfig, ScanResult, WireProfile,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

const PERIPHERAL_ADDR: &str = "D0:0D:8B:AD:9E:01";
const CENTRAL_ADDR: &str = "C0:FF:EE:00:00:01";

enum LinkRequest {
    Connect(String),
    DiscoverServices,
    Read { characteristic: Uuid },
}

#[derive(Default)]
struct LinkState {
    served: Option<GattProfile>,
    requests: VecDeque<LinkRequest>,
}

#[derive(Clone, Default)]
struct LoopbackLink {
    state: Arc<Mutex<LinkState>>,
}

impl LoopbackLink {
    fn pop_request(&self) -> Option<LinkRequest> {
        self.state.lock().expect("link lock").requests.pop_front()
    }

    fn push_request(&self, request: LinkRequest) {
        self.state
            .lock()
            .expect("link lock")
            .requests
            .push_back(request);
    }

    fn remote_services(&self) -> Vec<RemoteService> {
        let state = self.state.lock().expect("link lock");
        let Some(profile) = state.served.as_ref() else {
            return Vec::new();
        };
        profile
            .services
            .iter()
            .map(|service| RemoteService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .iter()
                    .map(|c| RemoteCharacteristic {
                        uuid: c.uuid,
                        properties: 0,
                        has_cccd: c.has_cccd,
                    })
                    .collect(),
            })
            .collect()
    }

    fn pump(&self, peripheral: &PeripheralEngine, central: &CentralEngine) {
        while let Some(request) = self.pop_request() {
            match request {
                LinkRequest::Connect(address) => {
                    peripheral.on_central_connected(CENTRAL_ADDR);
                    central.on_connected(&address);
                }
                LinkRequest::DiscoverServices => {
                    central.on_services_discovered(self.remote_services());
                }
                LinkRequest::Read { characteristic } => {
                    let value = peripheral
                        .on_characteristic_read(CENTRAL_ADDR, characteristic)
                        .unwrap_or_default();
                    central.on_characteristic_read(characteristic, value);
                }
            }
        }
    }
}

struct LoopbackAdvertiser {
    link: LoopbackLink,
}

impl BleAdvertiser for LoopbackAdvertiser {
    fn start_advertising(
        &self,
        _request: &AdvertiseRequest,
        profile: &GattProfile,
    ) -> Result<(), String> {
        self.link.state.lock().expect("link lock").served = Some(profile.clone());
        Ok(())
    }

    fn stop_advertising(&self) {
        self.link.state.lock().expect("link lock").served = None;
    }
}

struct LoopbackConnector {
    link: LoopbackLink,
}

impl BleConnector for LoopbackConnector {
    fn start_scan(&self, _config: &ScanConfig) -> Result<(), String> {
        Ok(())
    }

    fn stop_scan(&self) {}

    fn connect(&self, address: &str) -> Result<(), String> {
        self.link
            .push_request(LinkRequest::Connect(address.to_string()));
        Ok(())
    }

    fn disconnect(&self) {}

    fn discover_services(&self) {
        self.link.push_request(LinkRequest::DiscoverServices);
    }

    fn read_characteristic(&self, _service: Uuid, characteristic: Uuid) -> Result<(), String> {
        self.link.push_request(LinkRequest::Read { characteristic });
        Ok(())
    }

    fn write_characteristic(
        &self,
        _service: Uuid,
        _characteristic: Uuid,
        _data: &[u8],
    ) -> Result<(), String> {
        Ok(())
    }

    fn write_descriptor(
        &self,
        _service: Uuid,
        _characteristic: Uuid,
        _descriptor: Uuid,
        _value: &[u8],
    ) -> Result<(), String> {
        Ok(())
    }

    fn set_notifications(&self, _service: Uuid, _characteristic: Uuid, _enabled: bool) {}
}

/// Advertise a CSN credential on a simulated peripheral, then discover,
/// connect and read it back with a central engine.
pub async fn run_loopback(csn: &str) -> Result<()> {
    let serial = codec::parse_csn(csn);
    let payload = codec::encode_csn(serial);
    println!("advertising CSN {serial}: {}", codec::format_csn_hex(serial));

    let link = LoopbackLink::default();
    let peripheral = PeripheralEngine::new(
        Arc::new(AlwaysOnRadio),
        Arc::new(LoopbackAdvertiser { link: link.clone() }),
    );
    let central = CentralEngine::new(
        Arc::new(AlwaysOnRadio),
        Arc::new(LoopbackConnector { link: link.clone() }),
    );
    let mut peripheral_events = peripheral
        .take_events()
        .context("peripheral event stream already taken")?;
    let mut central_events = central
        .take_events()
        .context("central event stream already taken")?;

    peripheral.start(WireProfile::CsnMobile, &payload)?;
    peripheral.on_advertise_started();
    info!("peripheral on the air under the CSN Mobile profile");

    central.start_scan()?;
    central.on_device_found(ScanResult {
        address: PERIPHERAL_ADDR.to_string(),
        name: Some("BadgeLink".to_string()),
        rssi: -48,
    });
    central.connect(PERIPHERAL_ADDR)?;
    link.pump(&peripheral, &central);

    central.read_characteristic()?;
    link.pump(&peripheral, &central);
    info!("credential characteristic read completed");

    central.disconnect()?;
    peripheral.stop()?;

    // Dropping the engines closes both event channels; the receivers then
    // drain what was queued and end.
    drop(peripheral);
    drop(central);

    println!("-- peripheral events --");
    while let Some(event) = peripheral_events.recv().await {
        println!("  {event}");
    }

    println!("-- central events --");
    let mut credential = None;
    while let Some(event) = central_events.recv().await {
        println!("  {event}");
        if let CentralEvent::CharacteristicRead { data, .. } = event {
            credential = Some(data);
        }
    }

    let credential = credential.context("no credential was read")?;
    let fixed: [u8; 8] = credential
        .as_slice()
        .try_into()
        .context("credential is not an 8-byte CSN")?;
    println!("read back serial {}", codec::decode_csn(&fixed));
    Ok(())
}
