//! Mock BLE stack: scripted transport, adapter and event recorder.
//!
//! State lives behind `Arc<Mutex<_>>` so the test body can keep a handle
//! and inspect writes or change characteristic values after the transport
//! has been moved into a device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_lite::future;
use futures_lite::stream::{self, Iter};

use scalelink::app::events::{EventBus, ScaleEvent};
use scalelink::app::ports::{Advertisement, BleAdapter, BleTransport, EventSink};
use scalelink::cancel::CancelToken;
use scalelink::config::ScaleConfig;
use scalelink::error::TransportError;
use scalelink::protocol::characteristics::{self, AGGREGATOR_SERVICE, CHAR_GENERAL};
use scalelink::protocol::fields::{PlatformField, encode_weight};
use scalelink::protocol::frame::{AggregatorFrame, StatusFlags};

// ── Transport ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockState {
    pub values: HashMap<(u128, u128), Vec<u8>>,
    pub fail_connect: bool,
    pub hang_reads: bool,
    pub connected: bool,
    pub connects: usize,
    pub releases: usize,
    pub reads: usize,
    pub writes: Vec<(u128, u128, Vec<u8>)>,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let t = Self::new();
        t.state.lock().unwrap().fail_connect = true;
        t
    }

    pub fn set(&self, service: u128, characteristic: u128, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .values
            .insert((service, characteristic), bytes.to_vec());
    }

    pub fn set_hang(&self, hang: bool) {
        self.state.lock().unwrap().hang_reads = hang;
    }

    pub fn writes(&self) -> Vec<(u128, u128, Vec<u8>)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn releases(&self) -> usize {
        self.state.lock().unwrap().releases
    }

    // ── Aggregator scripting ─────────────────────────────────

    pub fn set_general(&self, platform_count: u8) {
        let frame = frame(0.0, 0.0, platform_count, ready());
        self.set(AGGREGATOR_SERVICE, CHAR_GENERAL, &frame);
    }

    pub fn set_platform(&self, id: u8, bytes: &[u8]) {
        self.set(
            AGGREGATOR_SERVICE,
            characteristics::platform_characteristic(id),
            bytes,
        );
    }

    // ── Per-platform scripting ───────────────────────────────

    /// Fill every per-platform field with a calibrated, stable reading.
    pub fn set_pad_fields(&self, firmware: u16, weight: f32) {
        for field in PlatformField::ALL {
            let bytes = match field {
                PlatformField::FirmwareVersion => firmware.to_le_bytes().to_vec(),
                PlatformField::Weight | PlatformField::GrossWeight => {
                    encode_weight(weight, firmware).to_vec()
                }
                PlatformField::DecimalPlaces => vec![2],
                PlatformField::NetworkNumber => vec![11],
                PlatformField::PlatformNumber => vec![2],
                PlatformField::BatteryVoltage => 7_050i16.to_le_bytes().to_vec(),
                PlatformField::Calibrated | PlatformField::Stable => vec![1],
                _ => vec![0],
            };
            let (service, characteristic) = characteristics::field_address(field);
            self.set(service, characteristic, &bytes);
        }
    }
}

impl BleTransport for MockTransport {
    async fn connect(&self, _timeout: Duration, _cancel: &CancelToken) -> Result<(), TransportError> {
        let mut s = self.state.lock().unwrap();
        s.connects += 1;
        if s.fail_connect {
            return Err(TransportError::Connect("peripheral unreachable".into()));
        }
        s.connected = true;
        Ok(())
    }

    async fn cancel_connection(&self) -> Result<(), TransportError> {
        let mut s = self.state.lock().unwrap();
        s.releases += 1;
        s.connected = false;
        Ok(())
    }

    async fn read_characteristic(
        &self,
        service: u128,
        characteristic: u128,
        _cancel: &CancelToken,
    ) -> Result<Vec<u8>, TransportError> {
        let (hang, value) = {
            let mut s = self.state.lock().unwrap();
            s.reads += 1;
            if !s.connected {
                return Err(TransportError::NotConnected);
            }
            (s.hang_reads, s.values.get(&(service, characteristic)).cloned())
        };
        if hang {
            future::pending::<()>().await;
        }
        value.ok_or_else(|| TransportError::Read(format!("no value for {characteristic:x}")))
    }

    async fn write_characteristic(
        &self,
        service: u128,
        characteristic: u128,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut s = self.state.lock().unwrap();
        if !s.connected {
            return Err(TransportError::NotConnected);
        }
        s.writes.push((service, characteristic, data.to_vec()));
        Ok(())
    }
}

// ── Adapter ──────────────────────────────────────────────────

pub struct MockAdapter {
    pub advertisements: Vec<Advertisement>,
}

impl BleAdapter for MockAdapter {
    type Transport = MockTransport;
    type Scan = Iter<std::vec::IntoIter<Advertisement>>;

    fn scan(&self) -> Self::Scan {
        stream::iter(self.advertisements.clone())
    }

    fn transport_for(&self, _advertisement: &Advertisement) -> Self::Transport {
        MockTransport::new()
    }
}

pub fn advertisement(name: &str, address: &str) -> Advertisement {
    Advertisement {
        name: name.into(),
        address: address.into(),
        rssi: -60,
    }
}

// ── Frames ───────────────────────────────────────────────────

pub fn ready() -> StatusFlags {
    StatusFlags {
        connected: true,
        calibrated: true,
        stable: true,
        ..StatusFlags::default()
    }
}

pub fn frame(net: f32, gross: f32, byte8: u8, status: StatusFlags) -> [u8; 14] {
    AggregatorFrame {
        net_weight: net,
        gross_weight: gross,
        byte8,
        decimal_places: 1,
        status,
        battery_mv: 7_400,
    }
    .encode()
}

// ── Event recorder ───────────────────────────────────────────

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<ScaleEvent>>,
}

impl Recorder {
    pub fn attach(bus: &EventBus) -> Arc<Self> {
        let r = Arc::new(Self::default());
        bus.subscribe(r.clone());
        r
    }

    pub fn events(&self) -> Vec<ScaleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&ScaleEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: &ScaleEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Helpers ──────────────────────────────────────────────────

/// Short timeouts so failure paths finish quickly.
pub fn fast_config() -> ScaleConfig {
    ScaleConfig {
        read_interval_ms: 100,
        failure_backoff_ms: 100,
        watchdog_timeout_ms: 600,
        stop_timeout_ms: 2_000,
        connect_timeout_ms: 300,
        read_timeout_ms: 150,
        ..ScaleConfig::default()
    }
}

/// Poll `cond` until it holds or `limit` passes.
pub fn wait_until(limit: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    cond()
}
