//! Scale devices.
//!
//! A [`ScaleDevice`] is a tagged variant over the two device kinds.  Both
//! expose the same capability surface and share a [`DeviceCore`] that
//! holds the decoded state, the read gate, the live-load tracker and the
//! polling scheduler.
//!
//! | Variant     | Backing                      | Frames                    |
//! |-------------|------------------------------|---------------------------|
//! | `Physical`  | [`BleTransport`] peripheral  | read from characteristics |
//! | `Simulated` | seeded pseudo-random model   | encoded locally           |
//!
//! ## Lifecycle
//!
//! ```text
//!  Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!       ▲                        │                  │
//!       └──────── failure ───────┘◀──── disconnect ─┘
//! ```
//!
//! "Reading active" is orthogonal: the scheduler runs only while
//! connected, and disconnect always stops it first.

pub mod physical;
pub mod read_gate;
pub mod shared;
pub mod simulated;

use core::time::Duration;
use std::sync::Arc;

use serde::Serialize;

use crate::app::ports::BleTransport;
use crate::cancel::CancelToken;
use crate::config::ScaleConfig;
use crate::error::Result;
use crate::protocol::aggregator::AggregatorState;
use crate::protocol::name::{AdvertisedName, Topology};

pub use shared::DeviceCore;
pub use physical::PhysicalDevice;
pub use simulated::SimulatedDevice;

// ───────────────────────────────────────────────────────────────
// Identity and status
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Physical,
    Simulated,
}

/// Static identity of a device, known before connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub address: String,
    pub name: AdvertisedName,
    pub kind: DeviceKind,
    /// Signal strength at discovery, physical devices only.
    pub rssi: Option<i16>,
}

impl DeviceInfo {
    pub fn physical(address: impl Into<String>, name: &str, rssi: Option<i16>) -> Self {
        Self {
            address: address.into(),
            name: AdvertisedName::parse(name),
            kind: DeviceKind::Physical,
            rssi,
        }
    }

    pub fn firmware(&self) -> Option<u16> {
        self.name.firmware
    }

    pub fn topology(&self) -> Topology {
        self.name.topology
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum DeviceStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl DeviceStatus {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Arguments for [`ScaleDevice::connect`].
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub timeout: Duration,
    pub cancel: CancelToken,
}

impl ConnectParams {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(config: &ScaleConfig) -> Self {
        Self::new(config.connect_timeout())
    }
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self::from_config(&ScaleConfig::default())
    }
}

// ───────────────────────────────────────────────────────────────
// Tagged device
// ───────────────────────────────────────────────────────────────

/// A physical or simulated scale behind one capability surface.
pub enum ScaleDevice<T: BleTransport> {
    Physical(PhysicalDevice<T>),
    Simulated(SimulatedDevice),
}

impl<T: BleTransport> Clone for ScaleDevice<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Physical(d) => Self::Physical(d.clone()),
            Self::Simulated(d) => Self::Simulated(d.clone()),
        }
    }
}

impl<T: BleTransport> core::fmt::Debug for ScaleDevice<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScaleDevice")
            .field("address", &self.address())
            .field("kind", &self.info().kind)
            .field("status", &self.status())
            .finish()
    }
}

impl<T: BleTransport> From<PhysicalDevice<T>> for ScaleDevice<T> {
    fn from(d: PhysicalDevice<T>) -> Self {
        Self::Physical(d)
    }
}

impl<T: BleTransport> From<SimulatedDevice> for ScaleDevice<T> {
    fn from(d: SimulatedDevice) -> Self {
        Self::Simulated(d)
    }
}

impl<T: BleTransport> ScaleDevice<T> {
    pub fn core(&self) -> &DeviceCore {
        match self {
            Self::Physical(d) => d.core(),
            Self::Simulated(d) => d.core(),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        self.core().info()
    }

    pub fn address(&self) -> &str {
        self.core().address()
    }

    pub fn status(&self) -> DeviceStatus {
        self.core().status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == DeviceStatus::Connected
    }

    pub fn is_reading(&self) -> bool {
        self.core().is_reading()
    }

    /// Whether two handles refer to the same device instance.
    pub fn same_device(&self, other: &Self) -> bool {
        core::ptr::eq(self.core(), other.core())
    }

    /// Polling interval used when the caller does not pick one.
    pub fn default_read_interval(&self) -> Duration {
        self.core().read_interval()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub async fn connect(&self, params: ConnectParams) -> bool {
        match self {
            Self::Physical(d) => d.connect(params).await,
            Self::Simulated(d) => d.connect(params).await,
        }
    }

    pub async fn disconnect(&self) {
        match self {
            Self::Physical(d) => d.disconnect().await,
            Self::Simulated(d) => d.disconnect().await,
        }
    }

    pub async fn dispose(&self) {
        match self {
            Self::Physical(d) => d.dispose().await,
            Self::Simulated(d) => d.dispose().await,
        }
    }

    // ── Reading ───────────────────────────────────────────────

    pub async fn initial_read(&self) -> bool {
        match self {
            Self::Physical(d) => d.initial_read().await,
            Self::Simulated(d) => d.initial_read().await,
        }
    }

    pub fn start_continuous_reading(&self, interval: Duration) -> Result<()> {
        match self {
            Self::Physical(d) => d.start_continuous_reading(interval),
            Self::Simulated(d) => d.start_continuous_reading(interval),
        }
    }

    pub async fn stop_continuous_reading(&self) -> bool {
        self.core().stop_reading().await
    }

    pub async fn change_read_interval(&self, interval: Duration) -> Result<()> {
        match self {
            Self::Physical(d) => d.change_read_interval(interval).await,
            Self::Simulated(d) => d.change_read_interval(interval).await,
        }
    }

    // ── Commands ──────────────────────────────────────────────

    pub async fn tare(&self, platform_id: u8) -> bool {
        match self {
            Self::Physical(d) => d.tare(platform_id).await,
            Self::Simulated(d) => d.tare(platform_id),
        }
    }

    pub async fn zero(&self, platform_id: u8) -> bool {
        match self {
            Self::Physical(d) => d.zero(platform_id).await,
            Self::Simulated(d) => d.zero(platform_id),
        }
    }

    pub async fn tare_all(&self) -> bool {
        match self {
            Self::Physical(d) => d.tare_all().await,
            Self::Simulated(d) => d.tare_all(),
        }
    }

    pub async fn zero_all(&self) -> bool {
        match self {
            Self::Physical(d) => d.zero_all().await,
            Self::Simulated(d) => d.zero_all(),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<AggregatorState> {
        self.core().snapshot()
    }

    pub fn formatted_weight(&self, platform_id: u8) -> String {
        self.core().formatted_weight(platform_id)
    }

    pub fn total_weight(&self) -> f32 {
        self.core().total_weight()
    }
}
