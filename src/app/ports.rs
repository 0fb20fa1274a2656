//! Port traits: the boundary between the scale domain and the outside world.
//!
//! ```text
//!   BleAdapter ──▶ BleTransport ──▶ ScaleDevice ──▶ EventSink
//!                                       ▲
//!                                PollScheduler (PollDelegate)
//! ```
//!
//! The BLE stack lives behind [`BleAdapter`] and [`BleTransport`]; devices
//! and the manager consume them via generics.  Transport futures are not
//! required to be `Send`: each device drives them from a single thread
//! (the caller's, or its polling worker).

use core::future::Future;
use core::time::Duration;

use futures_lite::Stream;

use crate::app::events::ScaleEvent;
use crate::cancel::CancelToken;
use crate::error::{Error, Result, TransportError};

// ───────────────────────────────────────────────────────────────
// BLE transport (driven adapter: domain ↔ one peripheral)
// ───────────────────────────────────────────────────────────────

/// GATT client for one peripheral.
///
/// Every method reports failure as a [`TransportError`]; devices convert
/// those into `bool` results and status events, so nothing here ever
/// reaches the poll loop as a panic.
pub trait BleTransport: Send + Sync + 'static {
    /// Open the GATT connection.
    fn connect(
        &self,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> impl Future<Output = core::result::Result<(), TransportError>>;

    /// Tear the connection down.  Succeeds if already disconnected.
    fn cancel_connection(&self) -> impl Future<Output = core::result::Result<(), TransportError>>;

    /// Read one characteristic value.
    fn read_characteristic(
        &self,
        service: u128,
        characteristic: u128,
        cancel: &CancelToken,
    ) -> impl Future<Output = core::result::Result<Vec<u8>, TransportError>>;

    /// Write one characteristic value and wait for the acknowledgement.
    fn write_characteristic(
        &self,
        service: u128,
        characteristic: u128,
        data: &[u8],
    ) -> impl Future<Output = core::result::Result<(), TransportError>>;
}

// ───────────────────────────────────────────────────────────────
// BLE adapter (driven adapter: discovery)
// ───────────────────────────────────────────────────────────────

/// One scan result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub name: String,
    pub address: String,
    /// Signal strength in dBm.
    pub rssi: i16,
}

/// Discovery side of the BLE stack.
pub trait BleAdapter {
    type Transport: BleTransport;
    type Scan: Stream<Item = Advertisement> + Unpin;

    /// Start scanning.  The stream ends when the scan stops.
    fn scan(&self) -> Self::Scan;

    /// Build a transport bound to the advertised peripheral.
    fn transport_for(&self, advertisement: &Advertisement) -> Self::Transport;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → UI / logging)
// ───────────────────────────────────────────────────────────────

/// Devices and the manager emit [`ScaleEvent`]s through this port.
///
/// Sinks are shared with polling workers, so `emit` takes `&self` and must
/// not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ScaleEvent);
}

// ───────────────────────────────────────────────────────────────
// Poll delegate (decouples scheduler from devices)
// ───────────────────────────────────────────────────────────────

/// Callback trait the [`PollScheduler`](crate::scheduler::PollScheduler)
/// drives once per interval.
pub trait PollDelegate: Send + Sync + 'static {
    /// Run one read cycle.  The cycle must check `cancel` before applying
    /// each result.
    fn poll_cycle(&self, cancel: &CancelToken) -> impl Future<Output = Result<()>>;

    /// Reading halted on a fatal condition (watchdog).
    fn on_fatal(&self, error: &Error);
}
