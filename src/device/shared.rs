//! State and machinery shared by every device kind.
//!
//! The decoded [`AggregatorState`] lives behind `RwLock<Arc<_>>`.  Writers
//! go through [`DeviceCore::update`], which mutates via `Arc::make_mut`:
//! while any snapshot is outstanding the write lands on a fresh copy that
//! is swapped in whole, so readers never see a half-applied frame or a
//! partially resized table.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info, warn};

use crate::app::events::{EventBus, ScaleEvent};
use crate::app::ports::PollDelegate;
use crate::cancel::CancelToken;
use crate::config::{self, ScaleConfig};
use crate::error::Result;
use crate::platform::PlatformState;
use crate::protocol::aggregator::{AggregatorState, LiveLoadTracker};
use crate::protocol::fields::PlatformField;
use crate::scheduler::{PollScheduler, SchedulerTiming};

use super::read_gate::ReadGate;
use super::{DeviceInfo, DeviceStatus};

pub struct DeviceCore {
    info: DeviceInfo,
    unit: String,
    stop_timeout: Duration,
    read_timeout: Duration,
    status: AtomicU8,
    disposed: AtomicBool,
    state: RwLock<Arc<AggregatorState>>,
    bus: EventBus,
    gate: ReadGate,
    live_load: LiveLoadTracker,
    scheduler: PollScheduler,
    interval: Mutex<Duration>,
    session: Mutex<CancelToken>,
}

impl DeviceCore {
    pub fn new(info: DeviceInfo, config: &ScaleConfig, bus: EventBus, interval: Duration) -> Self {
        let scheduler = PollScheduler::new(info.address.clone(), SchedulerTiming::from_config(config));
        Self {
            info,
            unit: config.weight_unit.clone(),
            stop_timeout: config.stop_timeout(),
            read_timeout: config.read_timeout(),
            status: AtomicU8::new(DeviceStatus::Disconnected as u8),
            disposed: AtomicBool::new(false),
            state: RwLock::new(Arc::new(AggregatorState::new())),
            bus,
            gate: ReadGate::new(config.max_outstanding_reads),
            live_load: LiveLoadTracker::new(),
            scheduler,
            interval: Mutex::new(interval),
            session: Mutex::new(CancelToken::new()),
        }
    }

    // ── Identity and status ───────────────────────────────────

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn address(&self) -> &str {
        &self.info.address
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: DeviceStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Claim the `Disconnected -> Connecting` move.  Returns the status
    /// that blocked the claim on failure.
    pub fn begin_connecting(&self) -> core::result::Result<(), DeviceStatus> {
        self.status
            .compare_exchange(
                DeviceStatus::Disconnected as u8,
                DeviceStatus::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(DeviceStatus::from_u8)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Connected and not disposed.
    pub fn can_execute_commands(&self) -> bool {
        self.status() == DeviceStatus::Connected && !self.is_disposed()
    }

    /// Token for one-off reads of the current connection.  Cancelled by
    /// [`DeviceCore::end_session`].
    pub fn session(&self) -> CancelToken {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fresh token for a new connection; tokens are sticky once cancelled.
    pub fn begin_session(&self) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = CancelToken::new();
    }

    pub fn end_session(&self) {
        self.session().cancel();
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn gate(&self) -> &ReadGate {
        &self.gate
    }

    pub fn live_load(&self) -> &LiveLoadTracker {
        &self.live_load
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ── State ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<AggregatorState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the state copy-on-write.
    pub fn update<R>(&self, f: impl FnOnce(&mut AggregatorState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }

    pub fn replace_state(&self, state: AggregatorState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }

    /// Apply a general frame; returns the platform count to read next.
    pub fn ingest_general(&self, bytes: &[u8]) -> u8 {
        let outcome = self.update(|s| s.apply_general(bytes));
        let snapshot = self.snapshot();
        if outcome.resized {
            debug!(
                "Device[{}]: table resized to {}",
                self.address(),
                snapshot.platform_count()
            );
        }
        self.live_load.observe_general(&snapshot);
        snapshot.platform_count()
    }

    /// Apply a relayed platform frame and publish it if it changed.
    pub fn ingest_platform(&self, id: u8, bytes: &[u8]) -> bool {
        let changed = self.update(|s| s.apply_platform(id, bytes));
        if changed {
            self.publish_platform(id);
        }
        changed
    }

    /// Apply one per-platform characteristic to platform 1.
    pub fn ingest_field(&self, field: PlatformField, bytes: &[u8]) -> bool {
        self.update(|s| {
            s.platform_mut(1)
                .is_some_and(|p| p.apply_field(field, bytes))
        })
    }

    /// Close a read cycle: live-load notification.
    pub fn finish_cycle(&self) {
        let snapshot = self.snapshot();
        if self.live_load.observe_platforms(&snapshot) {
            info!("Device[{}]: live load fixed on all platforms", self.address());
            self.bus.emit(ScaleEvent::LiveLoadFixed {
                device: self.info.address.clone(),
            });
        }
    }

    pub fn publish_platform(&self, id: u8) {
        if let Some(p) = self.snapshot().platform(id) {
            self.emit_weight(p);
        }
    }

    fn emit_weight(&self, p: &PlatformState) {
        self.bus.emit(ScaleEvent::WeightUpdated {
            device: self.info.address.clone(),
            platform_id: p.id,
            weight: p.net_weight,
            stable: p.stable,
            violation: p.violation(),
        });
    }

    pub fn emit_connection(&self, connected: bool, error: Option<String>) {
        self.bus.emit(ScaleEvent::ConnectionStatusChanged {
            device: self.info.address.clone(),
            connected,
            error,
        });
    }

    /// Reset every platform and the device status to disconnected.
    pub fn mark_disconnected(&self) {
        self.update(|s| s.mark_disconnected());
        self.set_status(DeviceStatus::Disconnected);
    }

    pub fn formatted_weight(&self, platform_id: u8) -> String {
        match self.snapshot().platform(platform_id) {
            Some(p) => p.formatted_weight(&self.unit),
            None => "Disconnected".into(),
        }
    }

    pub fn total_weight(&self) -> f32 {
        self.snapshot().total_weight()
    }

    /// Ids of the platforms currently in the table.
    pub fn platform_ids(&self) -> Vec<u8> {
        self.snapshot().platforms.iter().map(|p| p.id).collect()
    }

    // ── Continuous reading ────────────────────────────────────

    pub fn read_interval(&self) -> Duration {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_read_interval(&self, interval: Duration) {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner) = interval;
    }

    pub fn is_reading(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Start polling `delegate`.  The interval is validated first; when
    /// the device is not connected it is stored and nothing starts.
    pub fn start_reading<D: PollDelegate>(&self, delegate: Arc<D>, interval: Duration) -> Result<()> {
        config::validate_interval(interval)?;
        self.set_read_interval(interval);
        if !self.can_execute_commands() {
            debug!("Device[{}]: not connected, reading not started", self.address());
            return Ok(());
        }
        self.scheduler.start(delegate, interval)
    }

    /// Stop polling with the configured bound.
    pub async fn stop_reading(&self) -> bool {
        let stopped = self.scheduler.stop(self.stop_timeout).await;
        if !stopped {
            warn!("Device[{}]: reading did not stop in time", self.address());
        }
        stopped
    }

    /// Stop, store the new interval, restart if it was active and the
    /// device is still connected.
    pub async fn change_read_interval<D: PollDelegate>(
        &self,
        delegate: Arc<D>,
        interval: Duration,
    ) -> Result<()> {
        config::validate_interval(interval)?;
        let was_active = self.is_reading();
        if was_active {
            self.stop_reading().await;
        }
        self.set_read_interval(interval);
        info!(
            "Device[{}]: read interval now {}ms",
            self.address(),
            interval.as_millis()
        );
        if was_active && self.can_execute_commands() {
            self.scheduler.start(delegate, interval)?;
        }
        Ok(())
    }

    /// Watchdog expiry: reading has halted, tell observers.
    pub fn report_fatal(&self, error: &crate::error::Error) {
        warn!("Device[{}]: reading halted ({error})", self.address());
        self.emit_connection(false, Some(error.to_string()));
    }
}

impl core::fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceCore")
            .field("address", &self.info.address)
            .field("status", &self.status())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
