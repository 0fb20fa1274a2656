//! Simulated aggregator.
//!
//! Produces synthetic 14-byte frames and feeds them through the same
//! decoder path as a physical aggregator, so everything downstream of the
//! frame bytes is exercised for real.
//!
//! ## Per-platform, per-tick probabilities
//!
//! | Flag            | Probability                                    |
//! |-----------------|------------------------------------------------|
//! | stable          | 0.85                                           |
//! | overload        | 0.03 (one roll shared with underload)          |
//! | underload       | 0.02                                           |
//! | charging        | 0.10                                           |
//! | live-load fixed | 0.30, only with live load enabled and stable   |
//!
//! Connected and calibrated are always set.  Zero is set while the gross
//! reading is within 0.5 of zero.  A fixed seed makes every run identical.

use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::app::events::EventBus;
use crate::app::ports::PollDelegate;
use crate::cancel::CancelToken;
use crate::config::{ScaleConfig, SimulationConfig};
use crate::error::{Error, Result};
use crate::protocol::aggregator::AggregatorState;
use crate::protocol::frame::{AggregatorFrame, StatusFlags};
use crate::protocol::name::AdvertisedName;

use super::{ConnectParams, DeviceCore, DeviceInfo, DeviceKind, DeviceStatus};

pub const P_STABLE: f64 = 0.85;
pub const P_OVERLOAD: f64 = 0.03;
pub const P_UNDERLOAD: f64 = 0.02;
pub const P_CHARGING: f64 = 0.10;
pub const P_LIVE_LOAD_FIXED: f64 = 0.30;

/// Gross readings closer to zero than this set the zero flag.
pub const ZERO_BAND: f32 = 0.5;

/// Address the simulated device registers under.
pub const SIMULATED_ADDRESS: &str = "SIM-00:00:00:00:00:00";

const DECIMAL_PLACES: u8 = 1;
const LOAD_RANGE: core::ops::Range<f32> = 40.0..600.0;
const BATTERY_RANGE_MV: core::ops::Range<i16> = 6_400..8_400;

/// Simulated physical state of one pad.
#[derive(Debug, Clone)]
struct SimPad {
    load: f32,
    zero_offset: f32,
    tare: Option<f32>,
    battery_mv: i16,
}

impl SimPad {
    fn gross(&self) -> f32 {
        self.load - self.zero_offset
    }
}

struct SimModel {
    rng: StdRng,
    pads: Vec<SimPad>,
}

impl SimModel {
    fn new(config: &SimulationConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pads = (0..config.platform_count)
            .map(|_| SimPad {
                load: rng.gen_range(LOAD_RANGE),
                zero_offset: 0.0,
                tare: None,
                battery_mv: rng.gen_range(BATTERY_RANGE_MV),
            })
            .collect();
        Self { rng, pads }
    }

    /// Advance one tick and encode the general frame plus one frame per pad.
    fn tick(&mut self, live_load: bool) -> (Vec<u8>, Vec<[u8; 14]>) {
        let mut frames = Vec::with_capacity(self.pads.len());
        let mut total_net = 0.0;
        let mut total_gross = 0.0;
        let mut all_stable = true;
        let mut min_battery = i16::MAX;

        for pad in &mut self.pads {
            let stable = self.rng.gen_bool(P_STABLE);
            let jitter = if stable { 0.05 } else { 2.5 };
            pad.load += self.rng.gen_range(-jitter..=jitter);
            pad.battery_mv = (pad.battery_mv + self.rng.gen_range(-3..=2))
                .clamp(BATTERY_RANGE_MV.start, BATTERY_RANGE_MV.end);

            let roll: f64 = self.rng.r#gen();
            let overload = roll < P_OVERLOAD;
            let underload = !overload && roll < P_OVERLOAD + P_UNDERLOAD;
            let charging = self.rng.gen_bool(P_CHARGING);
            let fixed = live_load && stable && self.rng.gen_bool(P_LIVE_LOAD_FIXED);

            let gross = pad.gross();
            let net = gross - pad.tare.unwrap_or(0.0);
            total_net += net;
            total_gross += gross;
            all_stable &= stable;
            min_battery = min_battery.min(pad.battery_mv);

            let status = StatusFlags {
                connected: true,
                calibrated: true,
                tared: pad.tare.is_some(),
                overload,
                underload,
                stable,
                zero: gross.abs() < ZERO_BAND,
                live_load_enabled: live_load,
                live_load_fixed: fixed,
                charging,
            };
            frames.push(
                AggregatorFrame {
                    net_weight: net,
                    gross_weight: gross,
                    byte8: 0,
                    decimal_places: DECIMAL_PLACES,
                    status,
                    battery_mv: pad.battery_mv,
                }
                .encode(),
            );
        }

        let general = AggregatorFrame {
            net_weight: total_net,
            gross_weight: total_gross,
            byte8: self.pads.len() as u8,
            decimal_places: DECIMAL_PLACES,
            status: StatusFlags {
                connected: true,
                calibrated: true,
                stable: all_stable,
                zero: total_gross.abs() < ZERO_BAND,
                live_load_enabled: live_load,
                ..StatusFlags::default()
            },
            battery_mv: if self.pads.is_empty() { 0 } else { min_battery },
        };
        (general.encode().to_vec(), frames)
    }

    fn pad_mut(&mut self, platform_id: u8) -> Option<&mut SimPad> {
        (platform_id as usize)
            .checked_sub(1)
            .and_then(|i| self.pads.get_mut(i))
    }
}

struct SimInner {
    core: DeviceCore,
    settings: SimulationConfig,
    model: Mutex<SimModel>,
}

/// Pseudo-random aggregator behind the same capability surface as a
/// physical device.
#[derive(Clone)]
pub struct SimulatedDevice {
    inner: Arc<SimInner>,
}

impl SimulatedDevice {
    /// Build from `config.simulation`.  Rejects platform counts outside
    /// 1–12 and intervals below 100 ms.
    pub fn new(config: &ScaleConfig, bus: EventBus) -> Result<Self> {
        let settings = config.simulation.clone();
        settings.validate()?;

        let name = format!("SIMULATOR-{}P", settings.platform_count);
        let info = DeviceInfo {
            address: SIMULATED_ADDRESS.into(),
            name: AdvertisedName::parse(&name),
            kind: DeviceKind::Simulated,
            rssi: None,
        };
        let core = DeviceCore::new(info, config, bus, settings.interval());
        let model = Mutex::new(SimModel::new(&settings));
        Ok(Self {
            inner: Arc::new(SimInner {
                core,
                settings,
                model,
            }),
        })
    }

    pub fn core(&self) -> &DeviceCore {
        &self.inner.core
    }

    pub fn settings(&self) -> &SimulationConfig {
        &self.inner.settings
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub async fn connect(&self, _params: ConnectParams) -> bool {
        let core = self.core();
        if core.is_disposed() {
            warn!("Device[{}]: connect on disposed device", core.address());
            return false;
        }
        match core.begin_connecting() {
            Ok(()) => {}
            Err(DeviceStatus::Connected) => return true,
            Err(_) => return false,
        }

        let count = self.inner.settings.platform_count;
        core.replace_state(AggregatorState::presized(count));
        core.live_load().reset();
        core.set_status(DeviceStatus::Connected);
        info!("Device[{}]: simulator connected ({count} platforms)", core.address());
        core.emit_connection(true, None);
        true
    }

    pub async fn disconnect(&self) {
        let core = self.core();
        let was_connected = core.status() != DeviceStatus::Disconnected;
        core.stop_reading().await;
        core.mark_disconnected();
        if was_connected {
            info!("Device[{}]: simulator disconnected", core.address());
            core.emit_connection(false, None);
        }
    }

    pub async fn dispose(&self) {
        if self.core().is_disposed() {
            return;
        }
        self.core().mark_disposed();
        self.disconnect().await;
    }

    // ── Reading ───────────────────────────────────────────────

    /// Generate and apply one round of frames.  Returns `false` when the
    /// device is not connected.
    pub fn tick(&self) -> bool {
        self.inner.tick(None)
    }

    pub async fn initial_read(&self) -> bool {
        let Some(_guard) = self.core().scheduler().try_begin_cycle() else {
            return false;
        };
        self.tick()
    }

    pub fn start_continuous_reading(&self, interval: Duration) -> Result<()> {
        self.core().start_reading(self.inner.clone(), interval)
    }

    pub async fn change_read_interval(&self, interval: Duration) -> Result<()> {
        self.core()
            .change_read_interval(self.inner.clone(), interval)
            .await
    }

    // ── Commands ──────────────────────────────────────────────

    /// Toggle the tare on one pad; shows up on the next tick.
    pub fn tare(&self, platform_id: u8) -> bool {
        self.inner.with_pad(platform_id, "tare", |pad| {
            pad.tare = match pad.tare {
                Some(_) => None,
                None => Some(pad.gross()),
            };
        })
    }

    /// Zero one pad: the current load becomes the new zero.
    pub fn zero(&self, platform_id: u8) -> bool {
        self.inner.with_pad(platform_id, "zero", |pad| {
            pad.zero_offset = pad.load;
            pad.tare = None;
        })
    }

    pub fn tare_all(&self) -> bool {
        let ok = self.for_each_platform(|id| self.tare(id));
        self.core().live_load().reset();
        ok
    }

    pub fn zero_all(&self) -> bool {
        let ok = self.for_each_platform(|id| self.zero(id));
        self.core().live_load().reset();
        ok
    }

    fn for_each_platform(&self, mut f: impl FnMut(u8) -> bool) -> bool {
        if !self.core().can_execute_commands() {
            return false;
        }
        let count = self.inner.settings.platform_count;
        (1..=count).fold(true, |ok, id| f(id) && ok)
    }
}

impl SimInner {
    fn tick(&self, cancel: Option<&CancelToken>) -> bool {
        if !self.core.can_execute_commands() {
            return false;
        }
        let (general, platforms) = self
            .model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick(self.settings.live_load);

        let stopped = || cancel.is_some_and(CancelToken::is_cancelled);
        if stopped() {
            return false;
        }
        let count = self.core.ingest_general(&general);
        for (index, frame) in platforms.iter().enumerate().take(count as usize) {
            if stopped() {
                return false;
            }
            self.core.ingest_platform(index as u8 + 1, frame);
        }
        self.core.finish_cycle();
        debug!("Device[{}]: simulator tick", self.core.address());
        true
    }

    fn with_pad(&self, platform_id: u8, what: &str, f: impl FnOnce(&mut SimPad)) -> bool {
        if !self.core.can_execute_commands() {
            return false;
        }
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        match model.pad_mut(platform_id) {
            Some(pad) => {
                f(pad);
                info!("Device[{}]: {what} platform {platform_id}", self.core.address());
                true
            }
            None => {
                warn!(
                    "Device[{}]: {what} for unknown platform {platform_id}",
                    self.core.address()
                );
                false
            }
        }
    }
}

impl PollDelegate for SimInner {
    async fn poll_cycle(&self, cancel: &CancelToken) -> Result<()> {
        if self.tick(Some(cancel)) || cancel.is_cancelled() {
            Ok(())
        } else {
            Err(crate::error::TransportError::NotConnected.into())
        }
    }

    fn on_fatal(&self, error: &Error) {
        self.core.report_fatal(error);
    }
}
