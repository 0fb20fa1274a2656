//! Device manager: the single owner of device lifecycle.
//!
//! [`DeviceManager`] holds the registry of known devices (always including
//! one simulated device), the current device, and the connection phase.
//! It is constructed explicitly and passed around; there is no global
//! instance.
//!
//! ```text
//!  BleAdapter ──discover──▶ ┌──────────────────────────┐ ──▶ EventBus
//!                           │      DeviceManager       │
//!  ScaleCommand ──────────▶ │  registry · current ·    │
//!                           │  PhaseMachine            │
//!                           └──────────────────────────┘
//! ```

use core::cell::Cell;
use core::time::Duration;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures_lite::{StreamExt, future};
use log::{info, warn};

use crate::config::ScaleConfig;
use crate::device::{ConnectParams, DeviceInfo, PhysicalDevice, ScaleDevice, SimulatedDevice};
use crate::error::Result;
use crate::phase::{ConnectionPhase, PhaseMachine};

use super::commands::ScaleCommand;
use super::events::{EventBus, ScaleEvent};
use super::ports::{BleAdapter, BleTransport, EventSink};

// ───────────────────────────────────────────────────────────────
// Phase watch
// ───────────────────────────────────────────────────────────────

/// Drops the phase to `Disconnected` when the current device reports a
/// lost connection on its own (watchdog, failed connect).
struct PhaseWatch {
    phase: Weak<PhaseMachine>,
    current: Arc<RwLock<Option<String>>>,
}

impl EventSink for PhaseWatch {
    fn emit(&self, event: &ScaleEvent) {
        let ScaleEvent::ConnectionStatusChanged {
            device,
            connected: false,
            ..
        } = event
        else {
            return;
        };
        let is_current = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(device.as_str());
        if is_current {
            if let Some(phase) = self.phase.upgrade() {
                phase.reset();
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// DeviceManager
// ───────────────────────────────────────────────────────────────

pub struct DeviceManager<T: BleTransport> {
    config: ScaleConfig,
    bus: EventBus,
    phase: Arc<PhaseMachine>,
    registry: RwLock<Vec<ScaleDevice<T>>>,
    current: RwLock<Option<ScaleDevice<T>>>,
    current_address: Arc<RwLock<Option<String>>>,
}

impl<T: BleTransport> DeviceManager<T> {
    /// Build the manager and its simulated device.  Fails if the
    /// configuration does not validate.
    pub fn new(config: ScaleConfig, bus: EventBus) -> Result<Self> {
        config.validate()?;
        let phase = Arc::new(PhaseMachine::new(bus.clone()));
        let current_address = Arc::new(RwLock::new(None));
        bus.subscribe(Arc::new(PhaseWatch {
            phase: Arc::downgrade(&phase),
            current: current_address.clone(),
        }));

        let simulated = SimulatedDevice::new(&config, bus.clone())?;
        info!(
            "Manager: ready, simulator with {} platforms",
            simulated.settings().platform_count
        );
        Ok(Self {
            config,
            bus,
            phase,
            registry: RwLock::new(vec![ScaleDevice::Simulated(simulated)]),
            current: RwLock::new(None),
            current_address,
        })
    }

    pub fn config(&self) -> &ScaleConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ── Registry ──────────────────────────────────────────────

    pub fn devices(&self) -> Vec<ScaleDevice<T>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn find(&self, address: &str) -> Option<ScaleDevice<T>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| d.address() == address)
            .cloned()
    }

    /// The always-available simulated device.
    pub fn simulated(&self) -> Option<ScaleDevice<T>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|d| matches!(d, ScaleDevice::Simulated(_)))
            .cloned()
    }

    /// Add a device.  Returns `false` if the address is already known.
    pub fn register(&self, device: ScaleDevice<T>) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.iter().any(|d| d.address() == device.address()) {
            return false;
        }
        info!("Manager: registered {} ({})", device.address(), device.info().name);
        registry.push(device);
        true
    }

    /// Build and register a physical device from discovery data.
    pub fn register_physical(&self, info: DeviceInfo, transport: T) -> bool {
        let device = PhysicalDevice::new(info, transport, &self.config, self.bus.clone());
        self.register(device.into())
    }

    /// Scan for `window` and register every new advertiser.  Returns the
    /// number of devices added.
    pub async fn discover<A>(&self, adapter: &A, window: Duration) -> usize
    where
        A: BleAdapter<Transport = T>,
    {
        let mut scan = adapter.scan();
        let added = Cell::new(0usize);
        let collect = async {
            while let Some(adv) = scan.next().await {
                if self.find(&adv.address).is_some() {
                    continue;
                }
                let info = DeviceInfo::physical(adv.address.clone(), &adv.name, Some(adv.rssi));
                if self.register_physical(info, adapter.transport_for(&adv)) {
                    added.set(added.get() + 1);
                }
            }
        };
        future::or(collect, async {
            async_io_mini::Timer::after(window).await;
        })
        .await;

        let added = added.get();
        info!("Manager: discovery finished, {added} new devices");
        added
    }

    // ── Current device and phase ──────────────────────────────

    pub fn phase(&self) -> ConnectionPhase {
        self.phase.current()
    }

    pub fn current_device(&self) -> Option<ScaleDevice<T>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, device: Option<ScaleDevice<T>>) {
        *self
            .current_address
            .write()
            .unwrap_or_else(PoisonError::into_inner) = device.as_ref().map(|d| d.address().to_string());
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = device;
    }

    /// Make `device` the active device and bring it to `Connected`.
    ///
    /// Any previously active device is disconnected first.  On failure at
    /// any step the phase drops to `Disconnected`, the device is torn down
    /// and `false` is returned.
    pub async fn connect_device(&self, device: &ScaleDevice<T>) -> bool {
        if let Some(previous) = self.current_device() {
            if previous.same_device(device) && self.phase() == ConnectionPhase::Connected {
                return true;
            }
            self.disconnect_current_device().await;
        }

        self.phase.transition(ConnectionPhase::Connecting);
        self.set_current(Some(device.clone()));

        if !device.connect(ConnectParams::from_config(&self.config)).await {
            warn!("Manager: {} failed to connect", device.address());
            return self.abort_connect(device).await;
        }

        self.phase.transition(ConnectionPhase::ReadingInitialData);
        if !device.initial_read().await {
            warn!("Manager: {} initial read failed", device.address());
            return self.abort_connect(device).await;
        }
        if let Err(e) = device.start_continuous_reading(device.default_read_interval()) {
            warn!("Manager: {} could not start reading ({e})", device.address());
            return self.abort_connect(device).await;
        }

        // A watchdog or disconnect may have fired meanwhile.
        if !self.phase.transition(ConnectionPhase::Connected) {
            return self.abort_connect(device).await;
        }
        info!("Manager: {} connected", device.address());
        true
    }

    async fn abort_connect(&self, device: &ScaleDevice<T>) -> bool {
        self.phase.reset();
        device.disconnect().await;
        self.set_current(None);
        false
    }

    /// Connect the registered device with `address`.
    pub async fn connect_address(&self, address: &str) -> bool {
        match self.find(address) {
            Some(device) => self.connect_device(&device).await,
            None => {
                warn!("Manager: unknown device {address}");
                false
            }
        }
    }

    /// Disconnect the current device, drop the phase and clear the current
    /// reference.  Teardown always completes.
    pub async fn disconnect_current_device(&self) {
        if let Some(device) = self.current_device() {
            info!("Manager: disconnecting {}", device.address());
            device.disconnect().await;
        }
        self.phase.reset();
        self.set_current(None);
    }

    /// Disconnect and dispose every device.
    pub async fn shutdown(&self) {
        self.disconnect_current_device().await;
        for device in self.devices() {
            device.dispose().await;
        }
        info!("Manager: shut down");
    }

    // ── Commands and queries ──────────────────────────────────

    /// Dispatch one command.  `Ok(false)` means the command was valid but
    /// could not run (no current device, not connected, transport refused).
    pub async fn handle_command(&self, command: ScaleCommand) -> Result<bool> {
        let current = self.current_device();
        let outcome = match (command, current) {
            (ScaleCommand::Connect { address }, _) => self.connect_address(&address).await,
            (ScaleCommand::Disconnect, _) => {
                self.disconnect_current_device().await;
                true
            }
            (ScaleCommand::SetReadInterval(interval), Some(device)) => {
                device.change_read_interval(interval).await?;
                true
            }
            (ScaleCommand::SetReadInterval(interval), None) => {
                crate::config::validate_interval(interval)?;
                false
            }
            (_, None) => false,
            (ScaleCommand::Tare { platform_id }, Some(device)) => device.tare(platform_id).await,
            (ScaleCommand::Zero { platform_id }, Some(device)) => device.zero(platform_id).await,
            (ScaleCommand::TareAll, Some(device)) => device.tare_all().await,
            (ScaleCommand::ZeroAll, Some(device)) => device.zero_all().await,
        };
        Ok(outcome)
    }

    pub fn formatted_weight(&self, platform_id: u8) -> String {
        match self.current_device() {
            Some(device) => device.formatted_weight(platform_id),
            None => "Disconnected".into(),
        }
    }

    pub fn total_weight(&self) -> f32 {
        self.current_device().map_or(0.0, |d| d.total_weight())
    }
}
