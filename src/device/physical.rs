//! Transport-backed device.
//!
//! The advertised name decides the read strategy before the first read:
//!
//! - **Aggregator**: general characteristic, then platform characteristics
//!   `1..=N` where `N` comes from the general frame just applied.
//! - **Per-platform**: one characteristic per [`PlatformField`], firmware
//!   first so weight decoding in the same cycle knows its encoding.
//!
//! Every transport failure is caught here.  Connect failures become a
//! `false` return plus a status event; read failures abort the current
//! cycle and let the scheduler back off.

use core::time::Duration;
use std::sync::Arc;

use edge_executor::LocalExecutor;
use log::{debug, info, warn};

use crate::app::events::EventBus;
use crate::app::ports::{BleTransport, PollDelegate};
use crate::cancel::{self, CancelToken};
use crate::config::ScaleConfig;
use crate::error::{Error, Result, TransportError};
use crate::protocol::aggregator::AggregatorState;
use crate::protocol::characteristics::{
    self, AGGREGATOR_SERVICE, CHAR_AGGREGATOR_COMMAND, CHAR_GENERAL, CHAR_TARE, CHAR_ZERO,
    COMMAND_SERVICE, COMMAND_TRIGGER, opcode,
};
use crate::protocol::fields::PlatformField;
use crate::protocol::name::Topology;

use super::{ConnectParams, DeviceCore, DeviceInfo, DeviceStatus};

/// Upper bound on concurrently spawned per-platform commands.
const FAN_OUT_TASKS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlatformCommand {
    Tare,
    Zero,
}

impl PlatformCommand {
    fn opcode(self) -> u8 {
        match self {
            Self::Tare => opcode::TARE,
            Self::Zero => opcode::ZERO,
        }
    }

    fn characteristic(self) -> u128 {
        match self {
            Self::Tare => CHAR_TARE,
            Self::Zero => CHAR_ZERO,
        }
    }
}

struct PhysicalInner<T: BleTransport> {
    core: DeviceCore,
    transport: T,
}

/// A BLE scale reached through `T`.
pub struct PhysicalDevice<T: BleTransport> {
    inner: Arc<PhysicalInner<T>>,
}

impl<T: BleTransport> Clone for PhysicalDevice<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: BleTransport> PhysicalDevice<T> {
    pub fn new(info: DeviceInfo, transport: T, config: &ScaleConfig, bus: EventBus) -> Self {
        let core = DeviceCore::new(info, config, bus, config.read_interval());
        Self {
            inner: Arc::new(PhysicalInner { core, transport }),
        }
    }

    pub fn core(&self) -> &DeviceCore {
        &self.inner.core
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Open the connection and initialize the platform table.
    ///
    /// Returns `true` immediately if already connected.
    pub async fn connect(&self, params: ConnectParams) -> bool {
        let core = self.core();
        if core.is_disposed() {
            warn!("Device[{}]: connect on disposed device", core.address());
            return false;
        }
        match core.begin_connecting() {
            Ok(()) => {}
            Err(DeviceStatus::Connected) => return true,
            Err(_) => {
                debug!("Device[{}]: connect already in progress", core.address());
                return false;
            }
        }

        info!("Device[{}]: connecting ({})", core.address(), core.info().name);
        let transport = &self.inner.transport;
        let result = cancel::bounded(
            params.timeout,
            &params.cancel,
            transport.connect(params.timeout, &params.cancel),
        )
        .await;

        match result {
            Ok(()) => {
                core.replace_state(initial_state(core.info()));
                core.live_load().reset();
                core.begin_session();
                core.set_status(DeviceStatus::Connected);
                info!("Device[{}]: connected", core.address());
                core.emit_connection(true, None);
                true
            }
            Err(e) => {
                warn!("Device[{}]: connect failed ({e})", core.address());
                if let Err(release) = transport.cancel_connection().await {
                    debug!("Device[{}]: release after failed connect: {release}", core.address());
                }
                core.set_status(DeviceStatus::Disconnected);
                core.emit_connection(false, Some(e.to_string()));
                false
            }
        }
    }

    /// Stop reading, release the transport, reset every platform.
    /// Cleanup failures are logged and never stop the teardown.
    pub async fn disconnect(&self) {
        let core = self.core();
        let was_connected = core.status() != DeviceStatus::Disconnected;

        core.end_session();
        core.stop_reading().await;
        if let Err(e) = self.inner.transport.cancel_connection().await {
            warn!("Device[{}]: release failed ({e})", core.address());
        }
        core.mark_disconnected();

        if was_connected {
            info!("Device[{}]: disconnected", core.address());
            core.emit_connection(false, None);
        }
    }

    /// Disconnect and refuse every further command.
    pub async fn dispose(&self) {
        if self.core().is_disposed() {
            return;
        }
        self.core().mark_disposed();
        self.disconnect().await;
    }

    // ── Reading ───────────────────────────────────────────────

    /// One full read cycle outside the scheduler.  Shares the scheduler's
    /// in-flight guard, so it is refused while a cycle runs, and stops
    /// early if the device is disconnected meanwhile.
    pub async fn initial_read(&self) -> bool {
        let core = self.core();
        if !core.can_execute_commands() {
            return false;
        }
        let Some(_guard) = core.scheduler().try_begin_cycle() else {
            debug!("Device[{}]: initial read skipped, cycle in flight", core.address());
            return false;
        };
        match self.inner.read_cycle(&core.session()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Device[{}]: initial read failed ({e})", core.address());
                false
            }
        }
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

    pub async fn tare(&self, platform_id: u8) -> bool {
        self.inner.command(PlatformCommand::Tare, platform_id).await
    }

    pub async fn zero(&self, platform_id: u8) -> bool {
        self.inner.command(PlatformCommand::Zero, platform_id).await
    }

    pub async fn tare_all(&self) -> bool {
        self.inner.command_all(PlatformCommand::Tare).await
    }

    pub async fn zero_all(&self) -> bool {
        self.inner.command_all(PlatformCommand::Zero).await
    }
}

/// Platform table a fresh connection starts from.
fn initial_state(info: &DeviceInfo) -> AggregatorState {
    match info.topology() {
        Topology::Aggregator { platform_count } => {
            let mut state = AggregatorState::presized(platform_count);
            if let Some(fw) = info.firmware() {
                state.general.firmware_version = fw;
            }
            state
        }
        Topology::PerPlatform {
            network,
            platform_number,
        } => {
            let mut state = AggregatorState::with_platforms(1);
            if let Some(p) = state.platform_mut(1) {
                p.mark_connected();
                p.network_number = Some(network);
                p.platform_number = Some(platform_number);
                if let Some(fw) = info.firmware() {
                    p.firmware_version = fw;
                }
            }
            state
        }
    }
}

impl<T: BleTransport> PhysicalInner<T> {
    /// Read one characteristic through the read gate.  `Ok(None)` when the
    /// gate refused the read.
    async fn read(
        &self,
        service: u128,
        characteristic: u128,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>> {
        let Some(_permit) = self.core.gate().try_acquire() else {
            debug!(
                "Device[{}]: {} reads outstanding, read dropped",
                self.core.address(),
                self.core.gate().limit()
            );
            return Ok(None);
        };
        let bytes = cancel::bounded(
            self.core.read_timeout(),
            cancel,
            self.transport
                .read_characteristic(service, characteristic, cancel),
        )
        .await?;
        Ok(Some(bytes))
    }

    async fn read_cycle(&self, cancel: &CancelToken) -> Result<()> {
        match self.core.info().topology() {
            Topology::Aggregator { .. } => self.read_aggregator(cancel).await,
            Topology::PerPlatform { .. } => self.read_fields(cancel).await,
        }
    }

    async fn read_aggregator(&self, cancel: &CancelToken) -> Result<()> {
        let Some(general) = self.read(AGGREGATOR_SERVICE, CHAR_GENERAL, cancel).await? else {
            return Ok(());
        };
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }
        let count = self.core.ingest_general(&general);

        for id in 1..=count {
            let characteristic = characteristics::platform_characteristic(id);
            let Some(bytes) = self.read(AGGREGATOR_SERVICE, characteristic, cancel).await? else {
                continue;
            };
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled.into());
            }
            self.core.ingest_platform(id, &bytes);
        }

        self.core.finish_cycle();
        Ok(())
    }

    async fn read_fields(&self, cancel: &CancelToken) -> Result<()> {
        let mut changed = false;
        for field in PlatformField::ALL {
            let (service, characteristic) = characteristics::field_address(field);
            let Some(bytes) = self.read(service, characteristic, cancel).await? else {
                continue;
            };
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled.into());
            }
            changed |= self.core.ingest_field(field, &bytes);
        }
        // The pad answered, so its link is up even when uncalibrated.
        changed |= self.core.update(|s| s.platform_mut(1).is_some_and(|p| p.mark_connected()));

        if changed {
            self.core.publish_platform(1);
        }
        self.core.live_load().observe_general(&self.core.snapshot());
        self.core.finish_cycle();
        Ok(())
    }

    async fn command(&self, command: PlatformCommand, platform_id: u8) -> bool {
        let core = &self.core;
        if !core.can_execute_commands() {
            debug!("Device[{}]: {command:?} ignored, not connected", core.address());
            return false;
        }
        if core.snapshot().platform(platform_id).is_none() {
            warn!("Device[{}]: {command:?} for unknown platform {platform_id}", core.address());
            return false;
        }

        let (service, characteristic, payload) = match core.info().topology() {
            Topology::Aggregator { .. } => (
                AGGREGATOR_SERVICE,
                CHAR_AGGREGATOR_COMMAND,
                characteristics::aggregator_command(command.opcode(), platform_id).to_vec(),
            ),
            Topology::PerPlatform { .. } => {
                (COMMAND_SERVICE, command.characteristic(), COMMAND_TRIGGER.to_vec())
            }
        };

        let write = self
            .transport
            .write_characteristic(service, characteristic, &payload);
        match cancel::with_timeout(core.read_timeout(), write)
            .await
            .and_then(|r| r)
        {
            Ok(()) => {
                info!("Device[{}]: {command:?} platform {platform_id}", core.address());
                true
            }
            Err(e) => {
                warn!(
                    "Device[{}]: {command:?} platform {platform_id} failed ({e})",
                    core.address()
                );
                false
            }
        }
    }

    /// Issue `command` to every platform concurrently and wait for all.
    async fn command_all(&self, command: PlatformCommand) -> bool {
        if !self.core.can_execute_commands() {
            return false;
        }
        let ids = self.core.platform_ids();
        if ids.is_empty() {
            debug!("Device[{}]: {command:?} all, no platforms yet", self.core.address());
            return false;
        }

        let executor: LocalExecutor<'_, FAN_OUT_TASKS> = LocalExecutor::new();
        let tasks: Vec<_> = ids
            .iter()
            .map(|&id| executor.spawn(self.command(command, id)))
            .collect();
        let all_ok = executor
            .run(async {
                let mut ok = true;
                for task in tasks {
                    ok &= task.await;
                }
                ok
            })
            .await;

        self.core.live_load().reset();
        all_ok
    }
}

impl<T: BleTransport> PollDelegate for PhysicalInner<T> {
    async fn poll_cycle(&self, cancel: &CancelToken) -> Result<()> {
        if !self.core.can_execute_commands() {
            return Err(TransportError::NotConnected.into());
        }
        self.read_cycle(cancel).await
    }

    fn on_fatal(&self, error: &Error) {
        self.core.report_fatal(error);
    }
}
