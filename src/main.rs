//! Scalelink: demo entry point.
//!
//! Runs the device manager against the simulated scale and logs every
//! event, without any BLE hardware.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NullAdapter / NullTransport      LogEventSink                 │
//! │  (BleAdapter, BleTransport)       (EventSink)                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │       DeviceManager · PhaseMachine · ScaleDevice       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  PollScheduler (one worker per device, delegate-driven)        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `scalelink [config.json] [run_seconds]`
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use core::time::Duration;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{info, warn};

use scalelink::adapters::log_sink::LogEventSink;
use scalelink::adapters::null::{NullAdapter, NullTransport};
use scalelink::app::commands::ScaleCommand;
use scalelink::app::events::EventBus;
use scalelink::app::manager::DeviceManager;
use scalelink::config::ScaleConfig;

const DEFAULT_RUN_SECONDS: u64 = 5;
const DISCOVERY_WINDOW: Duration = Duration::from_secs(1);

fn load_config(path: Option<&str>) -> Result<ScaleConfig> {
    let Some(path) = path else {
        info!("Config: defaults");
        return Ok(ScaleConfig::default());
    };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let config: ScaleConfig =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    info!("Config: loaded from {path}");
    Ok(config)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  Scalelink v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first().map(String::as_str))?;
    config.validate().context("invalid configuration")?;
    let run_for = match args.get(1) {
        Some(s) => Duration::from_secs(s.parse().with_context(|| format!("run seconds: {s}"))?),
        None => Duration::from_secs(DEFAULT_RUN_SECONDS),
    };

    // ── 3. Wiring ─────────────────────────────────────────────
    let bus = EventBus::new();
    bus.subscribe(Arc::new(LogEventSink::new()));
    let manager: DeviceManager<NullTransport> = DeviceManager::new(config, bus)?;

    futures_lite::future::block_on(async {
        // ── 4. Discovery (no radio: finds nothing) ────────────
        manager.discover(&NullAdapter, DISCOVERY_WINDOW).await;

        // ── 5. Connect the simulator ──────────────────────────
        let Some(sim) = manager.simulated() else {
            bail!("simulated device missing from registry");
        };
        let address = sim.address().to_string();
        if !manager
            .handle_command(ScaleCommand::Connect { address })
            .await?
        {
            bail!("simulated device failed to connect");
        }

        async_io_mini::Timer::after(run_for / 2).await;
        if !manager.handle_command(ScaleCommand::TareAll).await? {
            warn!("Tare all refused");
        }
        async_io_mini::Timer::after(run_for / 2).await;

        // ── 6. Summary ────────────────────────────────────────
        let count = sim.snapshot().platform_count();
        for id in 1..=count {
            info!("P{:02}: {}", id, manager.formatted_weight(id));
        }
        info!("Total: {:.2} {}", manager.total_weight(), manager.config().weight_unit);

        manager.shutdown().await;
        Ok::<_, anyhow::Error>(())
    })
}
