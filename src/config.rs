//! Runtime configuration parameters
//!
//! All tunable timing and simulation parameters for the scale stack.
//! Values can be loaded from a JSON file by the host application; every
//! field is range-checked by [`ScaleConfig::validate`] before use.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// Hard floor for read and simulation intervals.
pub const MIN_INTERVAL_MS: u64 = 100;

/// Maximum number of platforms an aggregator can relay.
pub const MAX_PLATFORMS: usize = 12;

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    // --- Polling ---
    /// Continuous read interval (milliseconds)
    pub read_interval_ms: u64,
    /// Back-off after a failed poll cycle (milliseconds)
    pub failure_backoff_ms: u64,
    /// Continuous unresponsiveness treated as fatal (milliseconds)
    pub watchdog_timeout_ms: u64,
    /// Bounded wait for the poll worker to stop (milliseconds)
    pub stop_timeout_ms: u64,

    // --- Transport ---
    /// GATT connect timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// Single characteristic read timeout (milliseconds)
    pub read_timeout_ms: u64,
    /// Outstanding reads allowed per device before new reads are refused
    pub max_outstanding_reads: usize,

    // --- Display ---
    /// Unit suffix appended to formatted weights
    pub weight_unit: String,

    // --- Simulation ---
    pub simulation: SimulationConfig,
}

/// Parameters for the always-available simulated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of simulated platforms (1-12)
    pub platform_count: u8,
    /// Simulation tick interval (milliseconds)
    pub interval_ms: u64,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
    /// Whether simulated platforms run with live-load capture enabled
    pub live_load: bool,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            // Polling
            read_interval_ms: 250,
            failure_backoff_ms: 2_000,
            watchdog_timeout_ms: 30_000,
            stop_timeout_ms: 10_000,

            // Transport
            connect_timeout_ms: 10_000,
            read_timeout_ms: 5_000,
            max_outstanding_reads: 30,

            // Display
            weight_unit: "kg".into(),

            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            platform_count: 4,
            interval_ms: 250,
            seed: None,
            live_load: false,
        }
    }
}

impl ScaleConfig {
    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<()> {
        validate_interval(Duration::from_millis(self.read_interval_ms))?;
        self.simulation.validate()?;
        if self.failure_backoff_ms == 0 {
            return Err(ValidationError::Config("failure_backoff_ms").into());
        }
        if self.watchdog_timeout_ms <= self.read_interval_ms {
            return Err(ValidationError::Config("watchdog_timeout_ms").into());
        }
        if self.stop_timeout_ms == 0 {
            return Err(ValidationError::Config("stop_timeout_ms").into());
        }
        if self.connect_timeout_ms == 0 {
            return Err(ValidationError::Config("connect_timeout_ms").into());
        }
        if self.read_timeout_ms == 0 {
            return Err(ValidationError::Config("read_timeout_ms").into());
        }
        if self.max_outstanding_reads == 0 {
            return Err(ValidationError::Config("max_outstanding_reads").into());
        }
        Ok(())
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        validate_platform_count(self.platform_count)?;
        validate_interval(Duration::from_millis(self.interval_ms))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Intervals below [`MIN_INTERVAL_MS`] are a validation error.
pub fn validate_interval(interval: Duration) -> Result<()> {
    let requested_ms = interval.as_millis() as u64;
    if requested_ms < MIN_INTERVAL_MS {
        return Err(ValidationError::IntervalTooShort {
            requested_ms,
            min_ms: MIN_INTERVAL_MS,
        }
        .into());
    }
    Ok(())
}

pub fn validate_platform_count(count: u8) -> Result<()> {
    if count == 0 || count as usize > MAX_PLATFORMS {
        return Err(ValidationError::PlatformCount(count).into());
    }
    Ok(())
}
