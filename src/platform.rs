//! Weighing state of one scale pad.
//!
//! [`PlatformState`] is the leaf entity every decoder mutates.  All
//! mutation goes through `apply_*` methods that return whether anything
//! a consumer could observe actually changed, so callers only fan out
//! events for real updates.
//!
//! ## Invariants
//!
//! - Weight is meaningful only while `calibrated` is set.
//! - While `tared`, any change to gross or net recomputes
//!   `tare = gross - net` immediately.
//! - `overload` and `underload` are never both set.
//! - `battery_percent` is a clamped linear function of `battery_mv`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::protocol::fields::{self, FieldValue, PlatformField};
use crate::protocol::frame::{AggregatorFrame, RecordRole, StatusFlags};

/// Weight deltas below this are sensor noise.
pub const WEIGHT_EPSILON: f32 = 0.001;

/// Battery voltage mapped to 0 %.
pub const BATTERY_EMPTY_MV: i32 = 5_700;
/// Battery voltage mapped to 100 %.
pub const BATTERY_FULL_MV: i32 = 8_400;

/// Rendered while a live-load capture is still settling.
pub const LIVE_LOAD_PLACEHOLDER: &str = "- - - - - -";

/// Map a pack voltage to a percentage.
pub fn battery_percent(millivolts: i16) -> u8 {
    let span = BATTERY_FULL_MV - BATTERY_EMPTY_MV;
    let v = (millivolts as i32).clamp(BATTERY_EMPTY_MV, BATTERY_FULL_MV) - BATTERY_EMPTY_MV;
    ((v * 100 + span / 2) / span) as u8
}

fn weight_changed(old: f32, new: f32) -> bool {
    (old - new).abs() >= WEIGHT_EPSILON
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Which weight-range violation a platform reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    None,
    Overload,
    Underload,
}

/// Display-level status derived from the flags, in formatting priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformStatus {
    Disconnected,
    NotCalibrated,
    LiveLoadPending,
    Overload,
    Underload,
    Ready,
}

/// One scale pad's weighing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformState {
    /// 1-based platform id; `0` on the general (aggregate) record.
    pub id: u8,
    pub name: String,

    pub net_weight: f32,
    pub gross_weight: f32,
    pub tare: f32,
    /// 0–4.
    pub decimal_places: u8,

    pub connected: bool,
    pub calibrated: bool,
    pub tared: bool,
    pub overload: bool,
    pub underload: bool,
    pub zero: bool,
    pub stable: bool,
    pub live_load_enabled: bool,
    pub live_load_fixed: bool,
    pub charging: bool,

    pub battery_mv: i16,
    /// 0–100, derived from `battery_mv`.
    pub battery_percent: u8,

    /// Per-platform devices only.
    pub network_number: Option<u8>,
    /// Per-platform devices only.
    pub platform_number: Option<u8>,
    /// General record only.
    pub platform_count: u8,
    /// Byte 8 of a relayed platform frame.
    pub connection_type: u8,
    pub firmware_version: u16,

    /// Unix millis of the last accepted frame.
    pub last_update_ms: Option<u64>,
    /// Set once the first calibrated reading has been observed.
    pub weight_has_been_set: bool,
}

impl PlatformState {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            name: if id == 0 {
                "Total".into()
            } else {
                format!("Platform {id}")
            },
            net_weight: 0.0,
            gross_weight: 0.0,
            tare: 0.0,
            decimal_places: 0,
            connected: false,
            calibrated: false,
            tared: false,
            overload: false,
            underload: false,
            zero: false,
            stable: false,
            live_load_enabled: false,
            live_load_fixed: false,
            charging: false,
            battery_mv: 0,
            battery_percent: 0,
            network_number: None,
            platform_number: None,
            platform_count: 0,
            connection_type: 0,
            firmware_version: 0,
            last_update_ms: None,
            weight_has_been_set: false,
        }
    }

    /// The general (aggregate) record of an aggregator device.
    pub fn general() -> Self {
        Self::new(0)
    }

    // ── Frame application ─────────────────────────────────────

    /// Apply a raw 14-byte aggregator frame.
    ///
    /// Returns `true` if any observable value changed.  Malformed frames
    /// are rejected without mutation and return `false`.
    pub fn apply_aggregator_frame(&mut self, bytes: &[u8], role: RecordRole) -> bool {
        match AggregatorFrame::parse(bytes, role) {
            Ok(frame) => self.apply_frame(&frame, role),
            Err(e) => {
                log::debug!("Platform {}: frame rejected ({e})", self.id);
                false
            }
        }
    }

    /// Apply an already-parsed frame.
    pub fn apply_frame(&mut self, frame: &AggregatorFrame, role: RecordRole) -> bool {
        let mut changed = false;

        let net_changed = weight_changed(self.net_weight, frame.net_weight);
        let gross_changed = weight_changed(self.gross_weight, frame.gross_weight);
        if net_changed {
            self.net_weight = frame.net_weight;
            changed = true;
        }
        if gross_changed {
            self.gross_weight = frame.gross_weight;
            changed = true;
        }

        match role {
            RecordRole::General => changed |= set(&mut self.platform_count, frame.byte8),
            RecordRole::Platform => changed |= set(&mut self.connection_type, frame.byte8),
        }
        changed |= set(&mut self.decimal_places, frame.decimal_places);

        let was_tared = self.tared;
        changed |= self.apply_status(frame.status);
        changed |= self.apply_battery(frame.battery_mv);
        changed |= self.reconcile_tare(was_tared, net_changed || gross_changed);

        self.mark_updated();
        changed
    }

    /// Apply one per-platform characteristic payload.
    ///
    /// Weight decoding uses the firmware version already known to this
    /// platform.  Malformed payloads return `false` without mutation.
    pub fn apply_field(&mut self, field: PlatformField, bytes: &[u8]) -> bool {
        let value = match fields::decode_field(field, bytes, self.firmware_version) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("Platform {}: {field:?} rejected ({e})", self.id);
                return false;
            }
        };

        let was_tared = self.tared;
        let mut weight_moved = false;
        let changed = match (field, value) {
            (PlatformField::Weight, FieldValue::Weight(w)) => {
                weight_moved = weight_changed(self.net_weight, w);
                if weight_moved {
                    self.net_weight = w;
                }
                weight_moved
            }
            (PlatformField::GrossWeight, FieldValue::Weight(w)) => {
                weight_moved = weight_changed(self.gross_weight, w);
                if weight_moved {
                    self.gross_weight = w;
                }
                weight_moved
            }
            (PlatformField::Calibrated, FieldValue::Flag(b)) => {
                let c = set(&mut self.calibrated, b);
                if b {
                    self.connected = true;
                    self.weight_has_been_set = true;
                }
                c
            }
            (PlatformField::Overload, FieldValue::Flag(b)) => {
                let mut c = set(&mut self.overload, b);
                if b {
                    c |= set(&mut self.underload, false);
                }
                c
            }
            (PlatformField::Underload, FieldValue::Flag(b)) => {
                let mut c = set(&mut self.underload, b);
                if b {
                    c |= set(&mut self.overload, false);
                }
                c
            }
            (PlatformField::Tared, FieldValue::Flag(b)) => set(&mut self.tared, b),
            (PlatformField::Stable, FieldValue::Flag(b)) => set(&mut self.stable, b),
            (PlatformField::Charging, FieldValue::Flag(b)) => set(&mut self.charging, b),
            (PlatformField::LiveLoadEnabled, FieldValue::Flag(b)) => {
                set(&mut self.live_load_enabled, b)
            }
            (PlatformField::LiveLoadFixed, FieldValue::Flag(b)) => {
                set(&mut self.live_load_fixed, b)
            }
            (PlatformField::DecimalPlaces, FieldValue::Count(n)) => {
                set(&mut self.decimal_places, n)
            }
            (PlatformField::NetworkNumber, FieldValue::Count(n)) => {
                set(&mut self.network_number, Some(n))
            }
            (PlatformField::PlatformNumber, FieldValue::Count(n)) => {
                set(&mut self.platform_number, Some(n))
            }
            (PlatformField::FirmwareVersion, FieldValue::Firmware(v)) => {
                set(&mut self.firmware_version, v)
            }
            (PlatformField::BatteryVoltage, FieldValue::Millivolts(mv)) => self.apply_battery(mv),
            _ => false,
        };

        let changed = changed | self.reconcile_tare(was_tared, weight_moved);
        self.mark_updated();
        changed
    }

    // ── Commands ──────────────────────────────────────────────

    /// Toggle tare: capture `gross - net` when untared, clear when tared.
    pub fn toggle_tare(&mut self) {
        if self.tared {
            self.tared = false;
            self.tare = 0.0;
        } else {
            self.tared = true;
            self.tare = self.gross_weight - self.net_weight;
        }
    }

    /// The link to this platform is up, whatever its calibration says.
    pub fn mark_connected(&mut self) -> bool {
        set(&mut self.connected, true)
    }

    /// Reset to the disconnected state, keeping identity and last values.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.stable = false;
        self.live_load_fixed = false;
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn violation(&self) -> Violation {
        if self.overload {
            Violation::Overload
        } else if self.underload {
            Violation::Underload
        } else {
            Violation::None
        }
    }

    pub fn status(&self) -> PlatformStatus {
        if !self.connected {
            PlatformStatus::Disconnected
        } else if !self.calibrated {
            PlatformStatus::NotCalibrated
        } else if self.live_load_enabled && !self.live_load_fixed && !self.stable {
            PlatformStatus::LiveLoadPending
        } else if self.overload {
            PlatformStatus::Overload
        } else if self.underload {
            PlatformStatus::Underload
        } else {
            PlatformStatus::Ready
        }
    }

    /// Render the net weight for display.
    pub fn formatted_weight(&self, unit: &str) -> String {
        let value = || {
            format!(
                "{:.*} {unit}",
                self.decimal_places as usize, self.net_weight
            )
        };
        match self.status() {
            PlatformStatus::Disconnected => "Disconnected".into(),
            PlatformStatus::NotCalibrated if self.weight_has_been_set => "Not calibrated".into(),
            PlatformStatus::NotCalibrated => "Connecting".into(),
            PlatformStatus::LiveLoadPending => LIVE_LOAD_PLACEHOLDER.into(),
            PlatformStatus::Overload => format!("++{}", value()),
            PlatformStatus::Underload => format!("--{}", value()),
            PlatformStatus::Ready => value(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn apply_status(&mut self, s: StatusFlags) -> bool {
        let mut changed = false;
        changed |= set(&mut self.connected, s.connected);
        changed |= set(&mut self.calibrated, s.calibrated);
        changed |= set(&mut self.tared, s.tared);
        changed |= set(&mut self.overload, s.overload);
        changed |= set(&mut self.underload, s.underload);
        changed |= set(&mut self.stable, s.stable);
        changed |= set(&mut self.zero, s.zero);
        changed |= set(&mut self.live_load_enabled, s.live_load_enabled);
        changed |= set(&mut self.live_load_fixed, s.live_load_fixed);
        changed |= set(&mut self.charging, s.charging);
        if s.calibrated {
            self.weight_has_been_set = true;
        }
        changed
    }

    fn apply_battery(&mut self, millivolts: i16) -> bool {
        let mut changed = set(&mut self.battery_mv, millivolts);
        changed |= set(&mut self.battery_percent, battery_percent(millivolts));
        changed
    }

    /// Keep `tare` consistent with the `tared` flag and the weights.
    fn reconcile_tare(&mut self, was_tared: bool, weights_moved: bool) -> bool {
        let target = if !self.tared {
            0.0
        } else if weights_moved || !was_tared {
            self.gross_weight - self.net_weight
        } else {
            return false;
        };
        if weight_changed(self.tare, target) {
            self.tare = target;
            true
        } else {
            false
        }
    }

    fn mark_updated(&mut self) {
        self.last_update_ms = Some(now_ms());
    }
}

/// Assign and report whether the value differed.
fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
