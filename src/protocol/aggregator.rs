//! Aggregator decoder.
//!
//! An aggregator (visor / receiver) exposes one general characteristic
//! carrying device totals plus up to 12 relayed platform characteristics,
//! all in the 14-byte [`frame`](super::frame) layout.
//!
//! ```text
//!   general ──► AggregatorState.general ──► platform_count
//!                                               │ resize (copy + swap)
//!                                               ▼
//!   platform[i] ─────────────────────► AggregatorState.platforms[i-1]
//! ```
//!
//! Platform frames are ignored until a general frame has established the
//! platform count.  Resizing builds a fresh table and replaces the old
//! one in a single assignment; devices hold the whole state behind an
//! `Arc` so concurrent readers only ever see complete snapshots.

use core::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::config::MAX_PLATFORMS;
use crate::platform::PlatformState;
use crate::protocol::frame::{AggregatorFrame, RecordRole};

/// Fixed-capacity platform table.
pub type PlatformTable = heapless::Vec<PlatformState, MAX_PLATFORMS>;

/// Result of applying a general frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneralOutcome {
    pub changed: bool,
    pub resized: bool,
}

/// Decoded state of one aggregator device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatorState {
    /// Device-level totals (id 0).
    pub general: PlatformState,
    pub platforms: PlatformTable,
    /// Set once any general frame has been accepted.
    general_seen: bool,
}

impl Default for AggregatorState {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatorState {
    pub fn new() -> Self {
        Self {
            general: PlatformState::general(),
            platforms: PlatformTable::new(),
            general_seen: false,
        }
    }

    /// Table pre-sized from the advertised name.  Platform frames are still
    /// refused until the first general frame arrives.
    pub fn presized(count: u8) -> Self {
        let mut state = Self::new();
        state.platforms = resized_table(&state.platforms, count);
        state
    }

    /// State for a device without a general characteristic (per-platform
    /// devices).  The table is usable immediately.
    pub fn with_platforms(count: u8) -> Self {
        let mut state = Self::presized(count);
        state.general.platform_count = state.platforms.len() as u8;
        state.general_seen = true;
        state
    }

    pub fn general_seen(&self) -> bool {
        self.general_seen
    }

    pub fn platform_count(&self) -> u8 {
        self.platforms.len() as u8
    }

    pub fn platform(&self, id: u8) -> Option<&PlatformState> {
        self.platforms.iter().find(|p| p.id == id)
    }

    pub fn platform_mut(&mut self, id: u8) -> Option<&mut PlatformState> {
        self.platforms.iter_mut().find(|p| p.id == id)
    }

    /// Apply a frame from the general characteristic.
    ///
    /// A platform count different from the current table size replaces
    /// the table, keeping existing entries by index.
    pub fn apply_general(&mut self, bytes: &[u8]) -> GeneralOutcome {
        let frame = match AggregatorFrame::parse(bytes, RecordRole::General) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("Aggregator: general frame rejected ({e})");
                return GeneralOutcome::default();
            }
        };

        let mut outcome = GeneralOutcome {
            changed: self.general.apply_frame(&frame, RecordRole::General),
            resized: false,
        };
        self.general_seen = true;

        if frame.byte8 as usize != self.platforms.len() {
            log::info!(
                "Aggregator: platform count {} -> {}",
                self.platforms.len(),
                frame.byte8
            );
            self.platforms = resized_table(&self.platforms, frame.byte8);
            outcome.resized = true;
            outcome.changed = true;
        }
        outcome
    }

    /// Apply a frame from platform characteristic `id` (1-based).
    ///
    /// Returns `false` before the first general frame, for ids outside
    /// the current table, and for malformed frames.
    pub fn apply_platform(&mut self, id: u8, bytes: &[u8]) -> bool {
        if !self.general_seen {
            return false;
        }
        match self.platform_mut(id) {
            Some(p) => p.apply_aggregator_frame(bytes, RecordRole::Platform),
            None => false,
        }
    }

    /// True when every platform reports a fixed live-load capture.
    pub fn all_live_load_fixed(&self) -> bool {
        self.platforms.iter().all(|p| p.live_load_fixed)
    }

    /// Sum of net weights over calibrated, connected platforms.
    pub fn total_weight(&self) -> f32 {
        self.platforms
            .iter()
            .filter(|p| p.connected && p.calibrated)
            .map(|p| p.net_weight)
            .sum()
    }

    pub fn mark_disconnected(&mut self) {
        self.general.mark_disconnected();
        for p in self.platforms.iter_mut() {
            p.mark_disconnected();
        }
    }
}

/// Copy `current` into a table of `count` entries.  Surviving entries keep
/// their state; new slots get ids `index + 1`.
fn resized_table(current: &PlatformTable, count: u8) -> PlatformTable {
    let count = (count as usize).min(MAX_PLATFORMS);
    let mut table = PlatformTable::new();
    for index in 0..count {
        let entry = current
            .get(index)
            .cloned()
            .unwrap_or_else(|| PlatformState::new(index as u8 + 1));
        // Capacity is MAX_PLATFORMS and count is clamped to it.
        let _ = table.push(entry);
    }
    table
}

// ───────────────────────────────────────────────────────────────
// Live-load fixation
// ───────────────────────────────────────────────────────────────

/// Tracks whether an unfixed live-load reading has been seen since the
/// last reset, and reports the single moment every platform becomes fixed.
#[derive(Debug, Default)]
pub struct LiveLoadTracker {
    armed: AtomicBool,
}

impl LiveLoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Call after a general frame was read.  Only platforms that have
    /// reported at least once can arm; fresh slots default to unfixed.
    pub fn observe_general(&self, state: &AggregatorState) {
        let unfixed = state
            .platforms
            .iter()
            .any(|p| p.last_update_ms.is_some() && !p.live_load_fixed);
        if unfixed {
            self.armed.store(true, Ordering::Release);
        }
    }

    /// Call after the platform frames of a cycle were applied.  Returns
    /// `true` exactly once per armed period, when all platforms are fixed.
    pub fn observe_platforms(&self, state: &AggregatorState) -> bool {
        if state.platforms.is_empty() || !state.all_live_load_fixed() {
            return false;
        }
        self.armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn reset(&self) {
        self.armed.store(false, Ordering::Release);
    }
}
