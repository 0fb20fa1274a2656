//! Connection phase machine for the device manager.
//!
//! ```text
//!  Disconnected ──▶ Connecting ──▶ ReadingInitialData ──▶ Connected
//!       ▲               │                  │                  │
//!       └───────────────┴──────────────────┴──────────────────┘
//! ```
//!
//! Forward moves follow the chain one step at a time.  Any phase may drop
//! to `Disconnected`.  Every accepted transition is logged and published
//! as [`ScaleEvent::PhaseChanged`].

use core::sync::atomic::{AtomicU8, Ordering};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::{EventBus, ScaleEvent};

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionPhase {
    Disconnected = 0,
    Connecting = 1,
    ReadingInitialData = 2,
    Connected = 3,
}

impl ConnectionPhase {
    pub const COUNT: usize = 4;

    /// Convert a `u8` back to a phase; out-of-range maps to `Disconnected`.
    pub fn from_index(idx: u8) -> Self {
        match idx {
            1 => Self::Connecting,
            2 => Self::ReadingInitialData,
            3 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::ReadingInitialData => "ReadingInitialData",
            Self::Connected => "Connected",
        }
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Disconnected)
                | (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::ReadingInitialData)
                | (Self::ReadingInitialData, Self::Connected)
        )
    }
}

impl core::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// Shared phase cell.  Readers never block.
#[derive(Debug)]
pub struct PhaseMachine {
    current: AtomicU8,
    bus: EventBus,
}

impl PhaseMachine {
    pub fn new(bus: EventBus) -> Self {
        Self {
            current: AtomicU8::new(ConnectionPhase::Disconnected as u8),
            bus,
        }
    }

    pub fn current(&self) -> ConnectionPhase {
        ConnectionPhase::from_index(self.current.load(Ordering::Acquire))
    }

    /// Move to `next`.  Returns `false` for illegal moves and for moves to
    /// the phase already held.
    pub fn transition(&self, next: ConnectionPhase) -> bool {
        let mut from = self.current();
        loop {
            if from == next {
                return false;
            }
            if !from.can_transition_to(next) {
                warn!("Phase transition rejected: {from} -> {next}");
                return false;
            }
            match self.current.compare_exchange(
                from as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => from = ConnectionPhase::from_index(actual),
            }
        }

        info!("Phase transition: {from} -> {next}");
        self.bus.emit(ScaleEvent::PhaseChanged { from, to: next });
        true
    }

    /// Drop to `Disconnected` from wherever we are.
    pub fn reset(&self) -> bool {
        self.transition(ConnectionPhase::Disconnected)
    }
}
