//! Outbound scale events and the fan-out bus.
//!
//! Devices and the [`DeviceManager`](super::manager::DeviceManager) emit
//! these through an [`EventBus`], which forwards each event to every
//! subscribed [`EventSink`](super::ports::EventSink).

use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::phase::ConnectionPhase;
use crate::platform::Violation;

use super::ports::EventSink;

/// Structured events emitted by devices and the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ScaleEvent {
    /// A platform's observable state changed.
    WeightUpdated {
        device: String,
        platform_id: u8,
        weight: f32,
        stable: bool,
        violation: Violation,
    },

    /// A device connected, disconnected, or failed to connect.
    ConnectionStatusChanged {
        device: String,
        connected: bool,
        error: Option<String>,
    },

    /// Every platform fixed its live-load capture.
    LiveLoadFixed { device: String },

    /// The manager's connection phase moved.
    PhaseChanged {
        from: ConnectionPhase,
        to: ConnectionPhase,
    },
}

impl ScaleEvent {
    /// Address of the device the event concerns, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            Self::WeightUpdated { device, .. }
            | Self::ConnectionStatusChanged { device, .. }
            | Self::LiveLoadFixed { device } => Some(device),
            Self::PhaseChanged { .. } => None,
        }
    }
}

/// Clonable fan-out of events to every subscribed sink.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(sink),
            Err(_) => log::warn!("EventBus: sink list poisoned, subscription dropped"),
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.read().map_or(0, |s| s.len())
    }

    /// Deliver `event` to every sink.  Sinks may emit from inside `emit`.
    pub fn emit(&self, event: ScaleEvent) {
        let sinks: Vec<Arc<dyn EventSink>> = match self.sinks.read() {
            Ok(s) => s.clone(),
            Err(_) => return,
        };
        for sink in sinks {
            sink.emit(&event);
        }
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sink_count())
            .finish()
    }
}
