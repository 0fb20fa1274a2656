//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every [`ScaleEvent`] through the
//! `log` facade.  A UI or network adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::ScaleEvent;
use crate::app::ports::EventSink;
use crate::platform::Violation;

/// Adapter that logs every [`ScaleEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&self, event: &ScaleEvent) {
        match event {
            ScaleEvent::WeightUpdated {
                device,
                platform_id,
                weight,
                stable,
                violation,
            } => {
                let flag = match violation {
                    Violation::None => "",
                    Violation::Overload => " OVERLOAD",
                    Violation::Underload => " UNDERLOAD",
                };
                info!(
                    "WEIGHT | {} | P{:02} {:>9.2} | {}{}",
                    device,
                    platform_id,
                    weight,
                    if *stable { "stable" } else { "moving" },
                    flag,
                );
            }
            ScaleEvent::ConnectionStatusChanged {
                device,
                connected: true,
                ..
            } => {
                info!("LINK  | {} | connected", device);
            }
            ScaleEvent::ConnectionStatusChanged {
                device,
                connected: false,
                error: None,
            } => {
                info!("LINK  | {} | disconnected", device);
            }
            ScaleEvent::ConnectionStatusChanged {
                device,
                connected: false,
                error: Some(reason),
            } => {
                warn!("LINK  | {} | lost: {}", device, reason);
            }
            ScaleEvent::LiveLoadFixed { device } => {
                info!("LIVE  | {} | all platforms fixed", device);
            }
            ScaleEvent::PhaseChanged { from, to } => {
                info!("PHASE | {} -> {}", from, to);
            }
        }
    }
}
