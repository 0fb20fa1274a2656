//! Channel-backed event sink.
//!
//! Bridges the synchronous [`EventBus`](crate::app::events::EventBus)
//! fan-out to an async consumer through a bounded `embassy-sync` channel.
//! Polling workers never block on a slow consumer: when the channel is
//! full the event is dropped and counted.
//!
//! ```text
//! ┌──────────────┐  ScaleEvent  ┌──────────────┐
//! │ poll workers │────────────▶│   consumer    │
//! │  (threads)   │  try_send    │  (async)     │
//! └──────────────┘              └──────────────┘
//! ```

use core::sync::atomic::{AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::debug;

use crate::app::events::ScaleEvent;
use crate::app::ports::EventSink;

/// Channel depth for outbound events.
pub const EVENT_DEPTH: usize = 64;

pub struct ChannelEventSink {
    channel: Channel<CriticalSectionRawMutex, ScaleEvent, EVENT_DEPTH>,
    dropped: AtomicUsize,
}

impl Default for ChannelEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEventSink {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Wait for the next event.
    pub async fn receive(&self) -> ScaleEvent {
        self.channel.receive().await
    }

    pub fn try_receive(&self) -> Option<ScaleEvent> {
        self.channel.try_receive().ok()
    }

    /// Events lost to a full channel.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &ScaleEvent) {
        if self.channel.try_send(event.clone()).is_err() {
            let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("ChannelEventSink: full, {n} events dropped");
        }
    }
}
