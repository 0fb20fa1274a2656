//! Scalelink library.
//!
//! Decodes live readings from BLE weighing scales (single-platform
//! devices and multi-platform aggregators), manages device lifecycle and
//! polling, and provides a simulated device for hosts without a radio.
//! The BLE stack itself sits behind the traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod cancel;
pub mod config;
pub mod device;
pub mod error;
pub mod phase;
pub mod platform;
pub mod protocol;
pub mod scheduler;
