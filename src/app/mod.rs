//! Application core: ports, events, commands and the device manager.
//!
//! The manager owns device lifecycle and the connection phase.  All BLE
//! interaction goes through the **port traits** in [`ports`], so the whole
//! layer runs against mock transports in tests.

pub mod commands;
pub mod events;
pub mod manager;
pub mod ports;
