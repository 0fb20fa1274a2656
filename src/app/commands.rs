//! Inbound commands to the device manager.
//!
//! These represent actions requested by the outside world (UI, CLI,
//! automation) that the [`DeviceManager`](super::manager::DeviceManager)
//! interprets and forwards to the current device.

use core::time::Duration;

/// Commands that external adapters can send into the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleCommand {
    /// Connect the registered device with this address.
    Connect { address: String },

    /// Disconnect the current device.
    Disconnect,

    /// Tare one platform (1-based).
    Tare { platform_id: u8 },

    /// Zero one platform (1-based).
    Zero { platform_id: u8 },

    /// Tare every platform concurrently.
    TareAll,

    /// Zero every platform concurrently.
    ZeroAll,

    /// Change the polling interval of the current device.
    SetReadInterval(Duration),
}
