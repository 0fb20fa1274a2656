//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter        | Implements              | Connects to                 |
//! |----------------|-------------------------|-----------------------------|
//! | `log_sink`     | EventSink               | `log` facade                |
//! | `channel_sink` | EventSink               | bounded embassy channel     |
//! | `null`         | BleAdapter, BleTransport| nothing (no radio present)  |

pub mod channel_sink;
pub mod log_sink;
pub mod null;
