//! Aggregator frame codec.
//!
//! Wire format (all multi-byte fields little-endian):
//! ```text
//! ┌──────────┬──────────┬──────┬──────┬────────┬────────┬───────────┐
//! │ Net (4B) │Gross (4B)│ B8   │ DP   │Status A│Status B│ Batt (2B) │
//! │ f32      │ f32      │ u8   │ u8   │ u8     │ u8     │ i16 mV    │
//! └──────────┴──────────┴──────┴──────┴────────┴────────┴───────────┘
//!   0..4       4..8       8      9      10       11       12..14
//! ```
//!
//! Byte 8 is the platform count on the general record and the connection
//! type on a platform record.  Trailing bytes past 14 are ignored.

use crate::config::MAX_PLATFORMS;
use crate::error::ProtocolError;

/// Minimum length of an aggregator frame.
pub const FRAME_LEN: usize = 14;

/// Highest decimal-place count a platform may report.
pub const MAX_DECIMAL_PLACES: u8 = 4;

/// Status byte A bit positions.
pub mod status_a {
    pub const CONNECTED: u8 = 1 << 0;
    pub const CALIBRATED: u8 = 1 << 1;
    pub const TARED: u8 = 1 << 2;
    pub const OVERLOAD: u8 = 1 << 3;
    pub const UNDERLOAD: u8 = 1 << 4;
    pub const STABLE: u8 = 1 << 5;
    pub const ZERO: u8 = 1 << 6;
    pub const LIVE_LOAD_ENABLED: u8 = 1 << 7;
}

/// Status byte B bit positions.
pub mod status_b {
    pub const LIVE_LOAD_FIXED: u8 = 1 << 0;
    pub const CHARGING: u8 = 1 << 1;
}

/// Which record a frame is addressed to; decides how byte 8 is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRole {
    /// Device-level totals; byte 8 is the platform count.
    General,
    /// One relayed platform; byte 8 is the connection type.
    Platform,
}

/// Decoded status flags shared by both status bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub connected: bool,
    pub calibrated: bool,
    pub tared: bool,
    pub overload: bool,
    pub underload: bool,
    pub stable: bool,
    pub zero: bool,
    pub live_load_enabled: bool,
    pub live_load_fixed: bool,
    pub charging: bool,
}

impl StatusFlags {
    pub fn from_bytes(a: u8, b: u8) -> Self {
        Self {
            connected: a & status_a::CONNECTED != 0,
            calibrated: a & status_a::CALIBRATED != 0,
            tared: a & status_a::TARED != 0,
            overload: a & status_a::OVERLOAD != 0,
            underload: a & status_a::UNDERLOAD != 0,
            stable: a & status_a::STABLE != 0,
            zero: a & status_a::ZERO != 0,
            live_load_enabled: a & status_a::LIVE_LOAD_ENABLED != 0,
            live_load_fixed: b & status_b::LIVE_LOAD_FIXED != 0,
            charging: b & status_b::CHARGING != 0,
        }
    }

    pub fn to_bytes(self) -> (u8, u8) {
        fn bit(on: bool, mask: u8) -> u8 {
            if on { mask } else { 0 }
        }
        let a = bit(self.connected, status_a::CONNECTED)
            | bit(self.calibrated, status_a::CALIBRATED)
            | bit(self.tared, status_a::TARED)
            | bit(self.overload, status_a::OVERLOAD)
            | bit(self.underload, status_a::UNDERLOAD)
            | bit(self.stable, status_a::STABLE)
            | bit(self.zero, status_a::ZERO)
            | bit(self.live_load_enabled, status_a::LIVE_LOAD_ENABLED);
        let b = bit(self.live_load_fixed, status_b::LIVE_LOAD_FIXED)
            | bit(self.charging, status_b::CHARGING);
        (a, b)
    }
}

/// One decoded aggregator frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorFrame {
    pub net_weight: f32,
    pub gross_weight: f32,
    /// Platform count (general) or connection type (platform).
    pub byte8: u8,
    pub decimal_places: u8,
    pub status: StatusFlags,
    pub battery_mv: i16,
}

impl AggregatorFrame {
    /// Parse and validate a raw frame.
    ///
    /// Malformed input is reported as a [`ProtocolError`]; callers at the
    /// decoder boundary turn that into "no change".
    pub fn parse(bytes: &[u8], role: RecordRole) -> Result<Self, ProtocolError> {
        if bytes.len() < FRAME_LEN {
            return Err(ProtocolError::ShortFrame {
                expected: FRAME_LEN,
                actual: bytes.len(),
            });
        }

        let net_weight = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let gross_weight = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if !net_weight.is_finite() || !gross_weight.is_finite() {
            return Err(ProtocolError::NonFiniteWeight);
        }

        let byte8 = bytes[8];
        if role == RecordRole::General && byte8 as usize > MAX_PLATFORMS {
            return Err(ProtocolError::PlatformCount(byte8));
        }

        let decimal_places = bytes[9];
        if decimal_places > MAX_DECIMAL_PLACES {
            return Err(ProtocolError::DecimalPlaces(decimal_places));
        }

        let status = StatusFlags::from_bytes(bytes[10], bytes[11]);
        if status.overload && status.underload {
            return Err(ProtocolError::ConflictingViolation);
        }

        Ok(Self {
            net_weight,
            gross_weight,
            byte8,
            decimal_places,
            status,
            battery_mv: i16::from_le_bytes([bytes[12], bytes[13]]),
        })
    }

    /// Encode into the 14-byte wire layout.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[0..4].copy_from_slice(&self.net_weight.to_le_bytes());
        out[4..8].copy_from_slice(&self.gross_weight.to_le_bytes());
        out[8] = self.byte8;
        out[9] = self.decimal_places;
        let (a, b) = self.status.to_bytes();
        out[10] = a;
        out[11] = b;
        out[12..14].copy_from_slice(&self.battery_mv.to_le_bytes());
        out
    }
}
