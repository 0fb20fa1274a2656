//! Per-characteristic scalar decoding for per-platform devices.
//!
//! Each characteristic carries exactly one scalar.  Booleans are a single
//! byte (non-zero = true).  Weights depend on firmware: `f32` LE above
//! version 50, signed 32-bit integer grams LE at or below.

use crate::error::ProtocolError;
use crate::protocol::frame::MAX_DECIMAL_PLACES;

/// Firmware versions above this value report weights as IEEE-754 floats.
pub const FLOAT_WEIGHT_FIRMWARE: u16 = 50;

/// Data fields exposed by a per-platform device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformField {
    Weight,
    GrossWeight,
    Calibrated,
    Overload,
    Underload,
    DecimalPlaces,
    FirmwareVersion,
    Tared,
    Stable,
    NetworkNumber,
    PlatformNumber,
    BatteryVoltage,
    Charging,
    LiveLoadEnabled,
    LiveLoadFixed,
}

impl PlatformField {
    /// Poll order.  Firmware comes first so weight decoding in the same
    /// cycle already knows the encoding.
    pub const ALL: [Self; 15] = [
        Self::FirmwareVersion,
        Self::DecimalPlaces,
        Self::Calibrated,
        Self::NetworkNumber,
        Self::PlatformNumber,
        Self::Weight,
        Self::GrossWeight,
        Self::Tared,
        Self::Stable,
        Self::Overload,
        Self::Underload,
        Self::BatteryVoltage,
        Self::Charging,
        Self::LiveLoadEnabled,
        Self::LiveLoadFixed,
    ];
}

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Weight(f32),
    Flag(bool),
    Count(u8),
    Firmware(u16),
    Millivolts(i16),
}

/// Decode one characteristic payload.
pub fn decode_field(
    field: PlatformField,
    bytes: &[u8],
    firmware: u16,
) -> Result<FieldValue, ProtocolError> {
    match field {
        PlatformField::Weight | PlatformField::GrossWeight => {
            decode_weight(bytes, firmware).map(FieldValue::Weight)
        }
        PlatformField::Calibrated
        | PlatformField::Overload
        | PlatformField::Underload
        | PlatformField::Tared
        | PlatformField::Stable
        | PlatformField::Charging
        | PlatformField::LiveLoadEnabled
        | PlatformField::LiveLoadFixed => Ok(FieldValue::Flag(first_byte(bytes)? != 0)),
        PlatformField::DecimalPlaces => {
            let dp = first_byte(bytes)?;
            if dp > MAX_DECIMAL_PLACES {
                return Err(ProtocolError::DecimalPlaces(dp));
            }
            Ok(FieldValue::Count(dp))
        }
        PlatformField::NetworkNumber | PlatformField::PlatformNumber => {
            Ok(FieldValue::Count(first_byte(bytes)?))
        }
        PlatformField::FirmwareVersion => match bytes {
            [] => Err(short(1, 0)),
            [v] => Ok(FieldValue::Firmware(*v as u16)),
            [lo, hi, ..] => Ok(FieldValue::Firmware(u16::from_le_bytes([*lo, *hi]))),
        },
        PlatformField::BatteryVoltage => {
            let [lo, hi, ..] = bytes else {
                return Err(short(2, bytes.len()));
            };
            Ok(FieldValue::Millivolts(i16::from_le_bytes([*lo, *hi])))
        }
    }
}

/// Decode a weight according to the firmware's encoding.
pub fn decode_weight(bytes: &[u8], firmware: u16) -> Result<f32, ProtocolError> {
    let [b0, b1, b2, b3, ..] = bytes else {
        return Err(short(4, bytes.len()));
    };
    let raw = [*b0, *b1, *b2, *b3];
    if firmware > FLOAT_WEIGHT_FIRMWARE {
        let w = f32::from_le_bytes(raw);
        if !w.is_finite() {
            return Err(ProtocolError::NonFiniteWeight);
        }
        Ok(w)
    } else {
        Ok(i32::from_le_bytes(raw) as f32 / 1000.0)
    }
}

/// Encode a weight the way a device on `firmware` would send it.
pub fn encode_weight(weight: f32, firmware: u16) -> [u8; 4] {
    if firmware > FLOAT_WEIGHT_FIRMWARE {
        weight.to_le_bytes()
    } else {
        ((weight * 1000.0).round() as i32).to_le_bytes()
    }
}

fn first_byte(bytes: &[u8]) -> Result<u8, ProtocolError> {
    bytes.first().copied().ok_or(short(1, 0))
}

fn short(expected: usize, actual: usize) -> ProtocolError {
    ProtocolError::ShortFrame { expected, actual }
}
