//! GATT identifier tables.
//!
//! ## Aggregator (visor / receiver) service
//!
//! | Characteristic | UUID                                   | Perms |
//! |----------------|----------------------------------------|-------|
//! | General        | `5ca1e100-…-0c1d2e3f4a5b`              | Read  |
//! | Platform 1..12 | `5ca1e101-…` .. `5ca1e10c-…`           | Read  |
//! | Command        | `5ca1e1f0-…-0c1d2e3f4a5b`              | Write |
//!
//! ## Per-platform (scale pad) services
//!
//! One characteristic per data field, partitioned into four services:
//! Info, Config, Command and Extended.  See [`PlatformField`].

use super::fields::PlatformField;

// ───────────────────────────────────────────────────────────────
// Aggregator service
// ───────────────────────────────────────────────────────────────

pub const AGGREGATOR_SERVICE: u128 = 0x5ca1e000_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_GENERAL: u128 = 0x5ca1e100_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_AGGREGATOR_COMMAND: u128 = 0x5ca1e1f0_7d3b_4c2a_9e61_0c1d2e3f4a5b;

/// Characteristic of relayed platform `index` (1-based, 1..=12).
pub const fn platform_characteristic(index: u8) -> u128 {
    CHAR_GENERAL + ((index as u128) << 96)
}

/// Aggregator command opcodes, written as `[opcode, platform_id]`.
/// Platform id 0 addresses every platform.
pub mod opcode {
    pub const TARE: u8 = 0x01;
    pub const ZERO: u8 = 0x02;
}

/// Build the aggregator command payload.
pub fn aggregator_command(opcode: u8, platform_id: u8) -> [u8; 2] {
    [opcode, platform_id]
}

// ───────────────────────────────────────────────────────────────
// Per-platform services
// ───────────────────────────────────────────────────────────────

pub const INFO_SERVICE: u128 = 0x5ca1f000_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CONFIG_SERVICE: u128 = 0x5ca1f100_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const COMMAND_SERVICE: u128 = 0x5ca1f200_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const EXTENDED_SERVICE: u128 = 0x5ca1f300_7d3b_4c2a_9e61_0c1d2e3f4a5b;

// Info group
pub const CHAR_WEIGHT: u128 = 0x5ca1f001_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_GROSS_WEIGHT: u128 = 0x5ca1f002_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_STABLE: u128 = 0x5ca1f003_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_OVERLOAD: u128 = 0x5ca1f004_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_UNDERLOAD: u128 = 0x5ca1f005_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_TARED: u128 = 0x5ca1f006_7d3b_4c2a_9e61_0c1d2e3f4a5b;

// Config group
pub const CHAR_CALIBRATED: u128 = 0x5ca1f101_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_DECIMAL_PLACES: u128 = 0x5ca1f102_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_FIRMWARE_VERSION: u128 = 0x5ca1f103_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_NETWORK_NUMBER: u128 = 0x5ca1f104_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_PLATFORM_NUMBER: u128 = 0x5ca1f105_7d3b_4c2a_9e61_0c1d2e3f4a5b;

// Command group (write-only, payload `[0x01]`)
pub const CHAR_TARE: u128 = 0x5ca1f201_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_ZERO: u128 = 0x5ca1f202_7d3b_4c2a_9e61_0c1d2e3f4a5b;

// Extended group
pub const CHAR_BATTERY_VOLTAGE: u128 = 0x5ca1f301_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_CHARGING: u128 = 0x5ca1f302_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_LIVE_LOAD_ENABLED: u128 = 0x5ca1f303_7d3b_4c2a_9e61_0c1d2e3f4a5b;
pub const CHAR_LIVE_LOAD_FIXED: u128 = 0x5ca1f304_7d3b_4c2a_9e61_0c1d2e3f4a5b;

/// Payload written to a per-platform command characteristic.
pub const COMMAND_TRIGGER: [u8; 1] = [0x01];

/// `(service, characteristic)` pair for a per-platform field.
pub fn field_address(field: PlatformField) -> (u128, u128) {
    match field {
        PlatformField::Weight => (INFO_SERVICE, CHAR_WEIGHT),
        PlatformField::GrossWeight => (INFO_SERVICE, CHAR_GROSS_WEIGHT),
        PlatformField::Stable => (INFO_SERVICE, CHAR_STABLE),
        PlatformField::Overload => (INFO_SERVICE, CHAR_OVERLOAD),
        PlatformField::Underload => (INFO_SERVICE, CHAR_UNDERLOAD),
        PlatformField::Tared => (INFO_SERVICE, CHAR_TARED),
        PlatformField::Calibrated => (CONFIG_SERVICE, CHAR_CALIBRATED),
        PlatformField::DecimalPlaces => (CONFIG_SERVICE, CHAR_DECIMAL_PLACES),
        PlatformField::FirmwareVersion => (CONFIG_SERVICE, CHAR_FIRMWARE_VERSION),
        PlatformField::NetworkNumber => (CONFIG_SERVICE, CHAR_NETWORK_NUMBER),
        PlatformField::PlatformNumber => (CONFIG_SERVICE, CHAR_PLATFORM_NUMBER),
        PlatformField::BatteryVoltage => (EXTENDED_SERVICE, CHAR_BATTERY_VOLTAGE),
        PlatformField::Charging => (EXTENDED_SERVICE, CHAR_CHARGING),
        PlatformField::LiveLoadEnabled => (EXTENDED_SERVICE, CHAR_LIVE_LOAD_ENABLED),
        PlatformField::LiveLoadFixed => (EXTENDED_SERVICE, CHAR_LIVE_LOAD_FIXED),
    }
}

/// Reverse lookup used by transports that deliver notifications by UUID.
pub fn field_for_characteristic(characteristic: u128) -> Option<PlatformField> {
    PlatformField::ALL
        .iter()
        .copied()
        .find(|f| field_address(*f).1 == characteristic)
}
