//! Unified error types for the scale stack.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! device boundary and the poll loop's error handling uniform.  Transport
//! and protocol failures never escape a device: they are converted into a
//! `bool`, a status string, or a [`ScaleEvent`](crate::app::events::ScaleEvent)
//! at the call site.  Validation errors are the only ones surfaced to
//! callers of the public API.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connect, read or write against the BLE transport failed.
    Transport(TransportError),
    /// A frame was short or malformed.
    Protocol(ProtocolError),
    /// An argument was rejected at the public API boundary.
    Validation(ValidationError),
    /// The polling worker thread could not be spawned.
    Worker(String),
}

impl Error {
    /// Timeouts are a transport-level failure, whether the transport
    /// reported them or a local bound expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Worker(msg) => write!(f, "worker: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// GATT connect failed.
    Connect(String),
    /// Characteristic read failed.
    Read(String),
    /// Characteristic write was not acknowledged.
    Write(String),
    /// Operation attempted without an open connection.
    NotConnected,
    /// The operation exceeded its time bound.
    Timeout,
    /// The caller's cancel token fired mid-operation.
    Cancelled,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connect failed: {msg}"),
            Self::Read(msg) => write!(f, "read failed: {msg}"),
            Self::Write(msg) => write!(f, "write failed: {msg}"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Timeout => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame shorter than the layout requires.
    ShortFrame { expected: usize, actual: usize },
    /// A weight field decoded to NaN or infinity.
    NonFiniteWeight,
    /// Decimal places outside 0–4.
    DecimalPlaces(u8),
    /// Overload and underload asserted together.
    ConflictingViolation,
    /// Platform count above the 12-platform maximum.
    PlatformCount(u8),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortFrame { expected, actual } => {
                write!(f, "short frame ({actual} bytes, need {expected})")
            }
            Self::NonFiniteWeight => write!(f, "non-finite weight"),
            Self::DecimalPlaces(dp) => write!(f, "decimal places {dp} out of range"),
            Self::ConflictingViolation => write!(f, "overload and underload both set"),
            Self::PlatformCount(n) => write!(f, "platform count {n} out of range"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Invalid arguments are rejected, never silently clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Read or simulation interval below the 100 ms floor.
    IntervalTooShort { requested_ms: u64, min_ms: u64 },
    /// Platform count outside 1–12.
    PlatformCount(u8),
    /// A configuration field failed range validation.
    /// The `&'static str` names the field.
    Config(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntervalTooShort {
                requested_ms,
                min_ms,
            } => write!(f, "interval {requested_ms}ms below minimum {min_ms}ms"),
            Self::PlatformCount(n) => write!(f, "platform count {n} outside 1-12"),
            Self::Config(field) => write!(f, "invalid config field: {field}"),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
