//! Domain error types following panic-free policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while validating caller-supplied pulse parameters.
///
/// Only malformed channel and amplitude values are rejected; frequency and
/// repeat count are clamped instead (see [`crate::validate`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Channel is not `A` or `B`.
    #[error("channel must be A or B (got {0:?})")]
    InvalidChannel(String),

    /// Amplitude outside `0..=100`.
    #[error("amp must be 0..100 (got {0})")]
    InvalidAmplitude(i64),

    /// Owner cap outside `0..=100`.
    #[error("owner max power must be 0..100 (got {0})")]
    InvalidOwnerMax(i64),

    /// An encoded pulse message would exceed what the app accepts.
    #[error("pulse message too long: {len} characters (max: {max})")]
    PulseTooLong { len: usize, max: usize },
}

/// Errors surfaced to callers of the command queue.
///
/// Every admitted entry resolves to success, `DeviceNotBound` or
/// `TransportError`. `InvalidParameters` never reaches the queue and
/// `QueueClosed` only happens while the daemon shuts down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PulseError {
    /// Malformed input, rejected at admission.
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ValidationError),

    /// No device is paired, or the paired device went away.
    #[error("device/app not bound yet (scan the pairing QR in the DG-Lab app)")]
    DeviceNotBound,

    /// Writing to the device failed; the session has been closed.
    #[error("device transport error: {0}")]
    TransportError(String),

    /// The execution worker is no longer running.
    #[error("command queue closed")]
    QueueClosed,
}

impl PulseError {
    /// Creates a transport error from any displayable error.
    pub fn transport<E: fmt::Display>(err: E) -> Self {
        Self::TransportError(err.to_string())
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> PulseErrorCode {
        match self {
            Self::InvalidParameters(_) => PulseErrorCode::InvalidParameters,
            Self::DeviceNotBound => PulseErrorCode::DeviceNotBound,
            Self::TransportError(_) => PulseErrorCode::TransportError,
            Self::QueueClosed => PulseErrorCode::QueueClosed,
        }
    }

    /// Returns true if the caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceNotBound | Self::TransportError(_))
    }
}

/// Wire-level error codes, mapped to transport-specific codes by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseErrorCode {
    InvalidParameters,
    DeviceNotBound,
    TransportError,
    QueueClosed,
}

impl fmt::Display for PulseErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidParameters => "invalid_parameters",
            Self::DeviceNotBound => "device_not_bound",
            Self::TransportError => "transport_error",
            Self::QueueClosed => "queue_closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_becomes_invalid_parameters() {
        let err: PulseError = ValidationError::InvalidChannel("C".to_string()).into();
        assert_eq!(err.code(), PulseErrorCode::InvalidParameters);
        assert!(err.to_string().contains("\"C\""));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_codes_serialize_snake_case() {
        let json = serde_json::to_string(&PulseErrorCode::DeviceNotBound).unwrap();
        assert_eq!(json, "\"device_not_bound\"");
        assert_eq!(PulseErrorCode::TransportError.to_string(), "transport_error");
    }

    #[test]
    fn test_retryable() {
        assert!(PulseError::DeviceNotBound.is_retryable());
        assert!(PulseError::transport("broken pipe").is_retryable());
        assert!(!PulseError::QueueClosed.is_retryable());
    }
}
