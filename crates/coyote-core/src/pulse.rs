//! Pulse requests, validated pulses and execution receipts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::limits::{DEFAULT_AMPLITUDE, DEFAULT_COPIES, DEFAULT_FREQUENCY, FRAME_DURATION_MS};

// ============================================================================
// Channel
// ============================================================================

/// Output channel of the two-channel unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// Channel number used by the app protocol (`clear-1`, `clear-2`).
    pub fn number(self) -> u8 {
        match self {
            Self::A => 1,
            Self::B => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl FromStr for Channel {
    type Err = ValidationError;

    /// Accepts exactly `A` or `B`, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            c if c.eq_ignore_ascii_case("a") => Ok(Self::A),
            c if c.eq_ignore_ascii_case("b") => Ok(Self::B),
            _ => Err(ValidationError::InvalidChannel(s.to_string())),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Pulse Request
// ============================================================================

/// A pulse as submitted by a caller, before validation.
///
/// Fields are raw caller input and may be out of range; see
/// [`crate::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseRequest {
    pub channel: String,
    pub amplitude: i64,
    pub frequency: i64,
    pub repeat_count: i64,
}

impl PulseRequest {
    pub fn new(
        channel: impl Into<String>,
        amplitude: i64,
        frequency: i64,
        repeat_count: i64,
    ) -> Self {
        Self {
            channel: channel.into(),
            amplitude,
            frequency,
            repeat_count,
        }
    }

    /// Request on `channel` with default amplitude, frequency and copies.
    pub fn with_defaults(channel: impl Into<String>) -> Self {
        Self::new(channel, DEFAULT_AMPLITUDE, DEFAULT_FREQUENCY, DEFAULT_COPIES)
    }
}

// ============================================================================
// Effective Pulse
// ============================================================================

/// A validated pulse, ready for the execution worker.
///
/// Produced only by [`crate::validate::validate`]; every field is within
/// device range and `amplitude <= owner_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePulse {
    pub channel: Channel,
    /// Amplitude the caller asked for.
    pub amplitude_requested: u8,
    /// Amplitude actually sent, `min(requested, owner_max)`.
    pub amplitude: u8,
    /// Owner cap in force when the request was admitted.
    pub owner_max: u8,
    pub frequency: u8,
    pub repeat_count: u8,
}

impl EffectivePulse {
    /// Approximate time the device spends playing this pulse.
    pub fn approx_duration_ms(&self) -> u32 {
        u32::from(self.repeat_count) * FRAME_DURATION_MS
    }

    /// Returns true if the owner cap lowered the amplitude.
    pub fn was_capped(&self) -> bool {
        self.amplitude < self.amplitude_requested
    }

    /// Receipt handed back to the caller after a successful send.
    pub fn receipt(&self) -> PulseReceipt {
        PulseReceipt {
            channel: self.channel,
            amp_requested: self.amplitude_requested,
            amp_effective: self.amplitude,
            owner_max: self.owner_max,
            freq: self.frequency,
            copies: self.repeat_count,
            approx_duration_ms: self.approx_duration_ms(),
        }
    }
}

/// Outcome of a successfully executed pulse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseReceipt {
    pub channel: Channel,
    pub amp_requested: u8,
    pub amp_effective: u8,
    pub owner_max: u8,
    pub freq: u8,
    pub copies: u8,
    pub approx_duration_ms: u32,
}

impl fmt::Display for PulseReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pulse {}: amp={} (req {}, owner max {}) freq={} copies={} (~{}ms)",
            self.channel,
            self.amp_effective,
            self.amp_requested,
            self.owner_max,
            self.freq,
            self.copies,
            self.approx_duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        assert_eq!("A".parse::<Channel>(), Ok(Channel::A));
        assert_eq!("b".parse::<Channel>(), Ok(Channel::B));
        assert_eq!(
            "C".parse::<Channel>(),
            Err(ValidationError::InvalidChannel("C".to_string()))
        );
        assert!("AB".parse::<Channel>().is_err());
        assert!("".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_with_whitespace_rejected() {
        assert_eq!(
            " A ".parse::<Channel>(),
            Err(ValidationError::InvalidChannel(" A ".to_string()))
        );
        assert!("b\n".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_numbers() {
        assert_eq!(Channel::A.number(), 1);
        assert_eq!(Channel::B.number(), 2);
    }

    #[test]
    fn test_receipt_fields() {
        let pulse = EffectivePulse {
            channel: Channel::A,
            amplitude_requested: 80,
            amplitude: 50,
            owner_max: 50,
            frequency: 20,
            repeat_count: 5,
        };
        assert!(pulse.was_capped());

        let receipt = pulse.receipt();
        assert_eq!(receipt.amp_effective, 50);
        assert_eq!(receipt.approx_duration_ms, 500);

        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["channel"], "A");
        assert_eq!(json["amp_requested"], 80);
        assert_eq!(json["copies"], 5);
    }

    #[test]
    fn test_receipt_display() {
        let receipt = PulseReceipt {
            channel: Channel::B,
            amp_requested: 25,
            amp_effective: 25,
            owner_max: 50,
            freq: 20,
            copies: 5,
            approx_duration_ms: 500,
        };
        assert_eq!(
            receipt.to_string(),
            "Pulse B: amp=25 (req 25, owner max 50) freq=20 copies=5 (~500ms)"
        );
    }

    #[test]
    fn test_request_defaults() {
        let req = PulseRequest::with_defaults("A");
        assert_eq!(req.amplitude, 20);
        assert_eq!(req.frequency, 20);
        assert_eq!(req.repeat_count, 5);
    }
}
