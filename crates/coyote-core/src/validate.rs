//! Parameter validation for pulse requests.
//!
//! The rules are asymmetric:
//! - channel and amplitude are rejected when malformed
//! - frequency and repeat count are clamped to the nearest bound, matching
//!   the tolerance of the device protocol
//! - amplitude is silently lowered to the owner cap
//!
//! Everything here is pure: no I/O, no shared state. The owner cap is
//! passed in by the caller.

use crate::error::ValidationError;
use crate::limits::{AMPLITUDE_MAX, COPIES_MAX, COPIES_MIN, FREQUENCY_MAX, FREQUENCY_MIN};
use crate::pulse::{Channel, EffectivePulse, PulseRequest};

/// Validates `req` against device limits and `owner_max`.
///
/// # Errors
///
/// - `ValidationError::InvalidChannel` if the channel is not `A` or `B`
/// - `ValidationError::InvalidAmplitude` if amplitude is outside `0..=100`
pub fn validate(req: &PulseRequest, owner_max: u8) -> Result<EffectivePulse, ValidationError> {
    let channel: Channel = req.channel.parse()?;

    let amplitude_requested = u8::try_from(req.amplitude)
        .ok()
        .filter(|amp| *amp <= AMPLITUDE_MAX)
        .ok_or(ValidationError::InvalidAmplitude(req.amplitude))?;

    let owner_max = owner_max.min(AMPLITUDE_MAX);

    Ok(EffectivePulse {
        channel,
        amplitude_requested,
        amplitude: amplitude_requested.min(owner_max),
        owner_max,
        frequency: clamp_to_u8(req.frequency, FREQUENCY_MIN, FREQUENCY_MAX),
        repeat_count: clamp_to_u8(req.repeat_count, COPIES_MIN, COPIES_MAX),
    })
}

/// Clamps `value` into `lo..=hi`.
pub fn clamp(value: i64, lo: i64, hi: i64) -> i64 {
    value.max(lo).min(hi)
}

fn clamp_to_u8(value: i64, lo: u8, hi: u8) -> u8 {
    let clamped = clamp(value, i64::from(lo), i64::from(hi));
    // In range after clamping; fall back to the upper bound regardless.
    u8::try_from(clamped).unwrap_or(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(channel: &str, amp: i64, freq: i64, copies: i64) -> PulseRequest {
        PulseRequest::new(channel, amp, freq, copies)
    }

    #[test]
    fn test_owner_cap_applied() {
        let pulse = validate(&req("A", 80, 20, 5), 50).unwrap();
        assert_eq!(pulse.amplitude, 50);
        assert_eq!(pulse.amplitude_requested, 80);
        assert_eq!(pulse.owner_max, 50);
        assert_eq!(pulse.approx_duration_ms(), 500);
    }

    #[test]
    fn test_effective_amplitude_is_min_for_all_inputs() {
        for owner_max in [0u8, 1, 37, 50, 99, 100] {
            for amp in 0..=100i64 {
                let pulse = validate(&req("B", amp, 20, 5), owner_max).unwrap();
                assert_eq!(i64::from(pulse.amplitude), amp.min(i64::from(owner_max)));
            }
        }
    }

    #[test]
    fn test_invalid_channel_rejected() {
        assert_eq!(
            validate(&req("C", 20, 20, 5), 50),
            Err(ValidationError::InvalidChannel("C".to_string()))
        );
        assert!(validate(&req("", 20, 20, 5), 50).is_err());
    }

    #[test]
    fn test_lowercase_channel_accepted() {
        let pulse = validate(&req("b", 20, 20, 5), 50).unwrap();
        assert_eq!(pulse.channel, Channel::B);
    }

    #[test]
    fn test_amplitude_out_of_range_rejected() {
        assert_eq!(
            validate(&req("A", 101, 20, 5), 50),
            Err(ValidationError::InvalidAmplitude(101))
        );
        assert_eq!(
            validate(&req("A", -1, 20, 5), 50),
            Err(ValidationError::InvalidAmplitude(-1))
        );
        assert!(validate(&req("A", i64::MAX, 20, 5), 50).is_err());
    }

    #[test]
    fn test_frequency_clamped() {
        assert_eq!(validate(&req("A", 20, 250, 5), 50).unwrap().frequency, 200);
        assert_eq!(validate(&req("A", 20, -5, 5), 50).unwrap().frequency, 0);
        assert_eq!(validate(&req("A", 20, 120, 5), 50).unwrap().frequency, 120);
    }

    #[test]
    fn test_copies_clamped() {
        assert_eq!(validate(&req("A", 20, 20, 0), 50).unwrap().repeat_count, 1);
        assert_eq!(validate(&req("A", 20, 20, 500), 50).unwrap().repeat_count, 100);
        assert_eq!(validate(&req("A", 20, 20, i64::MIN), 50).unwrap().repeat_count, 1);
    }

    #[test]
    fn test_owner_max_above_device_range_is_bounded() {
        let pulse = validate(&req("A", 100, 20, 5), 255).unwrap();
        assert_eq!(pulse.owner_max, 100);
        assert_eq!(pulse.amplitude, 100);
    }

    #[test]
    fn test_deterministic() {
        let r = req("A", 42, 300, 0);
        assert_eq!(validate(&r, 30), validate(&r, 30));
    }
}
