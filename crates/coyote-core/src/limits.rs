//! Device limits and the operator-configured owner cap.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::error::ValidationError;

// ============================================================================
// Parameter Ranges
// ============================================================================

/// Highest amplitude a caller may request (percent).
pub const AMPLITUDE_MAX: u8 = 100;

/// Frequency range accepted by the waveform protocol (Hz).
pub const FREQUENCY_MIN: u8 = 0;
pub const FREQUENCY_MAX: u8 = 200;

/// Repeat count range. Each copy is one 100 ms frame.
pub const COPIES_MIN: u8 = 1;
pub const COPIES_MAX: u8 = 100;

/// Wall-clock duration of one waveform frame.
pub const FRAME_DURATION_MS: u32 = 100;

/// Defaults applied when a caller omits a field.
pub const DEFAULT_AMPLITUDE: i64 = 20;
pub const DEFAULT_FREQUENCY: i64 = 20;
pub const DEFAULT_COPIES: i64 = 5;

/// Owner cap used when nothing is configured.
pub const DEFAULT_OWNER_MAX: u8 = 50;

// ============================================================================
// Owner Cap
// ============================================================================

/// Upper bound on effective amplitude, shared across the process.
///
/// Cheap to clone; every clone observes the same value. The cap can be
/// changed at runtime without restarting the command queue, and is read
/// once per admitted request.
#[derive(Debug, Clone)]
pub struct OwnerCap(Arc<AtomicU8>);

impl OwnerCap {
    /// Creates a cap, rejecting values above [`AMPLITUDE_MAX`].
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        let value = check_owner_max(value)?;
        Ok(Self(Arc::new(AtomicU8::new(value))))
    }

    /// Current cap.
    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// Replaces the cap and returns the new value.
    pub fn set(&self, value: i64) -> Result<u8, ValidationError> {
        let value = check_owner_max(value)?;
        let previous = self.0.swap(value, Ordering::AcqRel);
        if previous != value {
            info!(previous, current = value, "Owner max power changed");
        }
        Ok(value)
    }
}

impl Default for OwnerCap {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(DEFAULT_OWNER_MAX)))
    }
}

fn check_owner_max(value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= AMPLITUDE_MAX)
        .ok_or(ValidationError::InvalidOwnerMax(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cap_is_fifty() {
        assert_eq!(OwnerCap::default().get(), 50);
    }

    #[test]
    fn test_clones_share_value() {
        let cap = OwnerCap::new(30).unwrap();
        let other = cap.clone();
        assert_eq!(other.set(75), Ok(75));
        assert_eq!(cap.get(), 75);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert_eq!(
            OwnerCap::new(101).unwrap_err(),
            ValidationError::InvalidOwnerMax(101)
        );
        let cap = OwnerCap::default();
        assert!(cap.set(-1).is_err());
        assert_eq!(cap.get(), DEFAULT_OWNER_MAX);
    }

    #[test]
    fn test_bounds_accepted() {
        assert_eq!(OwnerCap::new(0).unwrap().get(), 0);
        assert_eq!(OwnerCap::new(100).unwrap().get(), 100);
    }
}
