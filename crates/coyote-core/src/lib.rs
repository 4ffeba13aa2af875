//! Coyote Core - Shared types for Coyote control
//!
//! This crate provides the domain types shared between the daemon
//! (coyoted) and the command-line client (coyote):
//! - `pulse` - pulse requests, validated pulses and receipts
//! - `limits` - device limits and the runtime owner cap
//! - `validate` - the parameter validator (clamp or reject)
//! - `waveform` - DG-Lab waveform frame encoding
//! - `session` - device session identifiers and views
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod limits;
pub mod pulse;
pub mod session;
pub mod validate;
pub mod waveform;

// Re-exports for convenience
pub use error::{PulseError, PulseErrorCode, ValidationError};
pub use limits::OwnerCap;
pub use pulse::{Channel, EffectivePulse, PulseReceipt, PulseRequest};
pub use session::{SessionId, SessionInfo, SessionState, StrengthReport};
pub use validate::validate;
pub use waveform::WaveformFrame;
