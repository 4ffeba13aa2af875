//! Queue entries.

use std::time::Instant;

use tokio::sync::oneshot;

use coyote_core::{EffectivePulse, PulseError, PulseReceipt};

/// One admitted pulse waiting for the execution worker.
///
/// The worker answers through `respond_to` exactly once. If the caller has
/// gone away the answer is dropped, but the pulse still runs.
#[derive(Debug)]
pub struct QueueEntry {
    /// Admission order, for logging
    pub seq: u64,

    /// Control client that submitted the pulse, if known
    pub caller: Option<String>,

    /// Validated pulse with the owner cap already applied
    pub pulse: EffectivePulse,

    /// When the entry was admitted
    pub admitted_at: Instant,

    /// Channel to send the result
    pub respond_to: oneshot::Sender<Result<PulseReceipt, PulseError>>,
}
