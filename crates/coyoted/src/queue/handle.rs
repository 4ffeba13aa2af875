//! Caller-side handle for the command queue.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `PulseError::QueueClosed`

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use coyote_core::{validate, OwnerCap, PulseError, PulseReceipt, PulseRequest};

use super::commands::QueueEntry;

/// Cheap-to-clone handle for submitting pulses.
///
/// # Usage
///
/// ```ignore
/// let queue = spawn_queue(registry, OwnerCap::default());
///
/// let receipt = queue.submit(PulseRequest::new("A", 30, 20, 5)).await?;
/// println!("{receipt}");
/// ```
#[derive(Clone)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<QueueEntry>,
    owner_cap: OwnerCap,
    pending: Arc<AtomicUsize>,
    next_seq: Arc<AtomicU64>,
}

impl CommandQueue {
    pub(super) fn new(
        sender: mpsc::UnboundedSender<QueueEntry>,
        owner_cap: OwnerCap,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            sender,
            owner_cap,
            pending,
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Validates a request, queues it and waits for it to execute.
    ///
    /// Admission happens before the first suspension point, so a call that
    /// started earlier is always executed earlier. Dropping the returned
    /// future after admission does not remove the entry.
    ///
    /// # Errors
    ///
    /// - `PulseError::InvalidParameters` if validation fails (never queued)
    /// - `PulseError::DeviceNotBound` if no device is paired at execution
    /// - `PulseError::TransportError` if the device write fails
    /// - `PulseError::QueueClosed` if the worker has stopped
    pub async fn submit(&self, request: PulseRequest) -> Result<PulseReceipt, PulseError> {
        self.submit_as(None, request).await
    }

    /// Like [`Self::submit`], recording `caller` in the pulse event that is
    /// published once the entry has executed.
    pub async fn submit_as(
        &self,
        caller: Option<String>,
        request: PulseRequest,
    ) -> Result<PulseReceipt, PulseError> {
        let pulse = validate(&request, self.owner_cap.get())?;

        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = QueueEntry {
            seq,
            caller,
            pulse,
            admitted_at: Instant::now(),
            respond_to: tx,
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(entry).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(PulseError::QueueClosed);
        }

        debug!(
            seq,
            channel = %pulse.channel,
            amp = pulse.amplitude,
            capped = pulse.was_capped(),
            "Pulse admitted"
        );

        rx.await.map_err(|_| PulseError::QueueClosed)?
    }

    /// Entries admitted but not yet executed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// The owner cap read at admission.
    pub fn owner_cap(&self) -> &OwnerCap {
        &self.owner_cap
    }

    /// Returns true while the worker is accepting entries.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
