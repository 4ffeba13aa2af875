//! Execution worker - drains the queue one pulse at a time.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller may have gone away)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use coyote_core::{EffectivePulse, PulseError, PulseReceipt};

use super::commands::QueueEntry;
use crate::session::{CloseReason, SessionEvent, SessionRegistry};

/// The single consumer of the command queue.
///
/// Entries are executed strictly in admission order. The worker never
/// stops because one entry failed; it only exits when every
/// [`super::CommandQueue`] handle has been dropped.
///
/// Each executed entry is published as a [`SessionEvent::Pulse`], whether it
/// succeeded or not.
pub struct QueueWorker {
    receiver: mpsc::UnboundedReceiver<QueueEntry>,
    registry: SessionRegistry,
    pending: Arc<AtomicUsize>,
}

impl QueueWorker {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<QueueEntry>,
        registry: SessionRegistry,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            receiver,
            registry,
            pending,
        }
    }

    /// Runs until the queue is closed.
    pub async fn run(mut self) {
        info!("Command queue worker starting");

        let mut executed: u64 = 0;
        while let Some(entry) = self.receiver.recv().await {
            let QueueEntry {
                seq,
                caller,
                pulse,
                admitted_at,
                respond_to,
            } = entry;

            debug!(
                seq,
                channel = %pulse.channel,
                waited_ms = admitted_at.elapsed().as_millis() as u64,
                "Executing pulse"
            );

            let result = self.execute(&pulse).await;
            self.pending.fetch_sub(1, Ordering::AcqRel);
            executed += 1;

            self.registry.publish(SessionEvent::Pulse {
                seq,
                caller,
                outcome: result.clone().map_err(|e| e.code()),
            });

            // Ignore send error - caller may have dropped the receiver
            let _ = respond_to.send(result);
        }

        info!(executed, "Command queue worker stopped");
    }

    async fn execute(&self, pulse: &EffectivePulse) -> Result<PulseReceipt, PulseError> {
        let Some(session) = self.registry.bound().await else {
            debug!(channel = %pulse.channel, "No bound device, rejecting pulse");
            return Err(PulseError::DeviceNotBound);
        };

        match session.send_pulse(pulse).await {
            Ok(()) => {
                let receipt = pulse.receipt();
                info!(
                    session_id = %session.id().short(),
                    channel = %receipt.channel,
                    amp = receipt.amp_effective,
                    requested = receipt.amp_requested,
                    freq = receipt.freq,
                    copies = receipt.copies,
                    "Pulse sent"
                );
                Ok(receipt)
            }
            Err(PulseError::TransportError(why)) => {
                warn!(session_id = %session.id(), error = %why, "Pulse failed, releasing device");
                self.registry
                    .release(session.id(), CloseReason::TransportError(why.clone()))
                    .await;
                Err(PulseError::TransportError(why))
            }
            Err(e) => Err(e),
        }
    }
}
