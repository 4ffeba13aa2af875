//! FIFO command queue using the actor pattern.
//!
//! Every pulse, from every caller, goes through one unbounded queue and one
//! worker task, so device writes never overlap and execute in the order the
//! requests were admitted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ submit ┌──────────────┐  QueueEntry   ┌─────────────┐
//! │  Caller 1..N │───────▶│ CommandQueue │──────────────▶│ QueueWorker │
//! └──────────────┘        └──────────────┘ (mpsc, FIFO)  └──────┬──────┘
//!        ▲                  validate +                          │ send_pulse
//!        │                  owner cap                           ▼
//!        └──────── oneshot result ─────────────────── SessionRegistry::bound()
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::mpsc;

use coyote_core::OwnerCap;

use crate::session::SessionRegistry;

mod commands;
mod handle;
mod worker;

pub use commands::QueueEntry;
pub use handle::CommandQueue;
pub use worker::QueueWorker;

/// Spawns the execution worker and returns a handle for callers.
///
/// The worker runs until every clone of the returned handle is dropped.
///
/// # Example
///
/// ```no_run
/// use coyote_core::OwnerCap;
/// use coyoted::queue::spawn_queue;
/// use coyoted::session::SessionRegistry;
///
/// #[tokio::main]
/// async fn main() {
///     let registry = SessionRegistry::new();
///     let queue = spawn_queue(registry, OwnerCap::default());
///     assert_eq!(queue.pending(), 0);
/// }
/// ```
pub fn spawn_queue(registry: SessionRegistry, owner_cap: OwnerCap) -> CommandQueue {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));

    let worker = QueueWorker::new(rx, registry, Arc::clone(&pending));
    tokio::spawn(worker.run());

    CommandQueue::new(tx, owner_cap, pending)
}
