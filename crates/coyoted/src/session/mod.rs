//! Device session state.
//!
//! ```text
//! ┌──────────────┐ reserve/bind/release ┌─────────────────┐  SessionEvent
//! │  Transport   │─────────────────────▶│ SessionRegistry │──────────────▶ subscribers
//! └──────────────┘                      │  (one slot)     │  (broadcast)
//!                                       └────────┬────────┘
//!                                                │ bound()
//!                                       ┌────────▼────────┐
//!                                       │   QueueWorker   │── send_pulse ─▶ DeviceLink
//!                                       └─────────────────┘
//! ```

mod device;
mod registry;
pub mod testing;

pub use device::{DeviceLink, DeviceSession, LinkError};
pub use registry::{CloseReason, RegistryError, SessionEvent, SessionRegistry};
