//! Coyote Protocol - Wire formats for the daemon
//!
//! Two protocols live here:
//! - `message` - JSON-lines control protocol between callers and the daemon
//! - `dglab` - DG-Lab app socket frames exchanged with the paired device
//!
//! `parse` turns chat-style command arguments (`A 20 20 5`) into pulse
//! requests for command-line callers.

pub mod dglab;
pub mod message;
pub mod parse;
pub mod version;

pub use dglab::{AppReport, DglabError, DglabFrame, FrameType};
pub use message::{ClientMessage, DaemonMessage, DeviceEvent, MessageType};
pub use parse::{parse_shock_args, usage, ArgsError, ParseNote, ShockArgs};
pub use version::ProtocolVersion;
