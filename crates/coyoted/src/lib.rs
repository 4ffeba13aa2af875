//! Coyote Daemon - device pairing, pulse queue and control server
//!
//! This crate provides the core infrastructure for the Coyote daemon:
//! - `session` - the device session and the single-slot registry
//! - `queue` - FIFO command queue with one execution worker
//! - `transport` - WebSocket endpoint and pairing handshake for the app
//! - `server` - Unix socket control server for local callers
//! - `config` - file and environment configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      coyoted daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐ submit ┌─────────────────────────────┐ │
//! │  │  DaemonServer   │───────▶│ CommandQueue → QueueWorker  │ │
//! │  │ (Unix Socket)   │        │ (validate, cap, FIFO)       │ │
//! │  └────────┬────────┘        └──────────────┬──────────────┘ │
//! │           │ device events                  │ send_pulse     │
//! │           │                                ▼                │
//! │  ┌────────┴────────┐        ┌─────────────────────────────┐ │
//! │  │ SessionRegistry │◀───────│ TransportListener           │ │
//! │  │  (one slot)     │ bind/  │ (WebSocket, DG-Lab app)     │ │
//! │  └─────────────────┘ close  └─────────────────────────────┘ │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod cli;
pub mod config;
pub mod daemon;
pub mod queue;
pub mod server;
pub mod session;
pub mod transport;
