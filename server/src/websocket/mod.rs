//! WebSocket support for change notifications.
//!
//! Replicas hold a socket open to learn about commits from other devices.
//! Each connection gets the full snapshot on connect and again after every
//! committed batch.

mod manager;

pub use fieldsync_engine::remote::wire::{ClientMessage, ServerMessage};
pub use manager::ConnectionManager;
