//! JSON wire protocol between [`HttpRemote`](super::HttpRemote) and the
//! sync server.
//!
//! - `GET /records` answers a [`SnapshotResponse`]
//! - `POST /batch` takes a [`WriteBatch`](super::WriteBatch) and answers a
//!   [`CommitReceipt`](super::CommitReceipt)
//! - `GET /ws` upgrades to a WebSocket carrying [`ServerMessage`] and
//!   [`ClientMessage`] frames

use crate::Record;
use serde::{Deserialize, Serialize};

/// Full snapshot of the remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub records: Vec<Record>,
}

/// Messages sent from the server over the change socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full current collection, sent on connect and after every commit.
    Snapshot { records: Vec<Record> },

    /// Response to ping.
    Pong,

    /// Error response.
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Messages sent from the client over the change socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive ping.
    Ping,
}
