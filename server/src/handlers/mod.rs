//! Request handlers for the remote store operations.

mod batch;
mod snapshot;
mod websocket;

pub use batch::*;
pub use snapshot::*;
pub use websocket::*;
