//! Identity scheme: provisional (client-originated) vs committed ids.
//!
//! Provisional ids look like `pending_<unix millis>_<uuid>`. The millisecond
//! stamp keeps them roughly time-ordered; the uuid suffix keeps ids unique
//! when a bulk import mints thousands within the same millisecond.

use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix shared by every provisional id.
pub const PROVISIONAL_PREFIX: &str = "pending_";

/// Which side of the sync boundary an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdClass {
    /// Created locally, not yet known to the remote
    Provisional,
    /// Assigned by the remote
    Committed,
}

/// True iff `id` carries the provisional prefix followed by a token.
pub fn is_provisional(id: &str) -> bool {
    id.strip_prefix(PROVISIONAL_PREFIX)
        .is_some_and(|token| !token.is_empty())
}

/// Classify an id.
pub fn classify(id: &str) -> IdClass {
    if is_provisional(id) {
        IdClass::Provisional
    } else {
        IdClass::Committed
    }
}

/// Mint a fresh provisional id.
pub fn new_provisional_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!(
        "{PROVISIONAL_PREFIX}{millis}_{}",
        uuid::Uuid::new_v4().simple()
    )
}
