//! Sync state machine.
//!
//! ```text
//! offline ──▶ syncing | online
//! online  ──▶ syncing | offline
//! syncing ──▶ synced | online | offline
//! synced  ──▶ syncing | offline
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Replica-wide synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Offline,
    Online,
    /// A flush is in flight; always transient
    Syncing,
    Synced,
}

impl SyncState {
    /// The state a replica starts in for the given connectivity.
    pub fn initial(connected: bool) -> Self {
        if connected {
            SyncState::Online
        } else {
            SyncState::Offline
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use SyncState::*;
        matches!(
            (self, next),
            (Offline, Syncing)
                | (Offline, Online)
                | (Online, Syncing)
                | (Online, Offline)
                | (Syncing, Synced)
                | (Syncing, Online)
                | (Syncing, Offline)
                | (Synced, Syncing)
                | (Synced, Offline)
        )
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Offline => write!(f, "offline"),
            SyncState::Online => write!(f, "online"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
        }
    }
}

/// Holder of the current [`SyncState`] that observers can watch.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<SyncState>,
}

impl StateMachine {
    pub fn new(initial: SyncState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> SyncState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Same-state moves are no-ops; illegal ones are refused.
    ///
    /// Returns whether the state changed.
    pub fn transition(&self, next: SyncState) -> bool {
        let mut refused = None;
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                refused = Some(*state);
                false
            }
        });
        match refused {
            Some(from) => tracing::warn!(from = %from, to = %next, "refused sync state transition"),
            None if changed => tracing::debug!(state = %next, "sync state changed"),
            None => {}
        }
        changed
    }
}
