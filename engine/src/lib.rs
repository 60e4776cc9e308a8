//! # Fieldsync Engine
//!
//! An offline-first sync engine for field-data collection.
//!
//! Records are created and edited on the device while disconnected,
//! persisted durably, and reconciled with an authoritative remote store as
//! soon as connectivity returns.
//!
//! ## Core Concepts
//!
//! ### Partitions
//!
//! The [`LocalStore`] keeps two partitions:
//! - **Mirror** - the last full snapshot fetched from the remote, only ever
//!   replaced wholesale
//! - **Pending** - the latest unconfirmed local value per record id
//!
//! The view the application reads is Mirror overlaid by Pending
//! ([`materialize`]).
//!
//! ### Identity
//!
//! Records created locally carry a provisional id (`pending_...`). On
//! flush they become creates and the remote assigns the real id; records
//! with committed ids become merge-updates. See [`identity`].
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] flushes Pending as one atomic [`WriteBatch`], drops
//! what the remote confirmed, then replaces Mirror with a fresh snapshot.
//! Its progress is the [`SyncState`]: `offline`, `online`, `syncing`,
//! `synced`. Sync failures never fail a local write.
//!
//! ### Bulk import
//!
//! [`ImportSession`] parses CSV/XLSX files, maps columns to fields, and
//! coerces cells through the same table ([`coerce`]) used for every
//! record write.
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldsync_engine::{MemoryRemote, MemoryStore, RemoteStore, Replica, ReplicaConfig, Schema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> fieldsync_engine::Result<()> {
//! let replica = Replica::with_parts(
//!     Arc::new(MemoryStore::new()),
//!     Some(Arc::new(MemoryRemote::new()) as Arc<dyn RemoteStore>),
//!     Schema::households(),
//!     ReplicaConfig::default(),
//!     false, // start offline
//! )
//! .await?;
//!
//! let fields = json!({"name": "Asha", "membersInHousehold": "5"});
//! let record = replica.add_record(fields.as_object().cloned().unwrap_or_default()).await?;
//!
//! // Visible immediately, even offline.
//! let view = replica.materialize().await?;
//! assert_eq!(view[0].id, record.id);
//!
//! // Reconnecting flushes Pending in the background.
//! replica.set_connectivity(true).await;
//! replica.settle().await;
//! # Ok(())
//! # }
//! ```

pub mod coerce;
pub mod config;
pub mod error;
pub mod identity;
pub mod import;
pub mod listener;
pub mod reconcile;
pub mod record;
pub mod remote;
pub mod replica;
pub mod schema;
pub mod state;
pub mod store;
pub mod view;

// Re-export main types at crate root
pub use coerce::{coerce, DateSystem};
pub use config::ReplicaConfig;
pub use error::{Error, Result};
pub use identity::{is_provisional, new_provisional_id, IdClass};
pub use import::{template_csv, ColumnMapping, ImportSession, Target};
pub use listener::ListenerHandle;
pub use reconcile::{Reconciler, SkipReason, SyncOutcome};
pub use record::Record;
pub use remote::{
    BatchUpdate, ChangeStream, CommitReceipt, HttpRemote, MemoryRemote, RemoteStore, WriteBatch,
};
pub use replica::Replica;
pub use schema::{FieldDef, FieldType, Schema};
pub use state::{StateMachine, SyncState};
pub use store::{LocalStore, MemoryStore, Partition, SqliteStore};
pub use view::{materialize, View};

/// Type aliases for clarity
pub type RecordId = String;
pub type Fields = serde_json::Map<String, serde_json::Value>;
