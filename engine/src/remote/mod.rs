//! Remote store contract and implementations.
//!
//! The engine needs three things from the authoritative remote: a full
//! snapshot read, an atomic batch commit, and a change-notification stream.

mod http;
mod memory;
pub mod wire;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use crate::identity::is_provisional;
use crate::{Fields, Record, RecordId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Stream of full remote snapshots. Dropping the receiver unsubscribes.
pub type ChangeStream = mpsc::UnboundedReceiver<Vec<Record>>;

/// Merge-update of an existing remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub id: RecordId,
    pub fields: Fields,
}

/// One atomic multi-record write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    /// New records; the remote assigns their ids
    pub creates: Vec<Record>,
    /// Field merges against committed ids
    pub updates: Vec<BatchUpdate>,
}

impl WriteBatch {
    /// Split pending records into creates (provisional ids) and
    /// merge-updates (committed ids).
    pub fn from_pending(pending: &[Record]) -> Self {
        let mut batch = WriteBatch::default();
        for record in pending {
            if is_provisional(&record.id) {
                batch.creates.push(record.clone());
            } else {
                batch.updates.push(BatchUpdate {
                    id: record.id.clone(),
                    fields: record.fields.clone(),
                });
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the remote reports back for a committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Provisional id of each created record mapped to its new remote id
    pub assigned: BTreeMap<RecordId, RecordId>,
}

/// Contract the engine requires from the authoritative remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every record the remote holds.
    async fn fetch_all(&self) -> Result<Vec<Record>>;

    /// Apply all writes in `batch`, or none of them.
    async fn commit_batch(&self, batch: &WriteBatch) -> Result<CommitReceipt>;

    /// Subscribe to full snapshots pushed on every remote change.
    async fn subscribe(&self) -> Result<ChangeStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_splits_by_identity_class() {
        let pending = vec![
            Record::new("pending_1_abc", Default::default()).with_field("name", "new"),
            Record::new("K3xQ", Default::default()).with_field("name", "edited"),
        ];

        let batch = WriteBatch::from_pending(&pending);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.creates.len(), 1);
        assert_eq!(batch.creates[0].id, "pending_1_abc");
        assert_eq!(batch.updates[0].id, "K3xQ");
        assert_eq!(batch.updates[0].fields["name"], json!("edited"));
    }

    #[test]
    fn empty_batch() {
        assert!(WriteBatch::from_pending(&[]).is_empty());
    }
}
