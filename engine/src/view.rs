//! View materializer: Mirror overlaid by Pending.

use crate::store::{LocalStore, Partition};
use crate::{Record, RecordId, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Merge `mirror` and `pending` by id; pending values win.
///
/// The result is ordered by id.
pub fn materialize(mirror: Vec<Record>, pending: Vec<Record>) -> Vec<Record> {
    let mut merged: BTreeMap<RecordId, Record> = BTreeMap::new();
    for record in mirror.into_iter().chain(pending) {
        merged.insert(record.id.clone(), record);
    }
    merged.into_values().collect()
}

/// The latest materialized view, published to observers.
#[derive(Debug)]
pub struct View {
    tx: watch::Sender<Arc<Vec<Record>>>,
    // Held across scan and publish so refreshes land in order.
    refresh_lock: Mutex<()>,
}

impl Default for View {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self {
            tx,
            refresh_lock: Mutex::new(()),
        }
    }
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute from both partitions and publish the result.
    pub async fn refresh(&self, store: &dyn LocalStore) -> Result<Arc<Vec<Record>>> {
        let _refresh = self.refresh_lock.lock().await;
        let mirror = store.scan_all(Partition::Mirror).await?;
        let pending = store.scan_all(Partition::Pending).await?;
        let records = Arc::new(materialize(mirror, pending));
        self.tx.send_replace(records.clone());
        tracing::trace!(records = records.len(), "view refreshed");
        Ok(records)
    }

    /// The last published view.
    pub fn current(&self) -> Arc<Vec<Record>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Record>>> {
        self.tx.subscribe()
    }
}
