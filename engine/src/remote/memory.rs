//! In-process remote store.

use super::{ChangeStream, CommitReceipt, RemoteStore, WriteBatch};
use crate::record::SYNCED_AT_FIELD;
use crate::{Error, Record, RecordId, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Authoritative [`RemoteStore`] held in memory.
///
/// Behaves like the hosted remote: creates get fresh ids, updates merge
/// shallowly into the stored record (creating it when absent), both stamp
/// `syncedAt`, and every subscriber receives the full collection after each
/// change. Switches let tests cut the network, refuse commits, or slow them
/// down.
#[derive(Debug)]
pub struct MemoryRemote {
    records: RwLock<BTreeMap<RecordId, Record>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<Record>>>>,
    reachable: AtomicBool,
    fail_commits: AtomicBool,
    commit_delay_ms: AtomicU64,
    commits: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            subscribers: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
            fail_commits: AtomicBool::new(false),
            commit_delay_ms: AtomicU64::new(0),
            commits: AtomicUsize::new(0),
        }
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the remote with records as if committed long ago.
    pub async fn seed(&self, records: impl IntoIterator<Item = Record>) {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.id.clone(), record);
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Delay every commit by `delay` before it is applied.
    pub fn set_commit_delay(&self, delay: Duration) {
        self.commit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of batches successfully committed.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Current remote contents.
    pub async fn snapshot(&self) -> Vec<Record> {
        self.records.read().await.values().cloned().collect()
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Write a record as another device would, notifying subscribers.
    pub async fn apply_external(&self, record: Record) {
        let snapshot = {
            let mut stored = self.records.write().await;
            stored.insert(record.id.clone(), record);
            stored.values().cloned().collect::<Vec<_>>()
        };
        self.broadcast(snapshot);
    }

    /// Delete a record as another device would, notifying subscribers.
    pub async fn remove_external(&self, id: &str) {
        let snapshot = {
            let mut stored = self.records.write().await;
            stored.remove(id);
            stored.values().cloned().collect::<Vec<_>>()
        };
        self.broadcast(snapshot);
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Vec<Record>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn broadcast(&self, snapshot: Vec<Record>) {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connectivity("memory remote unreachable".into()))
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.check_reachable()?;
        Ok(self.snapshot().await)
    }

    async fn commit_batch(&self, batch: &WriteBatch) -> Result<CommitReceipt> {
        self.check_reachable()?;

        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.check_reachable()?;
        }

        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::RemoteRejection("commit refused".into()));
        }

        let synced_at = Value::String(chrono::Utc::now().to_rfc3339());
        let mut receipt = CommitReceipt::default();

        let snapshot = {
            let mut stored = self.records.write().await;

            for create in &batch.creates {
                let id = uuid::Uuid::new_v4().simple().to_string();
                let record = Record::new(id.clone(), create.fields.clone())
                    .with_field(SYNCED_AT_FIELD, synced_at.clone());
                stored.insert(id.clone(), record);
                receipt.assigned.insert(create.id.clone(), id);
            }

            for update in &batch.updates {
                let record = stored
                    .entry(update.id.clone())
                    .or_insert_with(|| Record::new(update.id.clone(), Default::default()));
                record.merge_fields(&update.fields);
                record
                    .fields
                    .insert(SYNCED_AT_FIELD.to_string(), synced_at.clone());
            }

            stored.values().cloned().collect::<Vec<_>>()
        };

        self.commits.fetch_add(1, Ordering::SeqCst);
        self.broadcast(snapshot);

        tracing::debug!(
            creates = batch.creates.len(),
            updates = batch.updates.len(),
            "memory remote committed batch"
        );

        Ok(receipt)
    }

    async fn subscribe(&self) -> Result<ChangeStream> {
        self.check_reachable()?;
        let (tx, rx) = mpsc::unbounded_channel();
        // Register while holding the read lock so no commit slips between
        // the initial snapshot and the first broadcast.
        let stored = self.records.read().await;
        let _ = tx.send(stored.values().cloned().collect());
        self.lock_subscribers().push(tx);
        drop(stored);
        Ok(rx)
    }
}
