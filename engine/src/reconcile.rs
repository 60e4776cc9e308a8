//! Reconciliation engine.
//!
//! A flush reads the whole Pending partition, commits it to the remote as a
//! single atomic batch, drops the entries the remote confirmed, then
//! replaces Mirror with a fresh remote snapshot and republishes the view.
//!
//! Flushes never overlap: [`Reconciler::sync_now`] queues behind the one in
//! flight and [`Reconciler::trigger`] coalesces bursts of triggers into at
//! most one queued flush. Local writes are never blocked by a slow commit;
//! they only wait for the short acknowledge step.

use crate::remote::{CommitReceipt, RemoteStore, WriteBatch};
use crate::state::{StateMachine, SyncState};
use crate::store::{LocalStore, Partition};
use crate::view::View;
use crate::{Error, Record, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Why a sync did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No connectivity; pending writes wait for reconnect
    Offline,
    /// No remote store configured
    NotConfigured,
}

/// Result of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    /// Folded into a flush that was already queued
    Coalesced,
    /// Batch committed (possibly empty) and Mirror refreshed
    Synced { flushed: usize },
    /// Nothing was lost; Pending is retried on the next trigger
    Failed(Error),
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }
}

/// Owns the sync state and drives flushes between the local and remote
/// stores.
pub struct Reconciler {
    store: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    state: StateMachine,
    view: View,
    connectivity: watch::Sender<bool>,
    commit_timeout: Duration,
    flush_lock: Mutex<()>,
    pending_lock: Mutex<()>,
    queued: AtomicBool,
}

struct QueuedReset<'a>(&'a AtomicBool);

impl Drop for QueuedReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("state", &self.state.current())
            .field("connected", &self.is_connected())
            .field("remote", &self.remote.is_some())
            .field("commit_timeout", &self.commit_timeout)
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        connected: bool,
        commit_timeout: Duration,
    ) -> Self {
        let (connectivity, _rx) = watch::channel(connected);
        Self {
            store,
            remote,
            state: StateMachine::new(SyncState::initial(connected)),
            view: View::new(),
            connectivity,
            commit_timeout,
            flush_lock: Mutex::new(()),
            pending_lock: Mutex::new(()),
            queued: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.remote.as_ref()
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn is_connected(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Record a connectivity change and move the state machine accordingly.
    ///
    /// Returns whether connectivity actually changed.
    pub fn set_connected(&self, connected: bool) -> bool {
        let changed = self.connectivity.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
        if connected {
            if self.state.current() == SyncState::Offline {
                self.state.transition(SyncState::Online);
            }
        } else {
            self.state.transition(SyncState::Offline);
        }
        changed
    }

    /// Write records into Pending and republish the view.
    ///
    /// This is the durability point for local writes: once it returns `Ok`
    /// the records survive restarts regardless of any later sync outcome.
    pub async fn write_pending(&self, records: &[Record]) -> Result<()> {
        {
            let _guard = self.pending_lock.lock().await;
            match records {
                [record] => self.store.put(Partition::Pending, record).await?,
                _ => self.store.put_many(Partition::Pending, records).await?,
            }
        }
        self.view.refresh(self.store.as_ref()).await?;
        Ok(())
    }

    /// Replace Mirror with a snapshot pushed by the remote and republish.
    ///
    /// Pending is not touched, and an in-flight flush is not waited for.
    pub async fn apply_remote_snapshot(&self, records: &[Record]) -> Result<()> {
        self.store.replace_all(Partition::Mirror, records).await?;
        self.view.refresh(self.store.as_ref()).await?;
        tracing::debug!(records = records.len(), "applied remote snapshot");
        Ok(())
    }

    /// Sync, coalescing with a flush that is already queued.
    pub async fn trigger(&self) -> SyncOutcome {
        if self.queued.swap(true, Ordering::SeqCst) {
            tracing::trace!("sync already queued");
            return SyncOutcome::Coalesced;
        }
        // Clears the flag even if this future is dropped while queued.
        let queued = QueuedReset(&self.queued);
        let _flush = self.flush_lock.lock().await;
        drop(queued);
        self.sync_locked().await
    }

    /// Flush Pending and refresh Mirror, waiting for any in-flight flush
    /// first.
    pub async fn sync_now(&self) -> SyncOutcome {
        let _flush = self.flush_lock.lock().await;
        // Whatever was queued is served by this flush.
        self.queued.store(false, Ordering::SeqCst);
        self.sync_locked().await
    }

    /// Body of a sync. Caller holds `flush_lock`.
    async fn sync_locked(&self) -> SyncOutcome {
        let Some(remote) = self.remote.clone() else {
            return SyncOutcome::Skipped(SkipReason::NotConfigured);
        };
        if !self.is_connected() {
            tracing::debug!("offline, sync deferred");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }

        self.state.transition(SyncState::Syncing);

        match self.flush(remote.as_ref()).await {
            Ok(flushed) => {
                if self.is_connected() {
                    self.state.transition(SyncState::Synced);
                } else {
                    self.state.transition(SyncState::Offline);
                }
                tracing::info!(flushed, "sync complete");
                SyncOutcome::Synced { flushed }
            }
            Err(err) => {
                let fallback = if self.is_connected() {
                    SyncState::Online
                } else {
                    SyncState::Offline
                };
                self.state.transition(fallback);
                match &err {
                    Error::Connectivity(reason) => {
                        tracing::debug!(%reason, "remote unreachable, sync deferred")
                    }
                    Error::LocalStore(_) => tracing::error!(error = %err, "sync failed"),
                    _ => tracing::warn!(error = %err, "sync failed, pending kept for retry"),
                }
                SyncOutcome::Failed(err)
            }
        }
    }

    async fn flush(&self, remote: &dyn RemoteStore) -> Result<usize> {
        let pending = self.store.scan_all(Partition::Pending).await?;
        let batch = WriteBatch::from_pending(&pending);

        if !batch.is_empty() {
            tracing::debug!(
                creates = batch.creates.len(),
                updates = batch.updates.len(),
                "committing pending batch"
            );
            let receipt = self.commit(remote, &batch).await?;
            self.acknowledge(&pending, &receipt).await?;
        }

        let snapshot = remote.fetch_all().await?;
        self.store.replace_all(Partition::Mirror, &snapshot).await?;
        self.view.refresh(self.store.as_ref()).await?;

        Ok(batch.len())
    }

    /// Commit under the configured deadline. Losing connectivity before the
    /// remote answers fails the commit.
    async fn commit(&self, remote: &dyn RemoteStore, batch: &WriteBatch) -> Result<CommitReceipt> {
        let connectivity = self.connectivity.subscribe();
        tokio::select! {
            result = tokio::time::timeout(self.commit_timeout, remote.commit_batch(batch)) => {
                result.unwrap_or(Err(Error::Timeout(self.commit_timeout)))
            }
            _ = disconnected(connectivity) => {
                Err(Error::Connectivity("disconnected during commit".into()))
            }
        }
    }

    /// Drop the Pending entries a committed batch covered.
    ///
    /// An entry rewritten while the commit was in flight no longer matches
    /// what was sent and is kept. If it was a create, it is re-keyed to the
    /// id the remote assigned so it goes out as a merge-update next time.
    async fn acknowledge(&self, sent: &[Record], receipt: &CommitReceipt) -> Result<()> {
        let _guard = self.pending_lock.lock().await;

        let sent: HashMap<&str, &Record> = sent.iter().map(|r| (r.id.as_str(), r)).collect();
        let current = self.store.scan_all(Partition::Pending).await?;

        let mut retained = Vec::new();
        for record in current {
            match sent.get(record.id.as_str()) {
                Some(original) if **original == record => {}
                Some(_) => match receipt.assigned.get(&record.id) {
                    Some(assigned) => retained.push(Record::new(assigned.clone(), record.fields)),
                    None => retained.push(record),
                },
                None => retained.push(record),
            }
        }

        if retained.is_empty() {
            self.store.clear(Partition::Pending).await
        } else {
            tracing::debug!(
                retained = retained.len(),
                "pending entries changed during commit"
            );
            self.store.replace_all(Partition::Pending, &retained).await
        }
    }
}

/// Resolves once connectivity is down.
async fn disconnected(mut rx: watch::Receiver<bool>) {
    loop {
        let connected = *rx.borrow_and_update();
        if !connected {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn named(id: &str, name: &str) -> Record {
        Record::new(id, Default::default()).with_field("name", name)
    }

    struct Harness {
        store: Arc<MemoryStore>,
        remote: Arc<MemoryRemote>,
        reconciler: Arc<Reconciler>,
    }

    fn harness(connected: bool, timeout: Duration) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Some(remote.clone() as Arc<dyn RemoteStore>),
            connected,
            timeout,
        ));
        Harness {
            store,
            remote,
            reconciler,
        }
    }

    #[tokio::test]
    async fn no_remote_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store, None, true, Duration::from_secs(1));
        assert_eq!(
            reconciler.sync_now().await,
            SyncOutcome::Skipped(SkipReason::NotConfigured)
        );
        assert_eq!(reconciler.state().current(), SyncState::Online);
    }

    #[tokio::test]
    async fn offline_is_skipped_and_pending_kept() {
        let h = harness(false, Duration::from_secs(1));
        h.reconciler.write_pending(&[named("pending_1_a", "x")]).await.unwrap();

        assert_eq!(
            h.reconciler.sync_now().await,
            SyncOutcome::Skipped(SkipReason::Offline)
        );
        assert_eq!(h.store.scan_all(Partition::Pending).await.unwrap().len(), 1);
        assert_eq!(h.remote.commit_count(), 0);
        assert_eq!(h.reconciler.state().current(), SyncState::Offline);
    }

    #[tokio::test]
    async fn flush_creates_updates_and_replaces_mirror() {
        let h = harness(true, Duration::from_secs(1));
        h.remote.seed([named("7", "A")]).await;
        h.reconciler
            .write_pending(&[named("7", "B"), named("pending_1_a", "new")])
            .await
            .unwrap();

        let outcome = h.reconciler.sync_now().await;

        assert_eq!(outcome, SyncOutcome::Synced { flushed: 2 });
        assert_eq!(h.reconciler.state().current(), SyncState::Synced);
        assert!(h.store.scan_all(Partition::Pending).await.unwrap().is_empty());

        let mirror = h.store.scan_all(Partition::Mirror).await.unwrap();
        assert_eq!(mirror.len(), 2);
        assert!(mirror.iter().all(|r| !r.id.starts_with("pending_")));
        let seven = mirror.iter().find(|r| r.id == "7").unwrap();
        assert_eq!(seven.get("name"), Some(&json!("B")));

        let view = h.reconciler.view().current();
        assert_eq!(view.len(), 2);
    }

    #[tokio::test]
    async fn rejected_commit_keeps_pending() {
        let h = harness(true, Duration::from_secs(1));
        h.reconciler.write_pending(&[named("pending_1_a", "x")]).await.unwrap();
        let before = h.store.scan_all(Partition::Pending).await.unwrap();
        h.remote.set_fail_commits(true);

        let outcome = h.reconciler.sync_now().await;

        assert!(matches!(outcome, SyncOutcome::Failed(Error::RemoteRejection(_))));
        assert_eq!(h.store.scan_all(Partition::Pending).await.unwrap(), before);
        assert_eq!(h.reconciler.state().current(), SyncState::Online);
    }

    #[tokio::test]
    async fn commit_timeout_fails_flush() {
        let h = harness(true, Duration::from_millis(50));
        h.reconciler.write_pending(&[named("pending_1_a", "x")]).await.unwrap();
        h.remote.set_commit_delay(Duration::from_millis(500));

        let outcome = h.reconciler.sync_now().await;

        assert_eq!(
            outcome,
            SyncOutcome::Failed(Error::Timeout(Duration::from_millis(50)))
        );
        assert_eq!(h.store.scan_all(Partition::Pending).await.unwrap().len(), 1);
        assert_eq!(h.reconciler.state().current(), SyncState::Online);
    }

    #[tokio::test]
    async fn disconnect_mid_commit_is_failure() {
        let h = harness(true, Duration::from_secs(5));
        h.reconciler.write_pending(&[named("pending_1_a", "x")]).await.unwrap();
        h.remote.set_commit_delay(Duration::from_millis(300));

        let reconciler = h.reconciler.clone();
        let flush = tokio::spawn(async move { reconciler.sync_now().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.reconciler.set_connected(false);

        let outcome = flush.await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Failed(Error::Connectivity(_))));
        assert_eq!(h.reconciler.state().current(), SyncState::Offline);
        assert_eq!(h.store.scan_all(Partition::Pending).await.unwrap().len(), 1);
        assert_eq!(h.remote.commit_count(), 0);
    }

    #[tokio::test]
    async fn triggers_coalesce_behind_inflight_flush() {
        let h = harness(true, Duration::from_secs(5));
        h.reconciler.write_pending(&[named("pending_1_a", "x")]).await.unwrap();
        h.remote.set_commit_delay(Duration::from_millis(200));

        let first = {
            let r = h.reconciler.clone();
            tokio::spawn(async move { r.trigger().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = {
            let r = h.reconciler.clone();
            tokio::spawn(async move { r.trigger().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let third = h.reconciler.trigger().await;

        assert_eq!(third, SyncOutcome::Coalesced);
        assert_eq!(first.await.unwrap(), SyncOutcome::Synced { flushed: 1 });
        assert_eq!(second.await.unwrap(), SyncOutcome::Synced { flushed: 0 });
        assert_eq!(h.remote.commit_count(), 1);
        assert_eq!(h.remote.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn edits_during_commit_survive_acknowledge() {
        let h = harness(true, Duration::from_secs(5));
        h.remote.seed([named("7", "A")]).await;
        h.reconciler
            .write_pending(&[named("7", "B"), named("pending_1_a", "first")])
            .await
            .unwrap();
        h.remote.set_commit_delay(Duration::from_millis(150));

        let flush = {
            let r = h.reconciler.clone();
            tokio::spawn(async move { r.sync_now().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.reconciler
            .write_pending(&[named("pending_1_a", "second"), named("9", "C")])
            .await
            .unwrap();

        assert_eq!(flush.await.unwrap(), SyncOutcome::Synced { flushed: 2 });

        let pending = h.store.scan_all(Partition::Pending).await.unwrap();
        let created = h
            .remote
            .snapshot()
            .await
            .into_iter()
            .find(|r| r.get("name") == Some(&json!("first")))
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|r| r.id == "9"));
        let rekeyed = pending.iter().find(|r| r.id == created.id).unwrap();
        assert_eq!(rekeyed.get("name"), Some(&json!("second")));
    }

    #[tokio::test]
    async fn remote_snapshot_does_not_touch_pending() {
        let h = harness(true, Duration::from_secs(1));
        h.reconciler.write_pending(&[named("7", "local")]).await.unwrap();

        h.reconciler
            .apply_remote_snapshot(&[named("7", "remote"), named("8", "other")])
            .await
            .unwrap();

        assert_eq!(h.store.scan_all(Partition::Pending).await.unwrap().len(), 1);
        let view = h.reconciler.view().current();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].get("name"), Some(&json!("local")));
    }

    #[tokio::test]
    async fn connectivity_drives_state() {
        let h = harness(false, Duration::from_secs(1));
        assert!(h.reconciler.set_connected(true));
        assert_eq!(h.reconciler.state().current(), SyncState::Online);
        assert!(!h.reconciler.set_connected(true));
        assert!(h.reconciler.set_connected(false));
        assert_eq!(h.reconciler.state().current(), SyncState::Offline);
    }

    #[tokio::test]
    async fn abandoned_trigger_does_not_block_later_ones() {
        let h = harness(true, Duration::from_secs(5));
        h.reconciler.write_pending(&[named("pending_1_a", "x")]).await.unwrap();
        h.remote.set_commit_delay(Duration::from_millis(200));

        let flush = {
            let r = h.reconciler.clone();
            tokio::spawn(async move { r.sync_now().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Gives up while queued behind the in-flight flush.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), h.reconciler.trigger()).await;
        assert!(abandoned.is_err());
        assert_eq!(flush.await.unwrap(), SyncOutcome::Synced { flushed: 1 });

        h.remote.set_commit_delay(Duration::ZERO);
        h.reconciler.write_pending(&[named("pending_2_b", "y")]).await.unwrap();
        assert_eq!(h.reconciler.trigger().await, SyncOutcome::Synced { flushed: 1 });
        assert_eq!(h.remote.snapshot().await.len(), 2);
    }
}
