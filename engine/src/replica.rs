//! The replica: the engine's API toward the application.

use crate::config::ReplicaConfig;
use crate::identity::new_provisional_id;
use crate::import::ImportSession;
use crate::listener::{self, ListenerHandle};
use crate::reconcile::{Reconciler, SyncOutcome};
use crate::remote::{HttpRemote, RemoteStore};
use crate::schema::Schema;
use crate::state::SyncState;
use crate::store::{LocalStore, SqliteStore};
use crate::{Error, Fields, Record, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// A device-local replica of the remote collection.
///
/// Writes land in Pending and are visible in the view at once; when
/// `sync_on_write` is set each write also starts a background sync whose
/// outcome never reaches the writer.
pub struct Replica {
    reconciler: Arc<Reconciler>,
    schema: Schema,
    config: ReplicaConfig,
    listener: Mutex<Option<ListenerHandle>>,
    background: Mutex<JoinSet<SyncOutcome>>,
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("reconciler", &self.reconciler)
            .field("schema", &self.schema.name)
            .finish()
    }
}

impl Replica {
    /// Open the SQLite-backed replica described by `config`.
    pub async fn open(config: ReplicaConfig, connected: bool) -> Result<Self> {
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open(&config.database_path).await?);
        let remote: Option<Arc<dyn RemoteStore>> = match &config.remote_url {
            Some(url) => Some(Arc::new(HttpRemote::new(url.clone())?) as Arc<dyn RemoteStore>),
            None => None,
        };
        Self::with_parts(store, remote, Schema::households(), config, connected).await
    }

    /// Assemble a replica from explicit parts.
    pub async fn with_parts(
        store: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        schema: Schema,
        config: ReplicaConfig,
        connected: bool,
    ) -> Result<Self> {
        let reconciler = Arc::new(Reconciler::new(
            store,
            remote,
            connected,
            config.commit_timeout,
        ));
        reconciler.view().refresh(reconciler.store().as_ref()).await?;

        let replica = Self {
            reconciler,
            schema,
            config,
            listener: Mutex::new(None),
            background: Mutex::new(JoinSet::new()),
        };
        if connected {
            replica.start_listener().await;
            replica.spawn_sync();
        }
        tracing::info!(
            state = %replica.state(),
            remote = replica.reconciler.remote().is_some(),
            "replica opened"
        );
        Ok(replica)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Read both partitions and return the merged view.
    pub async fn materialize(&self) -> Result<Vec<Record>> {
        let records = self
            .reconciler
            .view()
            .refresh(self.reconciler.store().as_ref())
            .await?;
        Ok(records.as_ref().clone())
    }

    /// Create a record under a fresh provisional id.
    pub async fn add_record(&self, fields: Fields) -> Result<Record> {
        let record = Record::new(
            new_provisional_id(),
            self.schema.normalize(&fields, self.config.date_system),
        );
        self.write(std::slice::from_ref(&record)).await?;
        Ok(record)
    }

    /// Store an edited record. It is sent as a merge-update if its id is
    /// committed, or as part of its create if still provisional.
    pub async fn update_record(&self, record: Record) -> Result<Record> {
        if record.id.trim().is_empty() {
            return Err(Error::InvalidRecord("record id is empty".into()));
        }
        let record = Record::new(
            record.id,
            self.schema.normalize(&record.fields, self.config.date_system),
        );
        self.write(std::slice::from_ref(&record)).await?;
        Ok(record)
    }

    /// Enqueue many records in one local transaction. Records without an id
    /// get a provisional one.
    pub async fn import_bulk(&self, records: Vec<Record>) -> Result<usize> {
        let records: Vec<Record> = records
            .into_iter()
            .map(|record| {
                let id = if record.id.trim().is_empty() {
                    new_provisional_id()
                } else {
                    record.id
                };
                Record::new(id, self.schema.normalize(&record.fields, self.config.date_system))
            })
            .collect();
        if records.is_empty() {
            return Ok(0);
        }
        self.write(&records).await?;
        tracing::info!(records = records.len(), "bulk import enqueued");
        Ok(records.len())
    }

    /// Parse an import file against this replica's schema.
    pub fn import_session(&self, bytes: &[u8]) -> Result<ImportSession> {
        ImportSession::parse(bytes, self.schema.clone(), self.config.date_system)
    }

    /// Preview of an import using the configured row limit.
    pub fn preview_import(&self, session: &ImportSession) -> Vec<Record> {
        session.preview(self.config.preview_rows)
    }

    /// Flush now, waiting behind any flush already in flight.
    pub async fn sync_now(&self) -> SyncOutcome {
        self.reconciler.sync_now().await
    }

    pub fn state(&self) -> SyncState {
        self.reconciler.state().current()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.reconciler.state().subscribe()
    }

    pub fn watch_view(&self) -> watch::Receiver<Arc<Vec<Record>>> {
        self.reconciler.view().subscribe()
    }

    /// Report a connectivity change from the platform.
    ///
    /// Reconnecting resubscribes to remote changes and starts a sync;
    /// disconnecting drops the subscription.
    pub async fn set_connectivity(&self, connected: bool) {
        let changed = self.reconciler.set_connected(connected);
        if connected {
            if changed || self.lock_listener().is_none() {
                self.start_listener().await;
            }
            self.spawn_sync();
        } else if let Some(handle) = self.lock_listener().take() {
            handle.stop();
            tracing::debug!("change listener stopped");
        }
    }

    /// Wait until every outstanding background sync has finished and
    /// return their outcomes. Syncs already reaped are not reported.
    pub async fn settle(&self) -> Vec<SyncOutcome> {
        let mut tasks = std::mem::take(&mut *self.lock_background());
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!("background sync task failed: {}", e),
            }
        }
        outcomes
    }

    /// Stop listening and wait for background syncs.
    pub async fn shutdown(self) {
        if let Some(handle) = self.lock_listener().take() {
            handle.stop();
        }
        self.settle().await;
        tracing::info!("replica shut down");
    }

    async fn write(&self, records: &[Record]) -> Result<()> {
        if let Err(e) = self.reconciler.write_pending(records).await {
            tracing::error!(error = %e, records = records.len(), "local write failed");
            return Err(e);
        }
        if self.config.sync_on_write {
            self.spawn_sync();
        }
        Ok(())
    }

    fn spawn_sync(&self) {
        let reconciler = self.reconciler.clone();
        let mut background = self.lock_background();
        // Reap finished syncs so a long session holds only live tasks.
        while background.try_join_next().is_some() {}
        background.spawn(async move { reconciler.trigger().await });
    }

    async fn start_listener(&self) {
        let Some(remote) = self.reconciler.remote().cloned() else {
            return;
        };
        let initial = match remote.subscribe().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::debug!(error = %e, "could not subscribe to remote changes, will retry");
                None
            }
        };
        let handle = listener::spawn(self.reconciler.clone(), remote, initial);
        // Replacing the old handle drops it, which unsubscribes.
        *self.lock_listener() = Some(handle);
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<ListenerHandle>> {
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_background(&self) -> MutexGuard<'_, JoinSet<SyncOutcome>> {
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::store::{MemoryStore, Partition};
    use std::time::Duration;

    fn fields(name: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), name.into());
        fields
    }

    #[tokio::test]
    async fn finished_syncs_are_reaped() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let replica = Replica::with_parts(
            store.clone(),
            Some(remote.clone() as Arc<dyn RemoteStore>),
            Schema::households(),
            ReplicaConfig::default().with_sync_on_write(true),
            true,
        )
        .await
        .unwrap();

        for n in 0..200 {
            replica.add_record(fields(&format!("house {n}"))).await.unwrap();
        }

        for _ in 0..200 {
            let drained = store.scan_all(Partition::Pending).await.unwrap().is_empty();
            if drained && replica.state() != SyncState::Syncing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        replica.add_record(fields("one more")).await.unwrap();
        assert!(replica.lock_background().len() <= 2);

        replica.settle().await;
        replica.sync_now().await;
        assert_eq!(remote.snapshot().await.len(), 201);
    }
}
