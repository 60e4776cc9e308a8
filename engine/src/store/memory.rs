//! In-memory local store.

use super::{LocalStore, Partition};
use crate::{Error, Record, RecordId, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

type Table = RwLock<BTreeMap<RecordId, Record>>;

/// Volatile [`LocalStore`] with a switch for simulating write failures.
///
/// Each partition has its own lock, so readers of one partition never wait
/// on writers of the other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    mirror: Table,
    pending: Table,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mutating call fail without touching state.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn table(&self, partition: Partition) -> &Table {
        match partition {
            Partition::Mirror => &self.mirror,
            Partition::Pending => &self.pending,
        }
    }

    fn check_writable(&self, partition: Partition) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::LocalStore(format!("simulated write failure on {partition}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, partition: Partition, id: &str) -> Result<Option<Record>> {
        Ok(self.table(partition).read().await.get(id).cloned())
    }

    async fn put(&self, partition: Partition, record: &Record) -> Result<()> {
        self.check_writable(partition)?;
        self.table(partition)
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn put_many(&self, partition: Partition, records: &[Record]) -> Result<()> {
        self.check_writable(partition)?;
        let mut table = self.table(partition).write().await;
        for record in records {
            table.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn scan_all(&self, partition: Partition) -> Result<Vec<Record>> {
        Ok(self.table(partition).read().await.values().cloned().collect())
    }

    async fn replace_all(&self, partition: Partition, records: &[Record]) -> Result<()> {
        self.check_writable(partition)?;
        let replacement: BTreeMap<RecordId, Record> = records
            .iter()
            .map(|record| (record.id.clone(), record.clone()))
            .collect();
        *self.table(partition).write().await = replacement;
        Ok(())
    }

    async fn clear(&self, partition: Partition) -> Result<()> {
        self.check_writable(partition)?;
        self.table(partition).write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, name: &str) -> Record {
        Record::new(id, Default::default()).with_field("name", json!(name))
    }

    #[tokio::test]
    async fn partitions_are_independent() {
        let store = MemoryStore::new();
        store.put(Partition::Mirror, &record("7", "A")).await.unwrap();
        store.put(Partition::Pending, &record("7", "B")).await.unwrap();

        let mirror = store.get(Partition::Mirror, "7").await.unwrap().unwrap();
        let pending = store.get(Partition::Pending, "7").await.unwrap().unwrap();
        assert_eq!(mirror.get("name"), Some(&json!("A")));
        assert_eq!(pending.get("name"), Some(&json!("B")));

        store.clear(Partition::Pending).await.unwrap();
        assert!(store.scan_all(Partition::Pending).await.unwrap().is_empty());
        assert_eq!(store.scan_all(Partition::Mirror).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_all_discards_old_contents() {
        let store = MemoryStore::new();
        store
            .put_many(Partition::Mirror, &[record("1", "a"), record("2", "b")])
            .await
            .unwrap();

        store
            .replace_all(Partition::Mirror, &[record("3", "c")])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .scan_all(Partition::Mirror)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["3"]);
    }

    #[tokio::test]
    async fn failed_writes_leave_state_intact() {
        let store = MemoryStore::new();
        store.put(Partition::Pending, &record("1", "a")).await.unwrap();
        store.set_fail_writes(true);

        assert!(store.put(Partition::Pending, &record("2", "b")).await.is_err());
        assert!(store.replace_all(Partition::Pending, &[]).await.is_err());
        assert!(store.clear(Partition::Pending).await.is_err());

        let remaining = store.scan_all(Partition::Pending).await.unwrap();
        assert_eq!(remaining, vec![record("1", "a")]);
    }

    #[tokio::test]
    async fn scan_is_ordered_by_id() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store.put(Partition::Mirror, &record(id, id)).await.unwrap();
        }
        let ids: Vec<String> = store
            .scan_all(Partition::Mirror)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
