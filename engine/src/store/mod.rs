//! Local store adapter: durable key-value persistence in two partitions.
//!
//! - [`Partition::Mirror`] holds the last full snapshot fetched from the
//!   remote and is only ever replaced wholesale.
//! - [`Partition::Pending`] holds the latest unconfirmed local value per id.
//!
//! Every operation is a transactional unit: when it fails, the partition is
//! left exactly as it was.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::{Record, Result};
use async_trait::async_trait;

/// One of the two named partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Last-known remote state
    Mirror,
    /// Locally originated, unconfirmed writes
    Pending,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Mirror, Partition::Pending];
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Mirror => write!(f, "mirror"),
            Partition::Pending => write!(f, "pending"),
        }
    }
}

/// Contract the engine requires from on-device storage.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Fetch one record.
    async fn get(&self, partition: Partition, id: &str) -> Result<Option<Record>>;

    /// Insert or overwrite one record.
    async fn put(&self, partition: Partition, record: &Record) -> Result<()>;

    /// Insert or overwrite many records; all or none are written.
    async fn put_many(&self, partition: Partition, records: &[Record]) -> Result<()>;

    /// Every record in the partition, ordered by id.
    async fn scan_all(&self, partition: Partition) -> Result<Vec<Record>>;

    /// Discard the partition's contents and store `records` instead, atomically.
    async fn replace_all(&self, partition: Partition, records: &[Record]) -> Result<()>;

    /// Remove every record from the partition.
    async fn clear(&self, partition: Partition) -> Result<()>;
}
