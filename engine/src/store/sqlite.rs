//! SQLite-backed local store.

use super::{LocalStore, Partition};
use crate::{Error, Fields, Record, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Prepared SQL for one partition table.
struct Statements {
    get: &'static str,
    upsert: &'static str,
    scan: &'static str,
    clear: &'static str,
}

const MIRROR: Statements = Statements {
    get: "SELECT id, body FROM mirror_records WHERE id = ?1",
    upsert: "INSERT INTO mirror_records (id, body) VALUES (?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
    scan: "SELECT id, body FROM mirror_records ORDER BY id",
    clear: "DELETE FROM mirror_records",
};

const PENDING: Statements = Statements {
    get: "SELECT id, body FROM pending_records WHERE id = ?1",
    upsert: "INSERT INTO pending_records (id, body) VALUES (?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
    scan: "SELECT id, body FROM pending_records ORDER BY id",
    clear: "DELETE FROM pending_records",
};

fn statements(partition: Partition) -> &'static Statements {
    match partition {
        Partition::Mirror => &MIRROR,
        Partition::Pending => &PENDING,
    }
}

/// Durable [`LocalStore`] on a SQLite database, one table per partition.
///
/// Each record is stored as its id plus the JSON-encoded field map.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database, mostly useful in tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("local store ready");
        Ok(Self { pool })
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn encode(record: &Record) -> Result<String> {
    serde_json::to_string(&record.fields).map_err(|e| Error::LocalStore(e.to_string()))
}

fn decode((id, body): (String, String)) -> Result<Record> {
    let fields: Fields = serde_json::from_str(&body)
        .map_err(|e| Error::LocalStore(format!("corrupt record {id}: {e}")))?;
    Ok(Record::new(id, fields))
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn get(&self, partition: Partition, id: &str) -> Result<Option<Record>> {
        let row: Option<(String, String)> = sqlx::query_as(statements(partition).get)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(decode).transpose()
    }

    async fn put(&self, partition: Partition, record: &Record) -> Result<()> {
        let body = encode(record)?;
        sqlx::query(statements(partition).upsert)
            .bind(&record.id)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_many(&self, partition: Partition, records: &[Record]) -> Result<()> {
        let sql = statements(partition);
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(sql.upsert)
                .bind(&record.id)
                .bind(encode(record)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn scan_all(&self, partition: Partition) -> Result<Vec<Record>> {
        let rows: Vec<(String, String)> = sqlx::query_as(statements(partition).scan)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(decode).collect()
    }

    async fn replace_all(&self, partition: Partition, records: &[Record]) -> Result<()> {
        let sql = statements(partition);
        let mut tx = self.pool.begin().await?;
        sqlx::query(sql.clear).execute(&mut *tx).await?;
        for record in records {
            sqlx::query(sql.upsert)
                .bind(&record.id)
                .bind(encode(record)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, partition: Partition) -> Result<()> {
        sqlx::query(statements(partition).clear)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
