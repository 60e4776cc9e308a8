//! Snapshot handler - serves the full collection.

use crate::db;
use crate::error::Result;
use fieldsync_engine::remote::wire::SnapshotResponse;
use fieldsync_engine::Record;
use sqlx::PgPool;

/// Load every stored record.
pub async fn load_snapshot(pool: &PgPool) -> Result<Vec<Record>> {
    let stored = db::fetch_all(pool).await?;
    let mut records = Vec::with_capacity(stored.len());
    for row in &stored {
        records.push(row.to_record()?);
    }
    Ok(records)
}

/// Process a snapshot request from a client.
pub async fn handle_snapshot(pool: &PgPool) -> Result<SnapshotResponse> {
    let records = load_snapshot(pool).await?;
    tracing::debug!(records = records.len(), "Serving snapshot");
    Ok(SnapshotResponse { records })
}
