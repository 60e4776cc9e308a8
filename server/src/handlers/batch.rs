//! Batch handler - applies a replica's pending writes atomically.

use crate::db;
use crate::error::{AppError, Result};
use crate::websocket::{ConnectionManager, ServerMessage};
use fieldsync_engine::{CommitReceipt, WriteBatch};
use sqlx::PgPool;

use super::load_snapshot;

/// Reject batches the database would store under an unusable id.
pub fn validate_batch(batch: &WriteBatch) -> Result<()> {
    if let Some(update) = batch.updates.iter().find(|u| u.id.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "update has an empty id (fields: {})",
            update.fields.len()
        )));
    }
    if let Some(create) = batch.creates.iter().find(|c| c.id.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "create has an empty provisional id (fields: {})",
            create.fields.len()
        )));
    }
    Ok(())
}

/// Commit a batch, then push the new snapshot to every connected replica.
pub async fn handle_commit(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    batch: WriteBatch,
) -> Result<CommitReceipt> {
    validate_batch(&batch)?;

    let receipt = db::commit_batch(pool, &batch).await?;
    tracing::info!(
        creates = batch.creates.len(),
        updates = batch.updates.len(),
        "Committed batch"
    );

    // The commit stands even if the broadcast fails.
    match load_snapshot(pool).await {
        Ok(records) => {
            let sent = conn_manager.broadcast_all(ServerMessage::Snapshot { records });
            tracing::debug!(sent_to = sent, "Broadcast snapshot after commit");
        }
        Err(e) => tracing::warn!("Failed to broadcast snapshot: {}", e),
    }

    Ok(receipt)
}
