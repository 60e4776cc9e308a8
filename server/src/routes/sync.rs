//! Remote store routes.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use fieldsync_engine::remote::wire::SnapshotResponse;
use fieldsync_engine::{CommitReceipt, WriteBatch};

use crate::error::Result;
use crate::handlers::{handle_commit, handle_snapshot, handle_websocket_connection};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(snapshot_handler))
        .route("/batch", post(batch_handler))
        .route("/ws", get(ws_handler))
}

/// GET /records - Full snapshot.
async fn snapshot_handler(State(state): State<AppState>) -> Result<Json<SnapshotResponse>> {
    let response = handle_snapshot(&state.pool).await?;
    Ok(Json(response))
}

/// POST /batch - Atomic multi-record write.
async fn batch_handler(
    State(state): State<AppState>,
    Json(batch): Json<WriteBatch>,
) -> Result<Json<CommitReceipt>> {
    let receipt = handle_commit(&state.pool, &state.conn_manager, batch).await?;
    Ok(Json(receipt))
}

/// GET /ws - Change notifications.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| {
        handle_websocket_connection(socket, state.pool.clone(), state.conn_manager.clone())
    })
}
