//! HTTP + WebSocket client for the sync server.

use super::wire::{ClientMessage, ServerMessage, SnapshotResponse};
use super::{ChangeStream, CommitReceipt, RemoteStore, WriteBatch};
use crate::{Error, Record, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// [`RemoteStore`] talking to a `fieldsync-server` instance.
///
/// Transport failures surface as [`Error::Connectivity`]; any non-success
/// response as [`Error::RemoteRejection`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "remote url must be http(s): {base_url}"
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn socket_url(&self) -> String {
        let ws = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws}/ws")
    }
}

fn transport(err: reqwest::Error) -> Error {
    Error::Connectivity(err.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::RemoteRejection(format!("{status}: {body}")))
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let response = self
            .client
            .get(self.url("/records"))
            .send()
            .await
            .map_err(transport)?;
        let snapshot: SnapshotResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::RemoteRejection(format!("malformed snapshot: {e}")))?;
        Ok(snapshot.records)
    }

    async fn commit_batch(&self, batch: &WriteBatch) -> Result<CommitReceipt> {
        let response = self
            .client
            .post(self.url("/batch"))
            .json(batch)
            .send()
            .await
            .map_err(transport)?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::RemoteRejection(format!("malformed commit receipt: {e}")))
    }

    async fn subscribe(&self) -> Result<ChangeStream> {
        let url = self.socket_url();
        let (socket, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::Connectivity(format!("timed out connecting to {url}")))?
            .map_err(|e| Error::Connectivity(e.to_string()))?;

        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel::<Vec<Record>>();

        tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            keepalive.tick().await;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = keepalive.tick() => {
                        let ping = match serde_json::to_string(&ClientMessage::Ping) {
                            Ok(text) => text,
                            Err(_) => continue,
                        };
                        if ws_sender.send(Message::Text(ping)).await.is_err() {
                            break;
                        }
                    }
                    frame = ws_receiver.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(ServerMessage::Snapshot { records }) => {
                                    if tx.send(records).is_err() {
                                        break;
                                    }
                                }
                                Ok(ServerMessage::Pong) => {}
                                Ok(ServerMessage::Error { message }) => {
                                    tracing::warn!(%message, "change socket reported error");
                                }
                                Err(e) => {
                                    tracing::warn!("unreadable change notification: {}", e);
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!("change socket failed: {}", e);
                            break;
                        }
                    },
                }
            }

            let _ = ws_sender.close().await;
            tracing::debug!("change socket closed");
        });

        Ok(rx)
    }
}
