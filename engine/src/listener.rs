//! Change-notification listener.
//!
//! While connected the listener keeps one subscription open. When the
//! stream ends (socket dropped, server restarted) it resubscribes with
//! exponential backoff until the handle is stopped.

use crate::reconcile::Reconciler;
use crate::remote::{ChangeStream, RemoteStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const RESUBSCRIBE_MIN: Duration = Duration::from_millis(50);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);

/// Handle to a running listener. Stopping or dropping it ends the
/// subscription.
#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop listening and release the remote subscription.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Feed every snapshot into Mirror and the view, starting from `initial`
/// and resubscribing through `remote` whenever the stream ends.
pub fn spawn(
    reconciler: Arc<Reconciler>,
    remote: Arc<dyn RemoteStore>,
    initial: Option<ChangeStream>,
) -> ListenerHandle {
    let task = tokio::spawn(async move {
        tracing::debug!("change listener started");
        let mut stream = initial;
        let mut backoff = RESUBSCRIBE_MIN;

        loop {
            if let Some(mut changes) = stream.take() {
                while let Some(records) = changes.recv().await {
                    backoff = RESUBSCRIBE_MIN;
                    if let Err(e) = reconciler.apply_remote_snapshot(&records).await {
                        tracing::error!(error = %e, "failed to apply remote snapshot");
                    }
                }
                tracing::debug!("change stream ended");
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(RESUBSCRIBE_MAX);

            match remote.subscribe().await {
                Ok(changes) => {
                    tracing::debug!("resubscribed to remote changes");
                    stream = Some(changes);
                }
                Err(e) => {
                    tracing::debug!(error = %e, retry_in = ?backoff, "resubscribe failed");
                }
            }
        }
    });
    ListenerHandle { task }
}
