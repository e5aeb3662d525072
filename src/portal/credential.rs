use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;

use super::api::PortalApi;

/// Bearer token shared between API calls and the refresh task
///
/// Readers clone the inner `Arc` so no lock is held across a request; a
/// refresh swaps in a new `Arc` without waiting for in-flight requests.
#[derive(Debug, Default)]
pub struct CredentialHolder {
    token: RwLock<Arc<String>>,
}

impl CredentialHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bearer token; empty until the first authentication
    pub async fn current(&self) -> Arc<String> {
        self.token.read().await.clone()
    }

    pub async fn replace(&self, token: String) {
        let mut guard = self.token.write().await;
        *guard = Arc::new(token);
    }

    pub async fn is_set(&self) -> bool {
        !self.token.read().await.is_empty()
    }
}

/// Periodic re-authentication running for the lifetime of a session
///
/// Stop it with [`RefreshTask::shutdown`]; dropping the handle aborts the task.
pub struct RefreshTask {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    /// Spawn the refresh loop; the first refresh happens one `period` from now
    pub fn spawn(api: Arc<dyn PortalApi>, access_token: String, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(interval = ?interval.period(), "token refresh interval");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!("token refresh stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        tracing::debug!("refreshing credentials");
                        match api.authenticate(&access_token).await {
                            Ok(()) => tracing::info!("token refreshed"),
                            Err(e) => tracing::warn!("Error refreshing token: {:#}", e),
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
