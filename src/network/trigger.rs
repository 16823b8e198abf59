//! Debounced upload trigger
//!
//! Storage changes arrive in bursts. Each burst collapses into a single
//! upload run fired one quiet period after its first signal. At most one
//! further run is held back while a run is pending or in progress.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Cheap handle signalling that local storage changed
#[derive(Clone)]
pub struct UploadTrigger {
    tx: mpsc::Sender<()>,
}

impl UploadTrigger {
    /// Start the debounce loop; it ends once every handle is dropped
    pub fn spawn<F, Fut>(quiet_period: Duration, mut run: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(quiet_period).await;
                while rx.try_recv().is_ok() {}
                debug!("Upload run firing");
                run().await;
            }
        });

        (Self { tx }, handle)
    }

    /// Signal a storage change
    ///
    /// Never blocks; a signal arriving while one is already pending is
    /// absorbed by it.
    pub fn trigger(&self) {
        let _ = self.tx.try_send(());
    }
}
