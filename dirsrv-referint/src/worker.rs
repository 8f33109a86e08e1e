//! The background update thread.
//!
//! A dedicated OS thread drives a current-thread tokio runtime. Each loop
//! iteration waits for the update interval, then runs one pass. A changed
//! interval restarts the wait without running a pass; cancellation ends the
//! loop. Passes receive the cancellation token so they can stop between
//! records.

use crate::error::{ReferintError, ReferintResult};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const WORKER_THREAD_NAME: &str = "Referential Integrity Background Update Thread";

/// Handle to the running background thread. Dropping it cancels the thread
/// without waiting for it.
#[derive(Debug)]
pub struct BackgroundWorker {
    cancel: CancellationToken,
    interval_tx: watch::Sender<Duration>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Starts the thread. `pass` runs once per elapsed interval.
    pub fn spawn<F>(interval: Duration, mut pass: F) -> ReferintResult<Self>
    where
        F: FnMut(&CancellationToken) + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ReferintError::Worker(e.to_string()))?;

        let cancel = CancellationToken::new();
        let (interval_tx, mut interval_rx) = watch::channel(interval);
        let token = cancel.clone();

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    info!(interval_secs = interval.as_secs(), "Background update thread started");
                    loop {
                        let interval = *interval_rx.borrow_and_update();
                        tokio::select! {
                            _ = token.cancelled() => break,
                            changed = interval_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                                debug!("Update interval changed, restarting wait");
                                continue;
                            }
                            _ = tokio::time::sleep(interval) => {}
                        }
                        pass(&token);
                    }
                    info!("Background update thread stopped");
                });
            })
            .map_err(|e| ReferintError::Worker(e.to_string()))?;

        Ok(Self {
            cancel,
            interval_tx,
            handle: Some(handle),
        })
    }

    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Changes the wait. The current wait is abandoned and restarted with
    /// the new interval.
    pub fn set_interval(&self, interval: Duration) {
        self.interval_tx.send_replace(interval);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the thread and waits for it to exit. A pass in progress
    /// stops at its next record boundary.
    pub fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Background update thread panicked");
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
