use crate::errors::SyncError;
use crate::sync_engine::{ProgressNotification, SyncOrchestrator, SyncReport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A sync running in the background: progress stream, final result and cancellation.
pub struct SyncTask {
    progress: mpsc::UnboundedReceiver<ProgressNotification>,
    handle: JoinHandle<Result<SyncReport, SyncError>>,
}

impl SyncOrchestrator {
    /// Spawns a run on the current tokio runtime.
    pub fn start(self: Arc<Self>) -> SyncTask {
        self.spawn_run(false)
    }

    /// Spawns a run that clears the cache first.
    pub fn start_forced(self: Arc<Self>) -> SyncTask {
        self.spawn_run(true)
    }

    fn spawn_run(self: Arc<Self>, force: bool) -> SyncTask {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let reporter = move |notification: ProgressNotification| {
                let _ = tx.send(notification);
            };
            if force {
                self.force_sync(Some(&reporter)).await
            } else {
                self.sync(Some(&reporter)).await
            }
        });
        SyncTask {
            progress: rx,
            handle,
        }
    }
}

impl SyncTask {
    /// Next progress event; `None` once the run has ended and all events were read.
    pub async fn next_progress(&mut self) -> Option<ProgressNotification> {
        self.progress.recv().await
    }

    pub async fn join(self) -> Result<SyncReport, SyncError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => {
                Err(SyncError::Interrupted("sync task was aborted".to_string()))
            }
            Err(err) => Err(SyncError::Interrupted(err.to_string())),
        }
    }

    /// Abandons the run. Sync state is left as it was before the run.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
