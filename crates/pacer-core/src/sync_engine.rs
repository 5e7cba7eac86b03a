use crate::analysis::StandardAnalyzer;
use crate::athlete::AthleteModelResolver;
use crate::cache::{CacheReader, SyncCache};
use crate::compute_worker::{ComputeOptions, ComputeWorkerBridge};
use crate::errors::{ActivityError, SyncError};
use crate::source::ActivitySource;
use crate::storage::{StorageError, StorageUsage};
use crate::sync_engine_orchestrator::run_sync_orchestrated;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub type SyncProgressReporter<'a> = dyn Fn(ProgressNotification) + Send + Sync + 'a;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStep {
    Discovering,
    Fetching,
    Computing,
    Saving,
    UpdatingSyncMetadata,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::Discovering => "discovering",
            SyncStep::Fetching => "fetching",
            SyncStep::Computing => "computing",
            SyncStep::Saving => "saving",
            SyncStep::UpdatingSyncMetadata => "updating-sync-metadata",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress event of a running sync, in the shape observers consume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    pub step: SyncStep,
    /// Completion of the current page group, 0 to 100.
    pub progress: f64,
    pub page_group_id: String,
    pub total_activities: usize,
    pub saved_activities_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental {
        #[serde(with = "time::serde::rfc3339")]
        since: OffsetDateTime,
    },
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental { .. } => "incremental",
        }
    }

    pub fn since(&self) -> Option<OffsetDateTime> {
        match self {
            SyncMode::Full => None,
            SyncMode::Incremental { since } => Some(*since),
        }
    }
}

/// Retry policy for transient remote failures. Zero retries skips immediately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << exp))
    }
}

#[derive(Clone, Debug)]
pub struct SyncOptions {
    pub page_size: u32,
    pub retry: RetryPolicy,
    pub worker_spawn_failure_limit: u32,
    pub compute: ComputeOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 30,
            retry: RetryPolicy::default(),
            worker_spawn_failure_limit: 3,
            compute: ComputeOptions::default(),
        }
    }
}

/// Outcome of a run that reached finalization.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub mode: SyncMode,
    pub total_activities: usize,
    pub saved_activities: usize,
    pub newly_saved: usize,
    pub skipped_cached: usize,
    pub errors: Vec<ActivityError>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_sync_at: OffsetDateTime,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives listing, fetching, computing and persisting of activities.
pub struct SyncOrchestrator {
    pub(crate) source: Arc<dyn ActivitySource>,
    pub(crate) cache: SyncCache,
    pub(crate) resolver: AthleteModelResolver,
    pub(crate) worker: ComputeWorkerBridge,
    pub(crate) options: SyncOptions,
    run_guard: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        cache: SyncCache,
        resolver: AthleteModelResolver,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            cache,
            resolver,
            worker: ComputeWorkerBridge::new(Arc::new(StandardAnalyzer::default())),
            options,
            run_guard: Mutex::new(()),
        }
    }

    pub fn with_worker(mut self, worker: ComputeWorkerBridge) -> Self {
        self.worker = worker;
        self
    }

    /// Read-only view of the results. Clearing and forgetting go through
    /// [`Self::clear_sync_cache`] and [`Self::forget_activity`].
    pub fn cache(&self) -> CacheReader<'_> {
        CacheReader::new(&self.cache)
    }

    /// Runs one synchronization pass. Only one pass may run at a time.
    pub async fn sync(
        &self,
        progress: Option<&SyncProgressReporter<'_>>,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.run_guard.try_lock().map_err(|_| SyncError::RunInProgress)?;
        run_sync_orchestrated(self, progress).await
    }

    /// Erases every cached result and the sync state, forcing a full resync.
    pub async fn clear_sync_cache(&self) -> Result<(), SyncError> {
        let _guard = self.run_guard.try_lock().map_err(|_| SyncError::RunInProgress)?;
        self.cache.clear().await.map_err(storage_abort)?;
        info!(source = self.source.name(), "sync cache cleared");
        Ok(())
    }

    /// Clears the cache then runs a full pass.
    pub async fn force_sync(
        &self,
        progress: Option<&SyncProgressReporter<'_>>,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.run_guard.try_lock().map_err(|_| SyncError::RunInProgress)?;
        self.cache.clear().await.map_err(storage_abort)?;
        info!(source = self.source.name(), "sync cache cleared before forced sync");
        run_sync_orchestrated(self, progress).await
    }

    /// Drops one activity's result so the next pass computes it again.
    ///
    /// The last sync timestamp is reset as well: the next pass lists the full
    /// history, skipping every activity that is still cached. A run writing to
    /// the same store from elsewhere loses its claim and aborts.
    pub async fn forget_activity(&self, activity_id: &str) -> Result<(), SyncError> {
        let _guard = self.run_guard.try_lock().map_err(|_| SyncError::RunInProgress)?;
        self.cache.release_run().await.map_err(storage_abort)?;
        self.cache.remove(activity_id).await.map_err(storage_abort)?;
        if let Some(mut state) = self.cache.load_state().await.map_err(storage_abort)? {
            state.last_sync_at = None;
            self.cache.save_state(&state).await.map_err(storage_abort)?;
        }
        info!(activity_id, "activity forgotten; next sync lists full history");
        Ok(())
    }

    pub async fn usage(&self) -> Result<StorageUsage, StorageError> {
        self.cache.usage().await
    }
}

fn storage_abort(err: StorageError) -> SyncError {
    SyncError::Aborted {
        cause: crate::errors::FatalCause::Storage(err),
        errors: Vec::new(),
    }
}
