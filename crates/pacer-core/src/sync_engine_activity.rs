use crate::athlete::apply_author_overrides;
use crate::cache::SyncCacheEntry;
use crate::compute_worker::{ComputeError, ComputeTask};
use crate::errors::{ActivityError, FatalCause};
use crate::model::{ActivityInfo, AnalysisData, AthleteModel, FetchedActivity};
use crate::storage::StorageError;
use crate::sync_engine::{SyncOrchestrator, SyncProgressReporter, SyncStep};
use crate::sync_engine_retry::with_retry;
use crate::sync_engine_status::emit_progress;
use crate::sync_engine_types::{ActivityOutcome, RunContext};
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Fetches, computes and persists one activity.
///
/// Failures confined to the activity come back as [`ActivityOutcome::Failed`];
/// an `Err` means the whole run has to stop.
pub(crate) async fn process_activity(
    orchestrator: &SyncOrchestrator,
    progress: Option<&SyncProgressReporter<'_>>,
    context: &mut RunContext,
    activity: &ActivityInfo,
) -> Result<ActivityOutcome, FatalCause> {
    emit_progress(progress, context, SyncStep::Fetching);
    let fetched = match fetch_activity(orchestrator, activity).await {
        Ok(fetched) => fetched,
        Err(err) if err.is_fatal() => return Err(FatalCause::Source(err)),
        Err(err) => {
            return Ok(ActivityOutcome::Failed {
                step: SyncStep::Fetching,
                error: ActivityError::from_source(&activity.id, &err),
            });
        }
    };

    let athlete_model = resolve_athlete_model(orchestrator, activity, &fetched);

    emit_progress(progress, context, SyncStep::Computing);
    let analysis = match compute_activity(orchestrator, activity, &athlete_model, fetched).await {
        Ok(analysis) => {
            context.consecutive_spawn_failures = 0;
            analysis
        }
        Err(err) => {
            if let Some(fatal) =
                register_compute_failure(context, &err, orchestrator.options.worker_spawn_failure_limit)
            {
                return Err(fatal);
            }
            return Ok(ActivityOutcome::Failed {
                step: SyncStep::Computing,
                error: ActivityError::from_compute(&activity.id, &err),
            });
        }
    };

    let entry = SyncCacheEntry {
        activity: activity.clone(),
        athlete_model,
        analysis,
        computed_at: OffsetDateTime::now_utc(),
    };
    check_run_claim(orchestrator, context).await?;
    match persist_entry(orchestrator, &entry).await {
        Ok(()) => Ok(ActivityOutcome::Saved),
        Err(err) if err.is_retryable() => Ok(ActivityOutcome::Failed {
            step: SyncStep::Saving,
            error: ActivityError::from_storage(&activity.id, &err),
        }),
        Err(err) => Err(FatalCause::Storage(err)),
    }
}

async fn fetch_activity(
    orchestrator: &SyncOrchestrator,
    activity: &ActivityInfo,
) -> Result<FetchedActivity, crate::source::SourceError> {
    with_retry(&orchestrator.options.retry, "fetch_activity", || {
        orchestrator.source.fetch_activity(activity)
    })
    .await
}

pub(crate) fn resolve_athlete_model(
    orchestrator: &SyncOrchestrator,
    activity: &ActivityInfo,
    fetched: &FetchedActivity,
) -> AthleteModel {
    let mut model = orchestrator.resolver.resolve(activity.start_time.date());
    if !activity.is_owner {
        apply_author_overrides(&mut model, &fetched.source);
        debug!(
            activity_id = %activity.id,
            weight = model.settings.weight,
            gender = %model.gender,
            "applied author profile overrides"
        );
    }
    model
}

async fn compute_activity(
    orchestrator: &SyncOrchestrator,
    activity: &ActivityInfo,
    athlete_model: &AthleteModel,
    fetched: FetchedActivity,
) -> Result<AnalysisData, ComputeError> {
    let task = ComputeTask {
        activity_id: activity.id.clone(),
        activity_type: activity.activity_type.clone(),
        is_trainer: activity.is_trainer,
        is_owner: activity.is_owner,
        supports_gap: activity.supports_gap,
        has_power_meter: fetched.source.has_power_meter,
        athlete_model: athlete_model.clone(),
        source_data: fetched.source,
        streams: fetched.streams,
        options: orchestrator.options.compute.clone(),
    };
    orchestrator.worker.compute(task).await
}

/// Tracks worker spawn failures; returns the fatal cause once the limit is hit.
pub(crate) fn register_compute_failure(
    context: &mut RunContext,
    err: &ComputeError,
    limit: u32,
) -> Option<FatalCause> {
    if !err.is_spawn_failure() {
        context.consecutive_spawn_failures = 0;
        return None;
    }
    context.consecutive_spawn_failures += 1;
    warn!(
        run_id = %context.run_id,
        consecutive = context.consecutive_spawn_failures,
        limit,
        error = %err,
        "compute worker spawn failed"
    );
    (context.consecutive_spawn_failures >= limit.max(1)).then_some(FatalCause::WorkerExhausted {
        consecutive: context.consecutive_spawn_failures,
    })
}

/// Fails with [`FatalCause::Superseded`] once the store no longer carries this
/// run's claim, so nothing is written over a clear.
pub(crate) async fn check_run_claim(
    orchestrator: &SyncOrchestrator,
    context: &RunContext,
) -> Result<(), FatalCause> {
    match orchestrator.cache.holds_run(context.run_id).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(run_id = %context.run_id, "run claim lost; store was cleared or taken over");
            Err(FatalCause::Superseded)
        }
        Err(err) => Err(FatalCause::Storage(err)),
    }
}

/// Writes the entry, retrying a single-key conflict once.
async fn persist_entry(
    orchestrator: &SyncOrchestrator,
    entry: &SyncCacheEntry,
) -> Result<(), StorageError> {
    match orchestrator.cache.put(&entry.activity.id, entry).await {
        Err(err) if err.is_retryable() => {
            warn!(activity_id = %entry.activity.id, error = %err, "storage conflict; retrying once");
            orchestrator.cache.put(&entry.activity.id, entry).await
        }
        other => other,
    }
}
