use crate::cache::SyncState;
use crate::errors::{FatalCause, SyncError};
use crate::model::ActivityInfo;
use crate::sync_engine::{SyncMode, SyncOrchestrator, SyncProgressReporter, SyncReport, SyncStep};
use crate::sync_engine_activity::{check_run_claim, process_activity};
use crate::sync_engine_apply::{apply_cached_outcome, apply_failed_outcome, apply_success_outcome};
use crate::sync_engine_discovery::{FIRST_PAGE, following_page, list_page, select_candidates};
use crate::sync_engine_status::{emit_progress, emit_progress_value};
use crate::sync_engine_types::{ActivityOutcome, PageGroup, RunContext};
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::{info, warn};

pub(crate) async fn run_sync_orchestrated(
    orchestrator: &SyncOrchestrator,
    progress: Option<&SyncProgressReporter<'_>>,
) -> Result<SyncReport, SyncError> {
    let mut context = load_run_state(orchestrator).await?;

    info!(
        run_id = %context.run_id,
        source = orchestrator.source.name(),
        mode = context.mode.as_str(),
        cached = context.saved_activities,
        "starting sync"
    );
    emit_progress_value(progress, &context, SyncStep::Discovering, 0.0);

    if let Err(err) = orchestrator.source.validate_auth().await {
        return Err(abort(&mut context, FatalCause::Source(err)));
    }

    execute_pages_phase(orchestrator, progress, &mut context).await?;
    finalize_sync_phase(orchestrator, progress, context).await
}

async fn load_run_state(orchestrator: &SyncOrchestrator) -> Result<RunContext, SyncError> {
    let storage_abort = |err| SyncError::Aborted {
        cause: FatalCause::Storage(err),
        errors: Vec::new(),
    };
    let state = orchestrator.cache.load_state().await.map_err(storage_abort)?;
    let cached = orchestrator.cache.len().await.map_err(storage_abort)?;
    let mode = match state.and_then(|state| state.last_sync_at) {
        Some(since) => SyncMode::Incremental { since },
        None => SyncMode::Full,
    };
    let context = RunContext::new(mode, cached, FIRST_PAGE);
    orchestrator
        .cache
        .claim_run(context.run_id)
        .await
        .map_err(storage_abort)?;
    Ok(context)
}

async fn execute_pages_phase(
    orchestrator: &SyncOrchestrator,
    progress: Option<&SyncProgressReporter<'_>>,
    context: &mut RunContext,
) -> Result<(), SyncError> {
    let mut seen = HashSet::new();
    let mut page = Some(FIRST_PAGE);
    while let Some(current) = page {
        let listed = match list_page(orchestrator, &context.mode, current).await {
            Ok(listed) => listed,
            Err(err) => return Err(abort(context, FatalCause::Source(err))),
        };
        page = following_page(current, &listed);
        let candidates = select_candidates(listed.activities, &context.mode, &mut seen);
        if candidates.is_empty() {
            continue;
        }
        let group = prepare_group(orchestrator, context, current, candidates).await?;
        execute_group(orchestrator, progress, context, group).await?;
    }
    Ok(())
}

/// Splits a page into cached and pending activities and grows the run total.
async fn prepare_group(
    orchestrator: &SyncOrchestrator,
    context: &mut RunContext,
    page: u32,
    candidates: Vec<ActivityInfo>,
) -> Result<Vec<(ActivityInfo, bool)>, SyncError> {
    context.group = PageGroup::new(page, candidates.len());
    let mut group = Vec::with_capacity(candidates.len());
    for activity in candidates {
        let cached = match orchestrator.cache.has(&activity.id).await {
            Ok(cached) => cached,
            Err(err) => return Err(abort(context, FatalCause::Storage(err))),
        };
        if !cached {
            context.total_activities += 1;
        }
        group.push((activity, cached));
    }
    Ok(group)
}

async fn execute_group(
    orchestrator: &SyncOrchestrator,
    progress: Option<&SyncProgressReporter<'_>>,
    context: &mut RunContext,
    group: Vec<(ActivityInfo, bool)>,
) -> Result<(), SyncError> {
    for (activity, cached) in group {
        if cached {
            apply_cached_outcome(progress, context, &activity);
            continue;
        }
        match process_activity(orchestrator, progress, context, &activity).await {
            Ok(ActivityOutcome::Saved) => apply_success_outcome(progress, context, &activity),
            Ok(ActivityOutcome::Failed { step, error }) => {
                apply_failed_outcome(progress, context, &activity, step, error)
            }
            Err(cause) => return Err(abort(context, cause)),
        }
    }
    Ok(())
}

async fn finalize_sync_phase(
    orchestrator: &SyncOrchestrator,
    progress: Option<&SyncProgressReporter<'_>>,
    mut context: RunContext,
) -> Result<SyncReport, SyncError> {
    if context.processed_activities > 0 {
        emit_progress(progress, &context, SyncStep::UpdatingSyncMetadata);
    }
    if let Err(cause) = check_run_claim(orchestrator, &context).await {
        return Err(abort(&mut context, cause));
    }
    let last_sync_at = context.completed_through(OffsetDateTime::now_utc());
    let mut state = SyncState::default();
    state.record_completed(last_sync_at, context.total_activities, context.saved_activities);
    if let Err(err) = orchestrator.cache.save_state(&state).await {
        return Err(abort(&mut context, FatalCause::Storage(err)));
    }
    if let Err(err) = orchestrator.cache.release_run().await {
        warn!(run_id = %context.run_id, error = %err, "failed to release run claim");
    }

    info!(
        run_id = %context.run_id,
        mode = context.mode.as_str(),
        total = context.total_activities,
        saved = context.saved_activities,
        newly_saved = context.newly_saved,
        skipped = context.skipped_cached,
        failed = context.errors.len(),
        last_sync_at = %last_sync_at,
        "sync completed"
    );
    Ok(SyncReport {
        run_id: context.run_id,
        mode: context.mode,
        total_activities: context.total_activities,
        saved_activities: context.saved_activities,
        newly_saved: context.newly_saved,
        skipped_cached: context.skipped_cached,
        errors: context.errors,
        last_sync_at,
    })
}

fn abort(context: &mut RunContext, cause: FatalCause) -> SyncError {
    warn!(
        run_id = %context.run_id,
        cause = %cause,
        kind = cause.kind(),
        saved = context.saved_activities,
        failed = context.errors.len(),
        "sync aborted"
    );
    SyncError::Aborted {
        cause,
        errors: std::mem::take(&mut context.errors),
    }
}
