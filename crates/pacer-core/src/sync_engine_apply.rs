use crate::errors::ActivityError;
use crate::model::ActivityInfo;
use crate::sync_engine::{SyncProgressReporter, SyncStep};
use crate::sync_engine_status::emit_progress;
use crate::sync_engine_types::RunContext;
use tracing::{debug, info, warn};

pub(crate) fn apply_success_outcome(
    progress: Option<&SyncProgressReporter<'_>>,
    context: &mut RunContext,
    activity: &ActivityInfo,
) {
    info!(
        run_id = %context.run_id,
        activity_id = %activity.id,
        activity_type = %activity.activity_type,
        "activity synced"
    );
    context.saved_activities += 1;
    context.newly_saved += 1;
    complete_activity(progress, context, SyncStep::Saving);
}

pub(crate) fn apply_failed_outcome(
    progress: Option<&SyncProgressReporter<'_>>,
    context: &mut RunContext,
    activity: &ActivityInfo,
    step: SyncStep,
    error: ActivityError,
) {
    warn!(
        run_id = %context.run_id,
        activity_id = %activity.id,
        step = %step,
        error = %error,
        "activity sync failed"
    );
    context.errors.push(error);
    context.record_failure_at(activity.start_time);
    complete_activity(progress, context, step);
}

pub(crate) fn apply_cached_outcome(
    progress: Option<&SyncProgressReporter<'_>>,
    context: &mut RunContext,
    activity: &ActivityInfo,
) {
    debug!(
        run_id = %context.run_id,
        activity_id = %activity.id,
        "activity already cached; skipping"
    );
    context.skipped_cached += 1;
    complete_activity(progress, context, SyncStep::Saving);
}

fn complete_activity(
    progress: Option<&SyncProgressReporter<'_>>,
    context: &mut RunContext,
    step: SyncStep,
) {
    context.processed_activities += 1;
    context.group.completed += 1;
    emit_progress(progress, context, step);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActivityType;
    use crate::sync_engine::{ProgressNotification, SyncMode};
    use std::sync::Mutex;
    use time::macros::datetime;

    fn activity() -> ActivityInfo {
        ActivityInfo {
            id: "activity-1".into(),
            name: "Morning ride".into(),
            activity_type: ActivityType::Ride,
            start_time: datetime!(2024-04-01 06:00 UTC),
            is_owner: true,
            is_trainer: false,
            supports_gap: false,
        }
    }

    fn context() -> RunContext {
        let mut context = RunContext::new(SyncMode::Full, 0, 1);
        context.total_activities = 2;
        context.group.size = 2;
        context
    }

    #[test]
    fn apply_success_counts_saved_and_emits_saving() {
        let seen = Mutex::new(Vec::<ProgressNotification>::new());
        let reporter = |notification: ProgressNotification| seen.lock().unwrap().push(notification);
        let mut context = context();

        apply_success_outcome(Some(&reporter), &mut context, &activity());

        assert_eq!(context.saved_activities, 1);
        assert_eq!(context.newly_saved, 1);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen[0].step, SyncStep::Saving);
        assert_eq!(seen[0].progress, 50.0);
        assert_eq!(seen[0].saved_activities_count, 1);
    }

    #[test]
    fn apply_failure_records_error_without_saving() {
        let mut context = context();

        apply_failed_outcome(
            None,
            &mut context,
            &activity(),
            SyncStep::Fetching,
            ActivityError::new("activity-1", "timeout", None),
        );

        assert_eq!(context.saved_activities, 0);
        assert_eq!(context.errors.len(), 1);
        assert_eq!(context.earliest_failure, Some(activity().start_time));
        assert_eq!(context.group.completed, 1);
    }

    #[test]
    fn apply_cached_advances_progress_only() {
        let mut context = context();
        apply_cached_outcome(None, &mut context, &activity());
        assert_eq!(context.saved_activities, 0);
        assert_eq!(context.skipped_cached, 1);
        assert_eq!(context.group.progress(), 50.0);
    }
}
