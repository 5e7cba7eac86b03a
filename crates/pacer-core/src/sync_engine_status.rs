use crate::sync_engine::{ProgressNotification, SyncProgressReporter, SyncStep};
use crate::sync_engine_types::RunContext;
use tracing::debug;

pub(crate) fn emit_progress(
    progress: Option<&SyncProgressReporter<'_>>,
    context: &RunContext,
    step: SyncStep,
) {
    emit_progress_value(progress, context, step, context.group.progress());
}

pub(crate) fn emit_progress_value(
    progress: Option<&SyncProgressReporter<'_>>,
    context: &RunContext,
    step: SyncStep,
    value: f64,
) {
    debug!(
        run_id = %context.run_id,
        step = %step,
        page_group = %context.group.id,
        progress = value,
        saved = context.saved_activities,
        total = context.total_activities,
        "sync progress"
    );
    if let Some(progress) = progress {
        progress(ProgressNotification {
            step,
            progress: value,
            page_group_id: context.group.id.clone(),
            total_activities: context.total_activities,
            saved_activities_count: context.saved_activities,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_engine::SyncMode;
    use std::sync::Mutex;

    #[test]
    fn emits_running_totals() {
        let seen = Mutex::new(Vec::new());
        let reporter = |notification: ProgressNotification| seen.lock().unwrap().push(notification);
        let mut context = RunContext::new(SyncMode::Full, 2, 1);
        context.group.size = 2;
        context.group.completed = 1;
        emit_progress(Some(&reporter), &context, SyncStep::Saving);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].progress, 50.0);
        assert_eq!(seen[0].saved_activities_count, 2);
        assert_eq!(seen[0].page_group_id, "1");
    }
}
