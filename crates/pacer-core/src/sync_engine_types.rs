use crate::errors::ActivityError;
use crate::sync_engine::{SyncMode, SyncStep};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Mutable counters of a single run, owned by that run only.
pub(crate) struct RunContext {
    pub(crate) run_id: Uuid,
    pub(crate) mode: SyncMode,
    pub(crate) total_activities: usize,
    pub(crate) saved_activities: usize,
    pub(crate) newly_saved: usize,
    pub(crate) skipped_cached: usize,
    pub(crate) processed_activities: usize,
    pub(crate) consecutive_spawn_failures: u32,
    pub(crate) errors: Vec<ActivityError>,
    /// Start time of the oldest activity that failed this run.
    pub(crate) earliest_failure: Option<OffsetDateTime>,
    pub(crate) group: PageGroup,
}

impl RunContext {
    pub(crate) fn new(mode: SyncMode, cached_activities: usize, first_page: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            total_activities: cached_activities,
            saved_activities: cached_activities,
            newly_saved: 0,
            skipped_cached: 0,
            processed_activities: 0,
            consecutive_spawn_failures: 0,
            errors: Vec::new(),
            earliest_failure: None,
            group: PageGroup::new(first_page, 0),
        }
    }

    pub(crate) fn record_failure_at(&mut self, start_time: OffsetDateTime) {
        self.earliest_failure = Some(match self.earliest_failure {
            Some(earliest) => earliest.min(start_time),
            None => start_time,
        });
    }

    /// Timestamp stored as the last sync: `now`, or just before the oldest
    /// failed activity so the next incremental run lists it again.
    pub(crate) fn completed_through(&self, now: OffsetDateTime) -> OffsetDateTime {
        match self.earliest_failure {
            Some(start) => (start - Duration::seconds(1)).min(now),
            None => now,
        }
    }
}

/// Activities discovered together on one listing page.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PageGroup {
    pub(crate) id: String,
    pub(crate) size: usize,
    pub(crate) completed: usize,
}

impl PageGroup {
    pub(crate) fn new(page: u32, size: usize) -> Self {
        Self {
            id: page.to_string(),
            size,
            completed: 0,
        }
    }

    pub(crate) fn progress(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        (self.completed.min(self.size) as f64 / self.size as f64) * 100.0
    }
}

pub(crate) enum ActivityOutcome {
    Saved,
    Failed { step: SyncStep, error: ActivityError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn group_progress_is_fraction_of_completed() {
        let mut group = PageGroup::new(2, 4);
        assert_eq!(group.id, "2");
        assert_eq!(group.progress(), 0.0);
        group.completed = 1;
        assert_eq!(group.progress(), 25.0);
        group.completed = 4;
        assert_eq!(group.progress(), 100.0);
    }

    #[test]
    fn completed_through_stops_before_oldest_failure() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let mut context = RunContext::new(SyncMode::Full, 0, 1);
        assert_eq!(context.completed_through(now), now);

        context.record_failure_at(datetime!(2024-05-10 08:00 UTC));
        context.record_failure_at(datetime!(2024-05-03 08:00 UTC));
        context.record_failure_at(datetime!(2024-05-20 08:00 UTC));
        assert_eq!(
            context.completed_through(now),
            datetime!(2024-05-03 07:59:59 UTC)
        );
    }

    #[test]
    fn run_starts_from_cached_counts() {
        let context = RunContext::new(SyncMode::Full, 5, 1);
        assert_eq!(context.total_activities, 5);
        assert_eq!(context.saved_activities, 5);
        assert_eq!(context.group.progress(), 0.0);
    }
}
