use crate::model::ActivityInfo;
use crate::source::{ActivityPage, ActivityQuery, SourceError};
use crate::sync_engine::{SyncMode, SyncOrchestrator};
use crate::sync_engine_retry::with_retry;
use std::collections::HashSet;
use tracing::debug;

pub(crate) const FIRST_PAGE: u32 = 1;

pub(crate) async fn list_page(
    orchestrator: &SyncOrchestrator,
    mode: &SyncMode,
    page: u32,
) -> Result<ActivityPage, SourceError> {
    let query = ActivityQuery {
        after: mode.since(),
        page,
        per_page: orchestrator.options.page_size.max(1),
    };
    let listed = with_retry(&orchestrator.options.retry, "list_activities", || {
        orchestrator.source.list_activities(query.clone())
    })
    .await?;
    debug!(
        source = orchestrator.source.name(),
        page,
        count = listed.activities.len(),
        next_page = ?listed.next_page,
        "listed activity page"
    );
    Ok(listed)
}

/// Keeps the activities this run must handle, in listing order.
pub(crate) fn select_candidates(
    activities: Vec<ActivityInfo>,
    mode: &SyncMode,
    seen: &mut HashSet<String>,
) -> Vec<ActivityInfo> {
    let since = mode.since();
    activities
        .into_iter()
        .filter(|activity| since.is_none_or(|since| activity.start_time > since))
        .filter(|activity| seen.insert(activity.id.clone()))
        .collect()
}

/// Next page to request, refusing to walk backwards.
pub(crate) fn following_page(current: u32, listed: &ActivityPage) -> Option<u32> {
    listed.next_page.filter(|next| *next > current)
}
