use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const SYNC_STATE_VERSION: u32 = 1;

/// Bookkeeping of the last completed run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub version: u32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub total_activities: usize,
    #[serde(default)]
    pub saved_activities: usize,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: SYNC_STATE_VERSION,
            last_sync_at: None,
            total_activities: 0,
            saved_activities: 0,
        }
    }
}

impl SyncState {
    pub fn record_completed(&mut self, now: OffsetDateTime, total: usize, saved: usize) {
        self.last_sync_at = Some(now);
        self.total_activities = total;
        self.saved_activities = saved;
    }
}
