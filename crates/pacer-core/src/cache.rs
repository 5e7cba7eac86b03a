use crate::model::{ActivityInfo, AnalysisData, AthleteModel};
use crate::storage::{StorageEngine, StorageError, StorageUsage};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

mod state;

pub use state::{SYNC_STATE_VERSION, SyncState};

const ACTIVITY_PREFIX: &str = "activity:";
const SYNC_STATE_KEY: &str = "sync_state";
const RUN_CLAIM_KEY: &str = "sync_run";

/// Result of one successful compute, with the profile it was computed against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncCacheEntry {
    pub activity: ActivityInfo,
    pub athlete_model: AthleteModel,
    pub analysis: AnalysisData,
    #[serde(with = "time::serde::rfc3339")]
    pub computed_at: OffsetDateTime,
}

/// Computed results keyed by activity id, plus the singleton sync state.
#[derive(Clone)]
pub struct SyncCache {
    store: Arc<dyn StorageEngine>,
}

impl SyncCache {
    pub fn new(store: Arc<dyn StorageEngine>) -> Self {
        Self { store }
    }

    pub async fn has(&self, activity_id: &str) -> Result<bool, StorageError> {
        Ok(self.store.get(&activity_key(activity_id)).await?.is_some())
    }

    pub async fn get(&self, activity_id: &str) -> Result<Option<SyncCacheEntry>, StorageError> {
        let key = activity_key(activity_id);
        self.read(&key).await
    }

    pub async fn get_many(
        &self,
        activity_ids: &[String],
    ) -> Result<HashMap<String, SyncCacheEntry>, StorageError> {
        let mut found = HashMap::new();
        for activity_id in activity_ids {
            if let Some(entry) = self.get(activity_id).await? {
                found.insert(activity_id.clone(), entry);
            }
        }
        Ok(found)
    }

    pub async fn put(&self, activity_id: &str, entry: &SyncCacheEntry) -> Result<(), StorageError> {
        let key = activity_key(activity_id);
        self.write(&key, entry).await
    }

    pub async fn put_many(&self, entries: &[SyncCacheEntry]) -> Result<(), StorageError> {
        for entry in entries {
            self.put(&entry.activity.id, entry).await?;
        }
        Ok(())
    }

    /// Drops one activity so the next sync computes it again.
    pub async fn remove(&self, activity_id: &str) -> Result<(), StorageError> {
        self.store.delete(&activity_key(activity_id)).await
    }

    pub async fn activity_ids(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .store
            .keys(ACTIVITY_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(ACTIVITY_PREFIX).map(ToString::to_string))
            .collect())
    }

    pub async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.store.keys(ACTIVITY_PREFIX).await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }

    /// Erases every entry and the sync state.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.clear().await
    }

    pub async fn usage(&self) -> Result<StorageUsage, StorageError> {
        self.store.usage().await
    }

    pub async fn load_state(&self) -> Result<Option<SyncState>, StorageError> {
        let state: Option<SyncState> = self.read(SYNC_STATE_KEY).await?;
        match state {
            Some(state) if state.version != SYNC_STATE_VERSION => {
                Err(StorageError::Unavailable(format!(
                    "unsupported sync state version {}",
                    state.version
                )))
            }
            other => Ok(other),
        }
    }

    pub async fn save_state(&self, state: &SyncState) -> Result<(), StorageError> {
        self.write(SYNC_STATE_KEY, state).await
    }

    /// Marks the store as written by `run_id`. A clear, a forget or a later
    /// claim drops the mark.
    pub(crate) async fn claim_run(&self, run_id: Uuid) -> Result<(), StorageError> {
        self.write(RUN_CLAIM_KEY, &run_id).await
    }

    pub(crate) async fn holds_run(&self, run_id: Uuid) -> Result<bool, StorageError> {
        let claimed: Option<Uuid> = self.read(RUN_CLAIM_KEY).await?;
        Ok(claimed == Some(run_id))
    }

    pub(crate) async fn release_run(&self) -> Result<(), StorageError> {
        self.store.delete(RUN_CLAIM_KEY).await
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(data) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                key: key.to_string(),
                source,
            })
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let data = serde_json::to_vec(value).map_err(|source| StorageError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        self.store.put(key, data).await
    }
}

/// Read-only access to a [`SyncCache`] owned by an orchestrator.
#[derive(Clone, Copy)]
pub struct CacheReader<'a> {
    cache: &'a SyncCache,
}

impl<'a> CacheReader<'a> {
    pub fn new(cache: &'a SyncCache) -> Self {
        Self { cache }
    }

    pub async fn has(&self, activity_id: &str) -> Result<bool, StorageError> {
        self.cache.has(activity_id).await
    }

    pub async fn get(&self, activity_id: &str) -> Result<Option<SyncCacheEntry>, StorageError> {
        self.cache.get(activity_id).await
    }

    pub async fn get_many(
        &self,
        activity_ids: &[String],
    ) -> Result<HashMap<String, SyncCacheEntry>, StorageError> {
        self.cache.get_many(activity_ids).await
    }

    pub async fn activity_ids(&self) -> Result<Vec<String>, StorageError> {
        self.cache.activity_ids().await
    }

    pub async fn len(&self) -> Result<usize, StorageError> {
        self.cache.len().await
    }

    pub async fn is_empty(&self) -> Result<bool, StorageError> {
        self.cache.is_empty().await
    }

    pub async fn usage(&self) -> Result<StorageUsage, StorageError> {
        self.cache.usage().await
    }

    pub async fn load_state(&self) -> Result<Option<SyncState>, StorageError> {
        self.cache.load_state().await
    }
}

fn activity_key(activity_id: &str) -> String {
    format!("{ACTIVITY_PREFIX}{activity_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActivityType;
    use crate::storage::MemoryStore;
    use time::macros::datetime;

    fn entry(id: &str) -> SyncCacheEntry {
        SyncCacheEntry {
            activity: ActivityInfo {
                id: id.to_string(),
                name: format!("Ride {id}"),
                activity_type: ActivityType::Ride,
                start_time: datetime!(2024-05-01 07:30 UTC),
                is_owner: true,
                is_trainer: false,
                supports_gap: false,
            },
            athlete_model: AthleteModel::default(),
            analysis: AnalysisData {
                distance: 42_000.0,
                ..AnalysisData::default()
            },
            computed_at: datetime!(2024-05-02 08:00 UTC),
        }
    }

    fn cache() -> SyncCache {
        SyncCache::new(Arc::new(MemoryStore::default()))
    }

    #[tokio::test]
    async fn put_then_get_returns_entry() {
        let cache = cache();
        assert!(!cache.has("1").await.unwrap());
        cache.put("1", &entry("1")).await.unwrap();
        assert!(cache.has("1").await.unwrap());
        assert_eq!(cache.get("1").await.unwrap(), Some(entry("1")));
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn bulk_operations_cover_present_entries_only() {
        let cache = cache();
        cache.put_many(&[entry("1"), entry("2")]).await.unwrap();
        let found = cache
            .get_many(&["1".to_string(), "2".to_string(), "3".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        let mut ids = cache.activity_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn state_is_not_counted_as_activity() {
        let cache = cache();
        cache.save_state(&SyncState::default()).await.unwrap();
        assert!(cache.is_empty().await.unwrap());
        assert!(cache.load_state().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_erases_entries_and_state() {
        let cache = cache();
        cache.put("1", &entry("1")).await.unwrap();
        cache.save_state(&SyncState::default()).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.is_empty().await.unwrap());
        assert!(cache.load_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_forgets_single_activity() {
        let cache = cache();
        cache.put_many(&[entry("1"), entry("2")]).await.unwrap();
        cache.remove("1").await.unwrap();
        assert!(!cache.has("1").await.unwrap());
        assert!(cache.has("2").await.unwrap());
    }

    #[tokio::test]
    async fn run_claim_is_dropped_by_clear_and_later_claims() {
        let cache = cache();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert!(!cache.holds_run(first).await.unwrap());

        cache.claim_run(first).await.unwrap();
        assert!(cache.holds_run(first).await.unwrap());
        assert!(cache.is_empty().await.unwrap());

        cache.claim_run(second).await.unwrap();
        assert!(!cache.holds_run(first).await.unwrap());

        cache.clear().await.unwrap();
        assert!(!cache.holds_run(second).await.unwrap());

        cache.claim_run(first).await.unwrap();
        cache.release_run().await.unwrap();
        assert!(!cache.holds_run(first).await.unwrap());
    }

    #[tokio::test]
    async fn reader_sees_entries_and_state() {
        let cache = cache();
        cache.put("1", &entry("1")).await.unwrap();
        cache.save_state(&SyncState::default()).await.unwrap();
        let reader = CacheReader::new(&cache);
        assert!(reader.has("1").await.unwrap());
        assert_eq!(reader.len().await.unwrap(), 1);
        assert!(reader.load_state().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_unknown_state_version() {
        let cache = cache();
        let state = SyncState {
            version: SYNC_STATE_VERSION + 1,
            ..SyncState::default()
        };
        cache.save_state(&state).await.unwrap();
        assert!(cache.load_state().await.is_err());
    }

    #[tokio::test]
    async fn corrupt_entry_is_reported() {
        let store = Arc::new(MemoryStore::default());
        store.put("activity:9", b"not json".to_vec()).await.unwrap();
        let cache = SyncCache::new(store);
        assert!(matches!(
            cache.get("9").await,
            Err(StorageError::Corrupt { .. })
        ));
    }
}
