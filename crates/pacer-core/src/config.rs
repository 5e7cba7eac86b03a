use crate::athlete::AthleteModelResolver;
use crate::compute_worker::ComputeOptions;
use crate::model::{AthleteModel, AthleteProfileSnapshot};
use crate::storage::DEFAULT_QUOTA_BYTES;
use crate::sync_engine::{RetryPolicy, SyncOptions};
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE_URL: &str = "https://www.strava.com/api/v3";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Keyring account holding the source tokens.
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
    #[serde(default = "default_auto_sync_minutes")]
    pub auto_sync_minutes: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_worker_spawn_failure_limit")]
    pub worker_spawn_failure_limit: u32,
    #[serde(default)]
    pub compute: ComputeOptions,
    #[serde(default)]
    pub athlete: AthleteHistory,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AthleteHistory {
    #[serde(default)]
    pub baseline: AthleteModel,
    #[serde(default)]
    pub snapshots: Vec<AthleteProfileSnapshot>,
}

impl AthleteHistory {
    /// Inserts a snapshot, replacing any existing one with the same date.
    pub fn upsert(&mut self, snapshot: AthleteProfileSnapshot) {
        self.snapshots
            .retain(|existing| existing.effective_from != snapshot.effective_from);
        self.snapshots.push(snapshot);
        self.snapshots.sort_by_key(|existing| existing.effective_from);
    }

    pub fn resolver(&self) -> AthleteModelResolver {
        AthleteModelResolver::new(self.baseline.clone(), self.snapshots.clone())
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_page_size() -> u32 {
    30
}

fn default_quota_bytes() -> u64 {
    DEFAULT_QUOTA_BYTES
}

fn default_auto_sync_minutes() -> u64 {
    60
}

fn default_worker_spawn_failure_limit() -> u32 {
    3
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            api_base_url: default_api_base_url(),
            account: None,
            page_size: default_page_size(),
            quota_bytes: default_quota_bytes(),
            auto_sync_minutes: default_auto_sync_minutes(),
            retry: RetryPolicy::default(),
            worker_spawn_failure_limit: default_worker_spawn_failure_limit(),
            compute: ComputeOptions::default(),
            athlete: AthleteHistory::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).context("read config")?;
        let config = serde_json::from_str(&data).context("parse config")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create config directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, data).context("write config")?;
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size.max(1),
            retry: self.retry.clone(),
            worker_spawn_failure_limit: self.worker_spawn_failure_limit.max(1),
            compute: self.compute.clone(),
        }
    }

    pub fn resolve_data_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    pub fn account_name(&self) -> &str {
        self.account.as_deref().unwrap_or("default")
    }
}

fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("com", "pacer", "pacer").context("resolve project dirs")
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}

pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("activities"))
}

pub fn default_journal_dir() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("journal"))
}

pub fn default_lock_path() -> anyhow::Result<PathBuf> {
    let project = project_dirs()?;
    Ok(project
        .runtime_dir()
        .unwrap_or(project.cache_dir())
        .join("sync.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::date;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.page_size, 30);
        assert!(config.compute.return_zones);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let mut config = AppConfig {
            account: Some("athlete@example.com".into()),
            auto_sync_minutes: 15,
            ..AppConfig::default()
        };
        config.athlete.upsert(AthleteProfileSnapshot {
            effective_from: date!(2023 - 06 - 01),
            model: AthleteModel::default(),
        });
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"page_size": 50}"#).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.quota_bytes, DEFAULT_QUOTA_BYTES);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn upsert_replaces_same_date() {
        let mut history = AthleteHistory::default();
        let mut model = AthleteModel::default();
        history.upsert(AthleteProfileSnapshot {
            effective_from: date!(2023 - 06 - 01),
            model: model.clone(),
        });
        model.settings.weight = 65.0;
        history.upsert(AthleteProfileSnapshot {
            effective_from: date!(2023 - 06 - 01),
            model,
        });
        history.upsert(AthleteProfileSnapshot {
            effective_from: date!(2023 - 01 - 01),
            model: AthleteModel::default(),
        });
        assert_eq!(history.snapshots.len(), 2);
        assert_eq!(history.snapshots[0].effective_from, date!(2023 - 01 - 01));
        assert_eq!(history.snapshots[1].model.settings.weight, 65.0);
    }
}
