use crate::errors::{ActivityError, SyncError};
use crate::sync_engine::SyncReport;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

const MAX_BYTES: u64 = 5 * 1024 * 1024;
const FILE_PREFIX: &str = "runs-";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    /// Finished, with some activities failing.
    Partial,
    Aborted,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Partial => "partial",
            RunStatus::Aborted => "aborted",
            RunStatus::Skipped => "skipped",
        }
    }
}

/// One line of the run journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub ts: String,
    pub run_id: String,
    pub status: RunStatus,
    pub trigger: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub total_activities: usize,
    #[serde(default)]
    pub saved_activities: usize,
    #[serde(default)]
    pub newly_saved: usize,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub errors: Vec<ActivityError>,
}

impl RunRecord {
    pub fn from_report(trigger: &str, report: &SyncReport) -> Self {
        Self {
            ts: String::new(),
            run_id: report.run_id.to_string(),
            status: if report.is_clean() {
                RunStatus::Ok
            } else {
                RunStatus::Partial
            },
            trigger: trigger.to_string(),
            mode: Some(report.mode.as_str().to_string()),
            total_activities: report.total_activities,
            saved_activities: report.saved_activities,
            newly_saved: report.newly_saved,
            cause: None,
            errors: report.errors.clone(),
        }
    }

    pub fn from_error(trigger: &str, err: &SyncError) -> Self {
        Self {
            ts: String::new(),
            run_id: Uuid::new_v4().to_string(),
            status: match err {
                SyncError::RunInProgress => RunStatus::Skipped,
                _ => RunStatus::Aborted,
            },
            trigger: trigger.to_string(),
            mode: None,
            total_activities: 0,
            saved_activities: 0,
            newly_saved: 0,
            cause: Some(err.to_string()),
            errors: err.activity_errors().to_vec(),
        }
    }
}

/// Append-only JSONL history of sync runs, rotated by size.
#[derive(Clone, Debug)]
pub struct SyncJournal {
    base_dir: PathBuf,
    max_bytes: u64,
}

impl SyncJournal {
    pub fn new(base_dir: PathBuf) -> anyhow::Result<Self> {
        Self::new_with_limit(base_dir, MAX_BYTES)
    }

    pub fn new_with_limit(base_dir: PathBuf, max_bytes: u64) -> anyhow::Result<Self> {
        fs::create_dir_all(&base_dir).context("create journal dir")?;
        Ok(Self {
            base_dir,
            max_bytes,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn record(&self, mut record: RunRecord) -> anyhow::Result<()> {
        record.ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("format timestamp")?;
        let date = OffsetDateTime::now_utc()
            .format(&time::format_description::parse("[year][month][day]")?)
            .context("format date")?;
        let path = next_journal_path(&self.base_dir, &date, self.max_bytes);
        let line = serde_json::to_string(&record).context("serialize run record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open journal {}", path.display()))?;
        writeln!(file, "{line}").context("write run record")?;
        Ok(())
    }

    /// Most recent records first, at most `limit`. Unreadable lines are skipped.
    pub fn recent(&self, limit: usize) -> anyhow::Result<Vec<RunRecord>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.base_dir)
            .context("read journal dir")?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(FILE_PREFIX) && name.ends_with(".jsonl"))
            })
            .collect();
        files.sort_by_key(|path| journal_sort_key(path));

        let mut records = Vec::new();
        for path in files.iter().rev() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("read journal {}", path.display()))?;
            for line in contents.lines().rev() {
                if let Ok(record) = serde_json::from_str::<RunRecord>(line) {
                    records.push(record);
                    if records.len() >= limit {
                        return Ok(records);
                    }
                }
            }
        }
        Ok(records)
    }
}

fn next_journal_path(base_dir: &Path, date: &str, max_bytes: u64) -> PathBuf {
    let mut suffix = 0;
    loop {
        let name = if suffix == 0 {
            format!("{FILE_PREFIX}{date}.jsonl")
        } else {
            format!("{FILE_PREFIX}{date}-{suffix}.jsonl")
        };
        let path = base_dir.join(name);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.len() >= max_bytes => suffix += 1,
            _ => return path,
        }
    }
}

/// Orders `runs-<date>.jsonl` before `runs-<date>-1.jsonl`, `-2`, ...
fn journal_sort_key(path: &Path) -> (String, u32) {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .trim_start_matches(FILE_PREFIX);
    match stem.split_once('-') {
        Some((date, suffix)) => (date.to_string(), suffix.parse().unwrap_or(0)),
        None => (stem.to_string(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FatalCause;
    use crate::source::SourceError;
    use tempfile::TempDir;

    fn record(run_id: &str) -> RunRecord {
        RunRecord {
            ts: String::new(),
            run_id: run_id.to_string(),
            status: RunStatus::Ok,
            trigger: "manual".into(),
            mode: Some("full".into()),
            total_activities: 3,
            saved_activities: 3,
            newly_saved: 3,
            cause: None,
            errors: Vec::new(),
        }
    }

    #[test]
    fn journal_writes_jsonl() {
        let tmp = TempDir::new().unwrap();
        let journal = SyncJournal::new_with_limit(tmp.path().to_path_buf(), 1024).unwrap();
        journal.record(record("run-1")).unwrap();
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].as_ref().unwrap().path();
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("\"run_id\":\"run-1\""));
        assert!(contents.contains("\"status\":\"ok\""));
    }

    #[test]
    fn journal_rotates_when_max_reached() {
        let tmp = TempDir::new().unwrap();
        let journal = SyncJournal::new_with_limit(tmp.path().to_path_buf(), 1).unwrap();
        journal.record(record("run-1")).unwrap();
        journal.record(record("run-2")).unwrap();
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn recent_returns_newest_first_across_files() {
        let tmp = TempDir::new().unwrap();
        let journal = SyncJournal::new_with_limit(tmp.path().to_path_buf(), 1).unwrap();
        for id in ["run-1", "run-2", "run-3"] {
            journal.record(record(id)).unwrap();
        }
        let recent = journal.recent(2).unwrap();
        let ids: Vec<_> = recent.iter().map(|record| record.run_id.as_str()).collect();
        assert_eq!(ids, vec!["run-3", "run-2"]);
    }

    #[test]
    fn aborted_run_keeps_partial_errors() {
        let err = SyncError::Aborted {
            cause: FatalCause::Source(SourceError::Unauthorized("token revoked".into())),
            errors: vec![ActivityError::new("9", "timeout", None)],
        };
        let record = RunRecord::from_error("daemon", &err);
        assert_eq!(record.status, RunStatus::Aborted);
        assert_eq!(record.errors.len(), 1);
        assert!(record.cause.unwrap().contains("token revoked"));
        let skipped = RunRecord::from_error("daemon", &SyncError::RunInProgress);
        assert_eq!(skipped.status, RunStatus::Skipped);
    }
}
