use crate::compute_worker::ComputeError;
use crate::source::SourceError;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Diagnostic payload of a per-activity failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrObject {
    pub message: String,
    #[serde(default)]
    pub source_location: Option<String>,
}

/// A failure confined to one activity; the run continues past it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityError {
    #[serde(default)]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub err_object: Option<ErrObject>,
}

impl ActivityError {
    pub fn new(activity_id: &str, message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            activity_id: Some(activity_id.to_string()),
            err_object: Some(ErrObject {
                message: message.into(),
                source_location: location,
            }),
        }
    }

    pub fn from_source(activity_id: &str, err: &SourceError) -> Self {
        Self::new(activity_id, format!("fetch streams: {err}"), None)
    }

    pub fn from_compute(activity_id: &str, err: &ComputeError) -> Self {
        Self::new(
            activity_id,
            format!("compute: {err}"),
            err.location().map(ToString::to_string),
        )
    }

    pub fn from_storage(activity_id: &str, err: &StorageError) -> Self {
        Self::new(activity_id, format!("save: {err}"), None)
    }

    pub fn message(&self) -> &str {
        self.err_object
            .as_ref()
            .map(|err| err.message.as_str())
            .unwrap_or("")
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let activity = self.activity_id.as_deref().unwrap_or("-");
        match &self.err_object {
            Some(ErrObject {
                message,
                source_location: Some(location),
            }) => write!(f, "ERROR on activity <{activity}>: {message}. File: {location}"),
            Some(ErrObject { message, .. }) => write!(f, "ERROR on activity <{activity}>: {message}"),
            None => write!(f, "ERROR on activity <{activity}>"),
        }
    }
}

/// Why a run stopped before finishing.
#[derive(Debug, Error)]
pub enum FatalCause {
    #[error("remote source: {0}")]
    Source(#[source] SourceError),
    #[error("storage: {0}")]
    Storage(#[source] StorageError),
    #[error("compute workers could not be spawned {consecutive} times in a row")]
    WorkerExhausted { consecutive: u32 },
    #[error("sync data was cleared or claimed by another run")]
    Superseded,
}

impl FatalCause {
    pub fn kind(&self) -> &'static str {
        match self {
            FatalCause::Source(_) => "source",
            FatalCause::Storage(_) => "storage",
            FatalCause::WorkerExhausted { .. } => "worker_exhausted",
            FatalCause::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a synchronization run is already in progress")]
    RunInProgress,
    #[error("sync aborted after {} activity error(s): {cause}", .errors.len())]
    Aborted {
        #[source]
        cause: FatalCause,
        errors: Vec<ActivityError>,
    },
    #[error("sync task interrupted: {0}")]
    Interrupted(String),
}

impl SyncError {
    pub fn activity_errors(&self) -> &[ActivityError] {
        match self {
            SyncError::Aborted { errors, .. } => errors,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_error_serializes_wire_shape() {
        let err = ActivityError::new("42", "boom", Some("analysis.rs:10:5".into()));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["activityId"], "42");
        assert_eq!(json["errObject"]["message"], "boom");
        assert_eq!(json["errObject"]["sourceLocation"], "analysis.rs:10:5");
    }

    #[test]
    fn activity_error_display_includes_location() {
        let err = ActivityError::new("42", "boom", Some("analysis.rs:10:5".into()));
        assert_eq!(
            err.to_string(),
            "ERROR on activity <42>: boom. File: analysis.rs:10:5"
        );
        let err = ActivityError::new("7", "timeout", None);
        assert_eq!(err.to_string(), "ERROR on activity <7>: timeout");
    }

    #[test]
    fn aborted_error_exposes_partial_errors() {
        let err = SyncError::Aborted {
            cause: FatalCause::Storage(StorageError::Unavailable("disk gone".into())),
            errors: vec![ActivityError::new("1", "timeout", None)],
        };
        assert_eq!(err.activity_errors().len(), 1);
        assert!(err.to_string().contains("1 activity error"));
        assert!(err.to_string().contains("disk gone"));
    }
}
