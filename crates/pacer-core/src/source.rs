use crate::model::{ActivityInfo, FetchedActivity};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use time::OffsetDateTime;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("transient source failure: {0}")]
    Transient(String),
    #[error("activity {0} not found")]
    NotFound(String),
    #[error("authentication rejected: {0}")]
    Unauthorized(String),
    #[error("rate limit exhausted: {0}")]
    RateLimited(String),
    #[error("malformed source payload: {0}")]
    Decode(String),
}

impl SourceError {
    /// Errors after which no further request can succeed in this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Unauthorized(_) | SourceError::RateLimited(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivityQuery {
    /// Only activities starting strictly after this instant.
    pub after: Option<OffsetDateTime>,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityPage {
    pub page: u32,
    pub activities: Vec<ActivityInfo>,
    pub next_page: Option<u32>,
}

/// Remote service holding the athlete's activity history.
pub trait ActivitySource: Send + Sync {
    fn name(&self) -> &'static str;

    fn list_activities<'a>(&'a self, query: ActivityQuery) -> SourceFuture<'a, ActivityPage>;

    fn fetch_activity<'a>(&'a self, activity: &'a ActivityInfo) -> SourceFuture<'a, FetchedActivity>;

    fn validate_auth<'a>(&'a self) -> SourceFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_rate_limit_are_fatal() {
        assert!(SourceError::Unauthorized("expired".into()).is_fatal());
        assert!(SourceError::RateLimited("daily".into()).is_fatal());
        assert!(!SourceError::Transient("timeout".into()).is_fatal());
        assert!(!SourceError::NotFound("1".into()).is_fatal());
        assert!(SourceError::Transient("timeout".into()).is_transient());
    }
}
