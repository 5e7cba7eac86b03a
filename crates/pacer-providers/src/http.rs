use pacer_core::source::SourceError;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Waits longer than this are not slept through; the caller sees the failure instead.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sends the request built by `build`, retrying throttled or unavailable responses.
///
/// `subject` names the requested resource in `NotFound` errors.
pub async fn send_with_retry<F>(
    mut build: F,
    subject: &str,
    max_attempts: u32,
) -> Result<Response, SourceError>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let response = match build().send().await {
            Ok(response) => response,
            Err(err) if attempt < max_attempts && (err.is_timeout() || err.is_connect()) => {
                warn!(subject, attempt, error = %err, "request failed; retrying");
                tokio::time::sleep(DEFAULT_RETRY_DELAY).await;
                continue;
            }
            Err(err) => return Err(SourceError::Transient(format!("send request: {err}"))),
        };
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if is_retryable(status) && attempt < max_attempts {
            let delay = retry_delay_from_headers(response.headers()).unwrap_or(DEFAULT_RETRY_DELAY);
            if delay <= MAX_RETRY_DELAY {
                debug!(subject, attempt, status = %status, delay_secs = delay.as_secs(), "throttled; waiting");
                let _ = response.bytes().await;
                tokio::time::sleep(delay).await;
                continue;
            }
        }
        return Err(classify_status(status, subject));
    }
    Err(SourceError::Transient(format!(
        "request for {subject} failed after {max_attempts} attempts"
    )))
}

pub async fn decode_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, SourceError> {
    response
        .json()
        .await
        .map_err(|err| SourceError::Decode(format!("decode {what}: {err}")))
}

pub(crate) fn classify_status(status: StatusCode, subject: &str) -> SourceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SourceError::Unauthorized(format!("{subject} returned {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            SourceError::RateLimited(format!("{subject} returned {status}"))
        }
        StatusCode::NOT_FOUND => SourceError::NotFound(subject.to_string()),
        _ => SourceError::Transient(format!("{subject} returned {status}")),
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::BAD_GATEWAY
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
    retry_after_seconds(headers)
        .or_else(|| ratelimit_reset_seconds(headers))
        .map(Duration::from_secs)
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn ratelimit_reset_seconds(headers: &HeaderMap) -> Option<u64> {
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    (reset > now).then(|| reset - now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_parses_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        assert_eq!(retry_after_seconds(&headers), Some(5));
        assert_eq!(
            retry_delay_from_headers(&headers),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn ratelimit_reset_uses_future_time() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&(now + 10).to_string()).unwrap(),
        );
        let delay = ratelimit_reset_seconds(&headers).unwrap();
        assert!(delay > 0 && delay <= 10);
    }

    #[test]
    fn statuses_map_to_source_errors() {
        assert!(classify_status(StatusCode::UNAUTHORIZED, "athlete").is_fatal());
        assert!(classify_status(StatusCode::FORBIDDEN, "athlete").is_fatal());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "athlete").is_fatal());
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "42"),
            SourceError::NotFound("42".into())
        );
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "42").is_transient());
    }
}
