use crate::lockfile::SyncLock;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Runs `job` while holding the sync lock. Returns `false` when another process holds it.
pub async fn run_once_with_lock<F, Fut>(lock_path: &Path, job: F) -> anyhow::Result<bool>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    match SyncLock::try_acquire(lock_path)? {
        Some(_lock) => {
            job().await?;
            Ok(true)
        }
        None => {
            warn!(path = %lock_path.display(), "sync lock already held; skipping run");
            Ok(false)
        }
    }
}

/// Re-runs `job` every `interval` until `shutdown` resolves, backing off after failures.
pub async fn run_auto_sync<F, Fut, S>(
    lock_path: &Path,
    interval: Duration,
    mut job: F,
    shutdown: S,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut failure_count: u32 = 0;
    loop {
        match run_once_with_lock(lock_path, &mut job).await {
            Ok(ran) => {
                if ran {
                    info!("auto sync run completed");
                }
                failure_count = 0;
            }
            Err(err) => {
                failure_count = failure_count.saturating_add(1);
                warn!(error = %err, failures = failure_count, "auto sync run failed");
            }
        }
        let delay = daemon_backoff_delay(interval, failure_count);
        info!(delay_secs = delay.as_secs(), "next auto sync scheduled");
        tokio::select! {
            _ = &mut shutdown => {
                info!("auto sync stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

pub fn daemon_backoff_delay(interval: Duration, failures: u32) -> Duration {
    if failures == 0 {
        return interval;
    }
    let base = interval.as_secs().max(1);
    let exp = failures.saturating_sub(1).min(5);
    let delay = base.saturating_mul(2u64.saturating_pow(exp));
    Duration::from_secs(delay.min(6 * 3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn run_once_skips_when_locked() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("sync.lock");
        let counter = AtomicUsize::new(0);

        let _guard = SyncLock::try_acquire(&lock_path).unwrap().unwrap();
        let ran = run_once_with_lock(&lock_path, || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert!(!ran);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_once_propagates_job_error() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("sync.lock");
        let result = run_once_with_lock(&lock_path, || async {
            Err::<(), _>(anyhow::anyhow!("boom"))
        })
        .await;
        assert!(result.is_err());
        assert!(SyncLock::try_acquire(&lock_path).unwrap().is_some());
    }

    #[test]
    fn backoff_grows_then_caps() {
        let interval = Duration::from_secs(60);
        assert_eq!(daemon_backoff_delay(interval, 0), interval);
        assert_eq!(daemon_backoff_delay(interval, 1), Duration::from_secs(60));
        assert_eq!(daemon_backoff_delay(interval, 2), Duration::from_secs(120));
        assert_eq!(daemon_backoff_delay(interval, 3), Duration::from_secs(240));
        assert_eq!(
            daemon_backoff_delay(Duration::from_secs(3600), 10),
            Duration::from_secs(6 * 3600)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn auto_sync_repeats_until_shutdown() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("sync.lock");
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let shutdown = tokio::time::sleep(Duration::from_secs(150));

        run_auto_sync(
            &lock_path,
            Duration::from_secs(60),
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
