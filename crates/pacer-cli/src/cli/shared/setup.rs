use super::*;
use pacer_core::cache::SyncCache;
use pacer_core::lockfile::{SyncLock, lock_holder};
use pacer_core::storage::FileStore;
use pacer_providers::StravaSource;
use pacer_providers::auth::KeyringTokens;

pub(in crate::cli) fn load_config(config_path: &Path) -> anyhow::Result<AppConfig> {
    AppConfig::load(config_path)
        .with_context(|| format!("load config {}", config_path.display()))
}

pub(in crate::cli) fn build_source(config: &AppConfig) -> StravaSource {
    let tokens = KeyringTokens::new(config.account_name());
    StravaSource::new(config.api_base_url.clone(), Arc::new(tokens))
}

/// Wires the file store, keyring-backed source and athlete history into an orchestrator.
pub(in crate::cli) fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Arc<SyncOrchestrator>> {
    let data_dir = config.resolve_data_dir()?;
    info!(data_dir = %data_dir.display(), quota_bytes = config.quota_bytes, "opening activity store");
    let store = FileStore::new(data_dir, config.quota_bytes);
    let cache = SyncCache::new(Arc::new(store));
    let orchestrator = SyncOrchestrator::new(
        Arc::new(build_source(config)),
        cache,
        config.athlete.resolver(),
        config.sync_options(),
    );
    Ok(Arc::new(orchestrator))
}

pub(in crate::cli) fn open_journal(dir: Option<PathBuf>) -> anyhow::Result<SyncJournal> {
    let dir = match dir {
        Some(dir) => dir,
        None => default_journal_dir()?,
    };
    SyncJournal::new(dir)
}

pub(in crate::cli) fn resolve_lock_path(lock: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match lock {
        Some(path) => Ok(path),
        None => default_lock_path(),
    }
}

/// Takes the cross-process sync lock, or fails naming the process holding it.
pub(in crate::cli) fn acquire_sync_lock(lock: Option<PathBuf>) -> anyhow::Result<SyncLock> {
    let lock_path = resolve_lock_path(lock)?;
    match SyncLock::try_acquire(&lock_path)? {
        Some(lock) => Ok(lock),
        None => match lock_holder(&lock_path) {
            Some(pid) => anyhow::bail!("another sync is running (pid {pid})"),
            None => anyhow::bail!("another sync is running ({})", lock_path.display()),
        },
    }
}
