use super::shared::{SyncJobOptions, acquire_sync_lock, build_orchestrator, load_config, open_journal, run_sync_job};
use super::*;

pub(super) async fn handle_sync(args: SyncArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let _lock = acquire_sync_lock(args.lock)?;
    let orchestrator = build_orchestrator(&config)?;
    let journal = open_journal(None)?;
    run_sync_job(
        orchestrator,
        &journal,
        SyncJobOptions {
            trigger: "cli",
            force: args.force,
            show_progress: !args.quiet,
            interruptible: true,
        },
    )
    .await?;
    Ok(())
}
