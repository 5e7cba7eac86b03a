use super::shared::{SyncJobOptions, build_orchestrator, load_config, open_journal, resolve_lock_path, run_sync_job};
use super::*;
use pacer_core::daemon::{run_auto_sync, run_once_with_lock};
use std::time::Duration;

pub(super) async fn handle_daemon(args: DaemonArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let lock_path = resolve_lock_path(args.lock)?;
    let minutes = args.interval_minutes.unwrap_or(config.auto_sync_minutes).max(1);
    let interval = Duration::from_secs(minutes * 60);
    let orchestrator = build_orchestrator(&config)?;
    let journal = open_journal(None)?;
    let options = SyncJobOptions {
        trigger: "daemon",
        force: false,
        show_progress: false,
        interruptible: false,
    };
    let job = || {
        let orchestrator = orchestrator.clone();
        let journal = &journal;
        async move { run_sync_job(orchestrator, journal, options).await.map(|_| ()) }
    };

    if args.run_once {
        let ran = run_once_with_lock(&lock_path, job).await?;
        if !ran {
            println!("Another sync holds {}; skipped.", lock_path.display());
        }
        return Ok(());
    }

    // Listen for Ctrl-C from the start so a signal during a run is not lost.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(());
        }
    });
    let shutdown = async move {
        let _ = stop_rx.await;
    };

    info!(interval_minutes = minutes, lock = %lock_path.display(), "daemon started");
    println!("Syncing every {minutes} minute(s); press Ctrl-C to stop.");
    run_auto_sync(&lock_path, interval, job, shutdown).await
}
