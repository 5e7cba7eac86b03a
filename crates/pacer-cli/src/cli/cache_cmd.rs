use super::shared::{acquire_sync_lock, build_orchestrator, format_usage, load_config};
use super::*;

pub(super) async fn handle_cache(args: CacheArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config)?;
    match args.command {
        CacheCommands::Clear => {
            let _lock = acquire_sync_lock(args.lock)?;
            orchestrator.clear_sync_cache().await?;
            println!("Sync cache cleared; the next sync is a full sync.");
        }
        CacheCommands::Usage => {
            let usage = orchestrator.usage().await.context("read storage usage")?;
            let cached = orchestrator
                .cache()
                .len()
                .await
                .context("count cached activities")?;
            let state = orchestrator
                .cache()
                .load_state()
                .await
                .context("read sync state")?;
            println!("{}", format_usage(&usage));
            println!("Cached activities: {cached}");
            match state.and_then(|state| state.last_sync_at) {
                Some(at) => println!("Last sync: {at}"),
                None => println!("Last sync: never"),
            }
        }
        CacheCommands::Forget(forget) => {
            let _lock = acquire_sync_lock(args.lock)?;
            orchestrator.forget_activity(&forget.id).await?;
            println!("Activity {} will be computed again on the next sync.", forget.id);
        }
    }
    Ok(())
}
