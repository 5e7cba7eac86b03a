use super::shared::load_config;
use super::*;

pub(super) fn handle_config(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Init(args) => handle_init(args, config_path),
        ConfigCommands::Show => handle_show(config_path),
    }
}

pub(super) fn apply_init(config: &mut AppConfig, args: InitArgs) {
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(url) = args.api_base_url {
        config.api_base_url = url;
    }
    if let Some(account) = args.account {
        config.account = Some(account);
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size.max(1);
    }
    if let Some(minutes) = args.auto_sync_minutes {
        config.auto_sync_minutes = minutes.max(1);
    }
    if let Some(retries) = args.max_retries {
        config.retry.max_retries = retries;
    }
}

fn handle_init(args: InitArgs, config_path: &Path) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    apply_init(&mut config, args);
    config.save(config_path)?;
    println!("Config saved to {}", config_path.display());
    Ok(())
}

fn handle_show(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!("# {}", config_path.display());
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("serialize config")?
    );
    println!("# data dir: {}", config.resolve_data_dir()?.display());
    Ok(())
}
