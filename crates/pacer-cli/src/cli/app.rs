use super::*;
pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    info!(command = command_label(&cli.command), "Running command");
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    let result = match cli.command {
        Commands::Config(args) => handle_config(args, &config_path),
        Commands::Athlete(args) => handle_athlete(args, &config_path),
        Commands::Auth(args) => handle_auth(args, &config_path).await,
        Commands::Sync(args) => handle_sync(args, &config_path).await,
        Commands::Cache(args) => handle_cache(args, &config_path).await,
        Commands::Daemon(args) => handle_daemon(args, &config_path).await,
        Commands::Journal(args) => handle_journal(args),
    };

    if let Err(err) = &result {
        warn!(error = %err, "command failed");
    }
    result
}

pub(super) fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Config(_) => "config",
        Commands::Athlete(_) => "athlete",
        Commands::Auth(_) => "auth",
        Commands::Sync(_) => "sync",
        Commands::Cache(_) => "cache",
        Commands::Daemon(_) => "daemon",
        Commands::Journal(_) => "journal",
    }
}
