use super::*;
use pacer_core::model::Gender;
use time::Date;
use time::macros::format_description;

#[derive(Parser)]
#[command(name = "pacer", author, version, about)]
pub(super) struct Cli {
    #[arg(long, global = true, help = "Path to the config file")]
    pub(super) config: Option<PathBuf>,
    #[command(subcommand)]
    pub(super) command: Commands,
}

#[derive(clap::Subcommand)]
pub(super) enum Commands {
    #[command(about = "Manage config")]
    Config(ConfigArgs),
    #[command(about = "Manage dated athlete settings")]
    Athlete(AthleteArgs),
    #[command(about = "Manage the activity source token")]
    Auth(AuthArgs),
    #[command(about = "Sync activities from the remote source")]
    Sync(SyncArgs),
    #[command(about = "Inspect or reset the local sync cache")]
    Cache(CacheArgs),
    #[command(about = "Sync periodically until interrupted")]
    Daemon(DaemonArgs),
    #[command(about = "Show recent sync runs")]
    Journal(JournalArgs),
}

#[derive(Parser)]
pub(super) struct ConfigArgs {
    #[command(subcommand)]
    pub(super) command: ConfigCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum ConfigCommands {
    #[command(about = "Create or update the config file")]
    Init(InitArgs),
    #[command(about = "Print the effective config")]
    Show,
}

#[derive(Parser)]
pub(super) struct InitArgs {
    #[arg(long)]
    pub(super) data_dir: Option<PathBuf>,
    #[arg(long)]
    pub(super) api_base_url: Option<String>,
    #[arg(long, help = "Keyring account holding the source token")]
    pub(super) account: Option<String>,
    #[arg(long)]
    pub(super) page_size: Option<u32>,
    #[arg(long)]
    pub(super) auto_sync_minutes: Option<u64>,
    #[arg(long, help = "Retries for transient source failures")]
    pub(super) max_retries: Option<u32>,
}

#[derive(Parser)]
pub(super) struct AthleteArgs {
    #[command(subcommand)]
    pub(super) command: AthleteCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum AthleteCommands {
    #[command(about = "Record athlete settings, dated or as the baseline")]
    Add(AddAthleteArgs),
    #[command(about = "List the baseline and dated settings")]
    List,
}

#[derive(Parser)]
pub(super) struct AddAthleteArgs {
    #[arg(
        long,
        value_parser = parse_date,
        help = "First day (YYYY-MM-DD) the settings apply; omit to set the baseline"
    )]
    pub(super) since: Option<Date>,
    #[arg(long, value_enum)]
    pub(super) gender: Option<GenderValue>,
    #[arg(long)]
    pub(super) weight: Option<f64>,
    #[arg(long)]
    pub(super) max_hr: Option<f64>,
    #[arg(long)]
    pub(super) rest_hr: Option<f64>,
    #[arg(long)]
    pub(super) lthr: Option<f64>,
    #[arg(long)]
    pub(super) ftp: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(super) enum GenderValue {
    Male,
    Female,
}

impl From<GenderValue> for Gender {
    fn from(value: GenderValue) -> Self {
        match value {
            GenderValue::Male => Gender::Male,
            GenderValue::Female => Gender::Female,
        }
    }
}

pub(super) fn parse_date(value: &str) -> Result<Date, String> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

#[derive(Parser)]
pub(super) struct AuthArgs {
    #[command(subcommand)]
    pub(super) command: AuthCommands,
}

#[derive(clap::Subcommand)]
pub(super) enum AuthCommands {
    #[command(about = "Store an access token in the OS keyring")]
    SetToken(SetTokenArgs),
    #[command(about = "Check the stored token against the source")]
    Status,
    #[command(about = "Remove the stored token")]
    Clear,
}

#[derive(Parser)]
pub(super) struct SetTokenArgs {
    #[arg(long)]
    pub(super) access_token: String,
    #[arg(long)]
    pub(super) refresh_token: Option<String>,
    #[arg(long, help = "Access token expiry as unix seconds")]
    pub(super) expires_at: Option<i64>,
    #[arg(long)]
    pub(super) client_id: Option<String>,
    #[arg(long)]
    pub(super) client_secret: Option<String>,
    #[arg(long, default_value = "https://www.strava.com/oauth/token")]
    pub(super) token_endpoint: String,
}

#[derive(Parser)]
pub(super) struct SyncArgs {
    #[arg(long, help = "Clear the sync cache and resync everything")]
    pub(super) force: bool,
    #[arg(long, help = "Hide the progress line")]
    pub(super) quiet: bool,
    #[arg(long)]
    pub(super) lock: Option<PathBuf>,
}

#[derive(Parser)]
pub(super) struct CacheArgs {
    #[command(subcommand)]
    pub(super) command: CacheCommands,
    #[arg(long, global = true, help = "Sync lock taken while clearing or forgetting")]
    pub(super) lock: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
pub(super) enum CacheCommands {
    #[command(about = "Erase cached results and the last sync time")]
    Clear,
    #[command(about = "Show local storage usage")]
    Usage,
    #[command(about = "Drop one activity so the next sync computes it again")]
    Forget(ForgetArgs),
}

#[derive(Parser)]
pub(super) struct ForgetArgs {
    #[arg(long)]
    pub(super) id: String,
}

#[derive(Parser)]
pub(super) struct DaemonArgs {
    #[arg(long, help = "Minutes between runs; defaults to the config value")]
    pub(super) interval_minutes: Option<u64>,
    #[arg(long)]
    pub(super) run_once: bool,
    #[arg(long)]
    pub(super) lock: Option<PathBuf>,
}

#[derive(Parser)]
pub(super) struct JournalArgs {
    #[arg(long, default_value_t = 10)]
    pub(super) limit: usize,
    #[arg(long, help = "Print raw JSON records")]
    pub(super) json: bool,
    #[arg(long)]
    pub(super) dir: Option<PathBuf>,
}
