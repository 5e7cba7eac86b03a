use anyhow::Context;
use clap::{Parser, ValueEnum};
use pacer_core::config::{AppConfig, default_config_path, default_journal_dir, default_lock_path};
use pacer_core::errors::SyncError;
use pacer_core::journal::{RunRecord, SyncJournal};
use pacer_core::sync_engine::{ProgressNotification, SyncOrchestrator, SyncReport};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod app;
mod args;
mod athlete_cmd;
mod auth_cmd;
mod cache_cmd;
mod config_cmd;
mod daemon_cmd;
mod journal_cmd;
mod shared;
mod sync_cmd;

use args::*;

use athlete_cmd::handle_athlete;
use auth_cmd::handle_auth;
use cache_cmd::handle_cache;
use config_cmd::handle_config;
use daemon_cmd::handle_daemon;
use journal_cmd::handle_journal;
use sync_cmd::handle_sync;

pub async fn run() -> anyhow::Result<()> {
    app::run().await
}
