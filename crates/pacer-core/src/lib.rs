pub mod analysis;
pub mod athlete;
pub mod cache;
pub mod compute_worker;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod journal;
pub mod lockfile;
pub mod model;
pub mod source;
pub mod storage;
pub mod sync_engine;
mod sync_engine_activity;
mod sync_engine_apply;
mod sync_engine_discovery;
mod sync_engine_orchestrator;
mod sync_engine_retry;
mod sync_engine_status;
mod sync_engine_types;
pub mod sync_task;
