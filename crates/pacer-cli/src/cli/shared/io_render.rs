use super::*;
use pacer_core::errors::ActivityError;
use pacer_core::journal::RunStatus;
use pacer_core::storage::StorageUsage;
use std::cell::Cell;

pub(in crate::cli) fn render_progress_bar(percent: f64, width: usize) -> String {
    if width == 0 {
        return "[]".to_string();
    }
    let ratio = (percent / 100.0).clamp(0.0, 1.0);
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(empty))
}

pub(in crate::cli) fn format_progress_line(progress: &ProgressNotification) -> String {
    format!(
        "page {} {} {:>5.1}% {:<22} saved={}/{}",
        progress.page_group_id,
        render_progress_bar(progress.progress, 20),
        progress.progress,
        progress.step.as_str(),
        progress.saved_activities_count,
        progress.total_activities
    )
}

/// Redraws a single progress line in place.
pub(in crate::cli) fn render_sync_progress(last_len: &Cell<usize>, progress: &ProgressNotification) {
    let line = format_progress_line(progress);
    let prev_len = last_len.get();
    if line.len() < prev_len {
        print!("\r{line}{}", " ".repeat(prev_len - line.len()));
    } else {
        print!("\r{line}");
    }
    let _ = io::stdout().flush();
    last_len.set(line.len());
}

pub(in crate::cli) fn finish_progress_line(last_len: &Cell<usize>) {
    if last_len.get() > 0 {
        println!();
        last_len.set(0);
    }
}

pub(in crate::cli) fn print_activity_errors(errors: &[ActivityError]) {
    for err in errors {
        println!("{err}");
    }
}

pub(in crate::cli) fn print_report(report: &SyncReport) {
    println!(
        "Sync {} ({}): saved={} new={} cached={} total={} errors={}",
        if report.is_clean() { "complete" } else { "finished with errors" },
        report.mode.as_str(),
        report.saved_activities,
        report.newly_saved,
        report.skipped_cached,
        report.total_activities,
        report.errors.len()
    );
    print_activity_errors(&report.errors);
}

/// Error report for a run that did not reach finalization.
pub(in crate::cli) fn print_sync_error(err: &SyncError) {
    match err {
        SyncError::Aborted { cause, errors } => {
            print_activity_errors(errors);
            let payload = serde_json::json!({
                "kind": cause.kind(),
                "message": cause.to_string(),
            });
            println!("Sync aborted: {payload}");
        }
        other => println!("Sync failed: {other}"),
    }
}

pub(in crate::cli) fn format_usage(usage: &StorageUsage) -> String {
    format!(
        "Storage: {:.2} MB used ({:.1}% of {:.0} MB)",
        usage.megabytes_in_use(),
        usage.percent_used(),
        usage.quota_bytes as f64 / (1024.0 * 1024.0)
    )
}

pub(in crate::cli) fn format_run_record(record: &RunRecord) -> String {
    let mode = record.mode.as_deref().unwrap_or("-");
    let mut line = format!(
        "{} | {:<8} | {:<7} | {:<11} | saved={} new={} total={} errors={}",
        record.ts,
        record.status.as_str(),
        record.trigger,
        mode,
        record.saved_activities,
        record.newly_saved,
        record.total_activities,
        record.errors.len()
    );
    if record.status != RunStatus::Ok
        && let Some(cause) = record.cause.as_deref()
    {
        line.push_str(&format!(" | {cause}"));
    }
    line
}
