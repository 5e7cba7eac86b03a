use super::*;
use std::cell::Cell;

#[derive(Clone, Copy, Debug)]
pub(in crate::cli) struct SyncJobOptions {
    pub(in crate::cli) trigger: &'static str,
    pub(in crate::cli) force: bool,
    pub(in crate::cli) show_progress: bool,
    /// Abort the run on Ctrl-C.
    pub(in crate::cli) interruptible: bool,
}

/// Runs one sync in the background, renders its progress, prints the outcome
/// and appends it to the journal.
pub(in crate::cli) async fn run_sync_job(
    orchestrator: Arc<SyncOrchestrator>,
    journal: &SyncJournal,
    options: SyncJobOptions,
) -> anyhow::Result<SyncReport> {
    let mut task = if options.force {
        orchestrator.clone().start_forced()
    } else {
        orchestrator.clone().start()
    };

    let last_len = Cell::new(0usize);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            next = task.next_progress() => match next {
                Some(progress) => {
                    if options.show_progress {
                        render_sync_progress(&last_len, &progress);
                    }
                }
                None => break,
            },
            _ = &mut interrupt, if options.interruptible => {
                warn!("interrupt received; aborting sync");
                task.abort();
                break;
            }
        }
    }
    finish_progress_line(&last_len);

    let result = task.join().await;
    let record = match &result {
        Ok(report) => RunRecord::from_report(options.trigger, report),
        Err(err) => RunRecord::from_error(options.trigger, err),
    };
    if let Err(err) = journal.record(record) {
        warn!(error = %err, "failed to append run journal");
    }

    match result {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                saved = report.saved_activities,
                errors = report.errors.len(),
                "sync finished"
            );
            print_report(&report);
            match orchestrator.usage().await {
                Ok(usage) => println!("{}", format_usage(&usage)),
                Err(err) => warn!(error = %err, "failed to read storage usage"),
            }
            Ok(report)
        }
        Err(err) => {
            print_sync_error(&err);
            Err(err.into())
        }
    }
}
