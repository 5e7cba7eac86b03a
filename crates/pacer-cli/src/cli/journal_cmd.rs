use super::shared::{format_run_record, open_journal};
use super::*;

pub(super) fn handle_journal(args: JournalArgs) -> anyhow::Result<()> {
    let journal = open_journal(args.dir)?;
    let records = journal.recent(args.limit)?;
    if records.is_empty() {
        println!("No sync runs recorded in {}", journal.base_dir().display());
        return Ok(());
    }
    for record in &records {
        if args.json {
            println!("{}", serde_json::to_string(record).context("serialize run record")?);
        } else {
            println!("{}", format_run_record(record));
            for err in &record.errors {
                println!("    {err}");
            }
        }
    }
    Ok(())
}
