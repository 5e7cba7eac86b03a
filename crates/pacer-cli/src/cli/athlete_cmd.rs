use super::shared::load_config;
use super::*;
use pacer_core::model::{AthleteModel, AthleteProfileSnapshot};

pub(super) fn handle_athlete(args: AthleteArgs, config_path: &Path) -> anyhow::Result<()> {
    match args.command {
        AthleteCommands::Add(args) => handle_add(args, config_path),
        AthleteCommands::List => handle_list(config_path),
    }
}

/// Overrides the fields given on the command line, keeping the rest of `model`.
pub(super) fn apply_settings(model: &mut AthleteModel, args: &AddAthleteArgs) {
    if let Some(gender) = args.gender {
        model.gender = gender.into();
    }
    if let Some(weight) = args.weight {
        model.settings.weight = weight;
    }
    if let Some(max_hr) = args.max_hr {
        model.settings.max_hr = max_hr;
    }
    if let Some(rest_hr) = args.rest_hr {
        model.settings.rest_hr = rest_hr;
    }
    if args.lthr.is_some() {
        model.settings.lthr = args.lthr;
    }
    if args.ftp.is_some() {
        model.settings.cycling_ftp = args.ftp;
    }
}

fn handle_add(args: AddAthleteArgs, config_path: &Path) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    match args.since {
        None => {
            apply_settings(&mut config.athlete.baseline, &args);
            println!("Baseline athlete settings updated.");
        }
        Some(since) => {
            // Start from whatever applied on that day so unspecified fields carry over.
            let mut model = config.athlete.resolver().resolve(since);
            apply_settings(&mut model, &args);
            config.athlete.upsert(AthleteProfileSnapshot {
                effective_from: since,
                model,
            });
            println!("Athlete settings recorded from {since}.");
        }
    }
    config.save(config_path)?;
    println!("Note: cached activities keep the settings they were computed with; run `pacer sync --force` to recompute.");
    Ok(())
}

fn format_model(model: &AthleteModel) -> String {
    let optional = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |value| format!("{value}"));
    format!(
        "gender={} weight={}kg max_hr={} rest_hr={} lthr={} ftp={}",
        model.gender,
        model.settings.weight,
        model.settings.max_hr,
        model.settings.rest_hr,
        optional(model.settings.lthr),
        optional(model.settings.cycling_ftp)
    )
}

fn handle_list(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    println!("baseline   | {}", format_model(&config.athlete.baseline));
    for snapshot in &config.athlete.snapshots {
        println!("{} | {}", snapshot.effective_from, format_model(&snapshot.model));
    }
    Ok(())
}
