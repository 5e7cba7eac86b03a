use crate::model::{ActivitySourceData, AthleteModel, AthleteProfileSnapshot};
use time::Date;

/// Resolves the athlete profile that was in effect on a given day.
#[derive(Clone, Debug, Default)]
pub struct AthleteModelResolver {
    baseline: AthleteModel,
    snapshots: Vec<AthleteProfileSnapshot>,
}

impl AthleteModelResolver {
    pub fn new(baseline: AthleteModel, mut snapshots: Vec<AthleteProfileSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.effective_from);
        Self {
            baseline,
            snapshots,
        }
    }

    pub fn snapshots(&self) -> &[AthleteProfileSnapshot] {
        &self.snapshots
    }

    /// Latest snapshot effective on or before `on_date`, else the baseline.
    pub fn resolve(&self, on_date: Date) -> AthleteModel {
        let after = self
            .snapshots
            .partition_point(|snapshot| snapshot.effective_from <= on_date);
        match after.checked_sub(1) {
            Some(index) => self.snapshots[index].model.clone(),
            None => self.baseline.clone(),
        }
    }
}

/// Replaces weight and gender with the values the activity author recorded.
/// Fields the source did not carry keep their resolved value.
pub fn apply_author_overrides(model: &mut AthleteModel, source: &ActivitySourceData) {
    if let Some(weight) = source.athlete_weight {
        model.settings.weight = weight;
    }
    if let Some(gender) = source.athlete_gender {
        model.gender = gender;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AthleteSettings, Gender};
    use time::macros::date;

    fn model(weight: f64, gender: Gender) -> AthleteModel {
        AthleteModel {
            gender,
            settings: AthleteSettings {
                weight,
                ..AthleteSettings::default()
            },
            zones: Default::default(),
        }
    }

    fn resolver() -> AthleteModelResolver {
        AthleteModelResolver::new(
            model(80.0, Gender::Male),
            vec![
                AthleteProfileSnapshot {
                    effective_from: date!(2023 - 06 - 01),
                    model: model(72.0, Gender::Male),
                },
                AthleteProfileSnapshot {
                    effective_from: date!(2023 - 01 - 01),
                    model: model(75.0, Gender::Male),
                },
            ],
        )
    }

    #[test]
    fn resolves_snapshot_in_effect() {
        let resolver = resolver();
        assert_eq!(resolver.resolve(date!(2023 - 03 - 15)).settings.weight, 75.0);
        assert_eq!(resolver.resolve(date!(2023 - 07 - 01)).settings.weight, 72.0);
    }

    #[test]
    fn snapshot_applies_on_its_effective_day() {
        let resolver = resolver();
        assert_eq!(resolver.resolve(date!(2023 - 06 - 01)).settings.weight, 72.0);
        assert_eq!(resolver.resolve(date!(2023 - 05 - 31)).settings.weight, 75.0);
    }

    #[test]
    fn falls_back_to_baseline_before_first_snapshot() {
        let resolver = resolver();
        assert_eq!(resolver.resolve(date!(2022 - 12 - 31)).settings.weight, 80.0);
        let empty = AthleteModelResolver::new(model(64.0, Gender::Female), Vec::new());
        assert_eq!(empty.resolve(date!(2030 - 01 - 01)).gender, Gender::Female);
    }

    #[test]
    fn author_overrides_replace_weight_and_gender() {
        let mut resolved = model(60.0, Gender::Female);
        let source = ActivitySourceData {
            athlete_weight: Some(70.0),
            athlete_gender: Some(Gender::Male),
            ..ActivitySourceData::default()
        };
        apply_author_overrides(&mut resolved, &source);
        assert_eq!(resolved.settings.weight, 70.0);
        assert_eq!(resolved.gender, Gender::Male);
    }

    #[test]
    fn author_overrides_keep_missing_fields() {
        let mut resolved = model(60.0, Gender::Female);
        apply_author_overrides(&mut resolved, &ActivitySourceData::default());
        assert_eq!(resolved.settings.weight, 60.0);
        assert_eq!(resolved.gender, Gender::Female);
    }
}
