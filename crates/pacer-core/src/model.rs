use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Date, OffsetDateTime};

time::serde::format_description!(pub(crate) iso_date, Date, "[year]-[month]-[day]");

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Ride,
    VirtualRide,
    EBikeRide,
    Run,
    VirtualRun,
    Walk,
    Hike,
    Swim,
    #[serde(other)]
    Other,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Ride => "ride",
            ActivityType::VirtualRide => "virtual_ride",
            ActivityType::EBikeRide => "e_bike_ride",
            ActivityType::Run => "run",
            ActivityType::VirtualRun => "virtual_run",
            ActivityType::Walk => "walk",
            ActivityType::Hike => "hike",
            ActivityType::Swim => "swim",
            ActivityType::Other => "other",
        }
    }

    pub fn is_cycling(&self) -> bool {
        matches!(
            self,
            ActivityType::Ride | ActivityType::VirtualRide | ActivityType::EBikeRide
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ActivityType::Run | ActivityType::VirtualRun)
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one activity as listed by the remote source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub id: String,
    pub name: String,
    pub activity_type: ActivityType,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// Recorded by the authenticated athlete. Strava's `/athlete/activities`
    /// only lists the athlete's own activities, so it always reports `true`;
    /// `false` comes from sources that list shared or imported activities, and
    /// makes the compute use the author's weight and gender.
    pub is_owner: bool,
    #[serde(default)]
    pub is_trainer: bool,
    #[serde(default)]
    pub supports_gap: bool,
}

/// Raw per-sample channels of one activity. Every channel is indexed like `time`;
/// a channel the recording device did not capture is left empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStreams {
    #[serde(default)]
    pub time: Vec<f64>,
    #[serde(default)]
    pub distance: Vec<f64>,
    #[serde(default)]
    pub velocity_smooth: Vec<f64>,
    #[serde(default)]
    pub heartrate: Vec<f64>,
    #[serde(default)]
    pub watts: Vec<f64>,
    #[serde(default)]
    pub cadence: Vec<f64>,
    #[serde(default)]
    pub altitude: Vec<f64>,
    #[serde(default)]
    pub grade_smooth: Vec<f64>,
}

impl ActivityStreams {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Lightweight metadata shipped alongside the streams.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySourceData {
    #[serde(default)]
    pub moving_time: Option<f64>,
    #[serde(default)]
    pub elapsed_time: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub elevation_gain: Option<f64>,
    #[serde(default)]
    pub has_power_meter: bool,
    /// Weight recorded by the activity author, when it is not the requesting athlete.
    #[serde(default)]
    pub athlete_weight: Option<f64>,
    #[serde(default)]
    pub athlete_gender: Option<Gender>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchedActivity {
    pub source: ActivitySourceData,
    pub streams: ActivityStreams,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneBound {
    pub from: f64,
    pub to: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AthleteZones {
    #[serde(default)]
    pub heart_rate: Vec<ZoneBound>,
    #[serde(default)]
    pub power: Vec<ZoneBound>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AthleteSettings {
    pub weight: f64,
    pub max_hr: f64,
    pub rest_hr: f64,
    #[serde(default)]
    pub lthr: Option<f64>,
    #[serde(default)]
    pub cycling_ftp: Option<f64>,
}

impl Default for AthleteSettings {
    fn default() -> Self {
        Self {
            weight: 70.0,
            max_hr: 190.0,
            rest_hr: 65.0,
            lthr: None,
            cycling_ftp: None,
        }
    }
}

/// Physiological profile used to compute one activity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AthleteModel {
    pub gender: Gender,
    pub settings: AthleteSettings,
    #[serde(default)]
    pub zones: AthleteZones,
}

/// An athlete profile that applies from `effective_from` until the next snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfileSnapshot {
    #[serde(with = "iso_date")]
    pub effective_from: Date,
    pub model: AthleteModel,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneTime {
    pub from: f64,
    pub to: f64,
    pub seconds: f64,
    pub percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeartRateStats {
    pub average: f64,
    pub max: f64,
    pub trimp: f64,
    #[serde(default)]
    pub zones: Option<Vec<ZoneTime>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerStats {
    pub average: f64,
    pub max: f64,
    pub normalized: f64,
    pub watts_per_kg: f64,
    pub work_kj: f64,
    #[serde(default)]
    pub intensity_factor: Option<f64>,
    #[serde(default)]
    pub training_stress_score: Option<f64>,
    /// True when the stream comes from an estimate rather than a power meter.
    pub estimated: bool,
    #[serde(default)]
    pub zones: Option<Vec<ZoneTime>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CadenceStats {
    pub average: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElevationStats {
    pub gain: f64,
    pub loss: f64,
    pub min: f64,
    pub max: f64,
}

/// Derived statistics of one activity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    pub elapsed_time: f64,
    pub moving_time: f64,
    pub distance: f64,
    pub average_speed: f64,
    pub max_speed: f64,
    #[serde(default)]
    pub grade_adjusted_speed: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<HeartRateStats>,
    #[serde(default)]
    pub power: Option<PowerStats>,
    #[serde(default)]
    pub cadence: Option<CadenceStats>,
    #[serde(default)]
    pub elevation: Option<ElevationStats>,
}
