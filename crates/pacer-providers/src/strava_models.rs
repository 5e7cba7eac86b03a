use pacer_core::model::{ActivityStreams, ActivityType, Gender};
use serde::Deserialize;
use std::collections::HashMap;
use time::OffsetDateTime;

/// Stream keys requested for every activity.
pub(crate) const STREAM_KEYS: &str =
    "time,distance,velocity_smooth,heartrate,watts,cadence,altitude,grade_smooth";

#[derive(Debug, Deserialize)]
pub(crate) struct AthleteRef {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) weight: Option<f64>,
    #[serde(default)]
    pub(crate) sex: Option<String>,
}

impl AthleteRef {
    pub(crate) fn gender(&self) -> Option<Gender> {
        match self.sex.as_deref() {
            Some("M") => Some(Gender::Male),
            Some("F") => Some(Gender::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SummaryActivity {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) sport_type: Option<String>,
    #[serde(default, rename = "type")]
    pub(crate) legacy_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) start_date: OffsetDateTime,
    #[serde(default)]
    pub(crate) trainer: bool,
    pub(crate) athlete: AthleteRef,
}

impl SummaryActivity {
    pub(crate) fn activity_type(&self) -> ActivityType {
        let name = self
            .sport_type
            .as_deref()
            .or(self.legacy_type.as_deref())
            .unwrap_or_default();
        activity_type_from_name(name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailedActivity {
    #[serde(default)]
    pub(crate) moving_time: Option<f64>,
    #[serde(default)]
    pub(crate) elapsed_time: Option<f64>,
    #[serde(default)]
    pub(crate) distance: Option<f64>,
    #[serde(default)]
    pub(crate) total_elevation_gain: Option<f64>,
    #[serde(default)]
    pub(crate) device_watts: bool,
    pub(crate) athlete: AthleteRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamData {
    #[serde(default)]
    pub(crate) data: Vec<f64>,
}

/// Streams keyed by type, as returned with `key_by_type=true`.
pub(crate) type StreamSet = HashMap<String, StreamData>;

pub(crate) fn streams_from_set(mut set: StreamSet) -> ActivityStreams {
    let mut take = |key: &str| set.remove(key).map(|stream| stream.data).unwrap_or_default();
    ActivityStreams {
        time: take("time"),
        distance: take("distance"),
        velocity_smooth: take("velocity_smooth"),
        heartrate: take("heartrate"),
        watts: take("watts"),
        cadence: take("cadence"),
        altitude: take("altitude"),
        grade_smooth: take("grade_smooth"),
    }
}

pub(crate) fn activity_type_from_name(name: &str) -> ActivityType {
    match name {
        "Ride" | "MountainBikeRide" | "GravelRide" => ActivityType::Ride,
        "VirtualRide" => ActivityType::VirtualRide,
        "EBikeRide" | "EMountainBikeRide" => ActivityType::EBikeRide,
        "Run" | "TrailRun" => ActivityType::Run,
        "VirtualRun" => ActivityType::VirtualRun,
        "Walk" => ActivityType::Walk,
        "Hike" => ActivityType::Hike,
        "Swim" => ActivityType::Swim,
        _ => ActivityType::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_prefers_sport_type() {
        let value = json!({
            "id": 11,
            "name": "Lunch run",
            "sport_type": "TrailRun",
            "type": "Run",
            "start_date": "2024-02-03T12:00:00Z",
            "athlete": { "id": 7 }
        });
        let summary: SummaryActivity = serde_json::from_value(value).unwrap();
        assert_eq!(summary.activity_type(), ActivityType::Run);
        assert!(!summary.trainer);
    }

    #[test]
    fn missing_streams_stay_empty() {
        let set: StreamSet = serde_json::from_value(json!({
            "time": { "data": [0.0, 1.0, 2.0] },
            "heartrate": { "data": [120.0, 121.0, 122.0] }
        }))
        .unwrap();
        let streams = streams_from_set(set);
        assert_eq!(streams.len(), 3);
        assert_eq!(streams.heartrate.len(), 3);
        assert!(streams.watts.is_empty());
    }

    #[test]
    fn athlete_sex_maps_to_gender() {
        let athlete: AthleteRef =
            serde_json::from_value(json!({ "id": 1, "sex": "F", "weight": 58.0 })).unwrap();
        assert_eq!(athlete.gender(), Some(Gender::Female));
        assert_eq!(athlete.weight, Some(58.0));
    }
}
