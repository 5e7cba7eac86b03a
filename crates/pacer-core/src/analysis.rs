//! Per-activity statistics computed inside the compute worker.

use crate::compute_worker::{ActivityAnalyzer, ComputeTask};
use crate::model::{
    AnalysisData, CadenceStats, ElevationStats, Gender, HeartRateStats, PowerStats, ZoneBound,
    ZoneTime,
};
use anyhow::bail;

/// Samples below this speed (m/s) are treated as stopped.
const MOVING_SPEED_MPS: f64 = 0.5;
/// Rolling window for normalized power, in samples.
const NORMALIZED_POWER_WINDOW: usize = 30;
const MAX_GRADE: f64 = 0.45;

#[derive(Clone, Debug)]
pub struct StandardAnalyzer {
    moving_speed_threshold: f64,
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self {
            moving_speed_threshold: MOVING_SPEED_MPS,
        }
    }
}

impl StandardAnalyzer {
    pub fn with_moving_threshold(mut self, speed_mps: f64) -> Self {
        self.moving_speed_threshold = speed_mps;
        self
    }
}

impl ActivityAnalyzer for StandardAnalyzer {
    fn analyze(&self, task: &ComputeTask) -> anyhow::Result<AnalysisData> {
        let streams = &task.streams;
        let source = &task.source_data;
        let (start, end) = sample_range(streams.len(), task.options.bounds)?;

        if start == end {
            return Ok(AnalysisData {
                elapsed_time: source.elapsed_time.unwrap_or(0.0),
                moving_time: source.moving_time.unwrap_or(0.0),
                distance: source.distance.unwrap_or(0.0),
                average_speed: speed(
                    source.distance.unwrap_or(0.0),
                    source.moving_time.unwrap_or(0.0),
                ),
                ..AnalysisData::default()
            });
        }

        let time = &streams.time[start..end];
        let deltas = sample_durations(time);
        let velocity = channel(&streams.velocity_smooth, start, end);
        let bounded = task.options.bounds.is_some();

        let elapsed_time = match source.elapsed_time {
            Some(elapsed) if !bounded => elapsed,
            _ => time[time.len() - 1] - time[0],
        };
        let moving_time = match velocity {
            Some(velocity) => velocity
                .iter()
                .zip(&deltas)
                .filter(|(speed, _)| **speed > self.moving_speed_threshold)
                .map(|(_, dt)| dt)
                .sum(),
            None if !bounded => source.moving_time.unwrap_or(elapsed_time),
            None => elapsed_time,
        };
        let distance = match channel(&streams.distance, start, end) {
            Some(distance) => distance[distance.len() - 1] - distance[0],
            None if !bounded => source.distance.unwrap_or(0.0),
            None => 0.0,
        };
        let max_speed = velocity.map(max).unwrap_or(0.0);

        let grade_adjusted_speed = match (task.supports_gap, velocity, channel(&streams.grade_smooth, start, end)) {
            (true, Some(velocity), Some(grade)) => {
                Some(grade_adjusted_speed(velocity, grade, &deltas, self.moving_speed_threshold))
            }
            _ => None,
        };

        let heart_rate = channel(&streams.heartrate, start, end)
            .map(|samples| heart_rate_stats(samples, &deltas, task));
        let power = channel(&streams.watts, start, end)
            .map(|samples| power_stats(samples, &deltas, moving_time, task));
        let cadence = channel(&streams.cadence, start, end).and_then(cadence_stats);
        let elevation = channel(&streams.altitude, start, end).map(elevation_stats);

        Ok(AnalysisData {
            elapsed_time,
            moving_time,
            distance,
            average_speed: speed(distance, moving_time),
            max_speed,
            grade_adjusted_speed,
            heart_rate,
            power,
            cadence,
            elevation,
        })
    }
}

fn sample_range(len: usize, bounds: Option<(usize, usize)>) -> anyhow::Result<(usize, usize)> {
    match bounds {
        None => Ok((0, len)),
        Some((start, end)) if start < end && end <= len => Ok((start, end)),
        Some((start, end)) => bail!("invalid bounds {start}..{end} for {len} samples"),
    }
}

/// A channel is usable only when it covers every sample of the time stream.
fn channel(values: &[f64], start: usize, end: usize) -> Option<&[f64]> {
    if values.len() >= end && end > start {
        Some(&values[start..end])
    } else {
        None
    }
}

/// Seconds each sample stands for; the first sample covers nothing.
fn sample_durations(time: &[f64]) -> Vec<f64> {
    let mut deltas = Vec::with_capacity(time.len());
    deltas.push(0.0);
    deltas.extend(time.windows(2).map(|pair| (pair[1] - pair[0]).max(0.0)));
    deltas
}

fn speed(distance: f64, seconds: f64) -> f64 {
    if seconds > 0.0 { distance / seconds } else { 0.0 }
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

fn weighted_average(values: &[f64], deltas: &[f64]) -> f64 {
    let total: f64 = deltas.iter().sum();
    if total <= 0.0 {
        return values.iter().sum::<f64>() / values.len().max(1) as f64;
    }
    values.iter().zip(deltas).map(|(value, dt)| value * dt).sum::<f64>() / total
}

fn zone_distribution(values: &[f64], deltas: &[f64], zones: &[ZoneBound]) -> Vec<ZoneTime> {
    let total: f64 = deltas.iter().sum();
    zones
        .iter()
        .map(|zone| {
            let seconds: f64 = values
                .iter()
                .zip(deltas)
                .filter(|(value, _)| **value >= zone.from && **value < zone.to)
                .map(|(_, dt)| dt)
                .sum();
            ZoneTime {
                from: zone.from,
                to: zone.to,
                seconds,
                percent: if total > 0.0 { seconds / total * 100.0 } else { 0.0 },
            }
        })
        .collect()
}

fn heart_rate_stats(samples: &[f64], deltas: &[f64], task: &ComputeTask) -> HeartRateStats {
    let settings = &task.athlete_model.settings;
    let reserve = settings.max_hr - settings.rest_hr;
    let factor = match task.athlete_model.gender {
        Gender::Male => 1.92,
        Gender::Female => 1.67,
    };
    let trimp = if reserve > 0.0 {
        samples
            .iter()
            .zip(deltas)
            .map(|(hr, dt)| {
                let ratio = ((hr - settings.rest_hr) / reserve).clamp(0.0, 1.0);
                dt / 60.0 * ratio * 0.64 * (factor * ratio).exp()
            })
            .sum()
    } else {
        0.0
    };
    let zones = &task.athlete_model.zones.heart_rate;
    HeartRateStats {
        average: weighted_average(samples, deltas),
        max: max(samples),
        trimp,
        zones: (task.options.return_zones && !zones.is_empty())
            .then(|| zone_distribution(samples, deltas, zones)),
    }
}

fn power_stats(samples: &[f64], deltas: &[f64], moving_time: f64, task: &ComputeTask) -> PowerStats {
    let settings = &task.athlete_model.settings;
    let average = weighted_average(samples, deltas);
    let normalized = normalized_power(samples).unwrap_or(average);
    let intensity_factor = settings
        .cycling_ftp
        .filter(|ftp| *ftp > 0.0)
        .map(|ftp| normalized / ftp);
    let training_stress_score = settings
        .cycling_ftp
        .zip(intensity_factor)
        .filter(|(ftp, _)| *ftp > 0.0)
        .map(|(ftp, factor)| moving_time * normalized * factor / (ftp * 3600.0) * 100.0);
    let zones = &task.athlete_model.zones.power;
    PowerStats {
        average,
        max: max(samples),
        normalized,
        watts_per_kg: if settings.weight > 0.0 {
            average / settings.weight
        } else {
            0.0
        },
        work_kj: samples.iter().zip(deltas).map(|(watts, dt)| watts * dt).sum::<f64>() / 1000.0,
        intensity_factor,
        training_stress_score,
        estimated: !task.has_power_meter,
        zones: (task.options.return_zones && !zones.is_empty())
            .then(|| zone_distribution(samples, deltas, zones)),
    }
}

fn normalized_power(samples: &[f64]) -> Option<f64> {
    if samples.len() < NORMALIZED_POWER_WINDOW {
        return None;
    }
    let window = NORMALIZED_POWER_WINDOW as f64;
    let mut sum: f64 = samples[..NORMALIZED_POWER_WINDOW].iter().sum();
    let mut fourth_powers = (sum / window).powi(4);
    for index in NORMALIZED_POWER_WINDOW..samples.len() {
        sum += samples[index] - samples[index - NORMALIZED_POWER_WINDOW];
        fourth_powers += (sum / window).powi(4);
    }
    let count = (samples.len() - NORMALIZED_POWER_WINDOW + 1) as f64;
    Some((fourth_powers / count).powf(0.25))
}

fn cadence_stats(samples: &[f64]) -> Option<CadenceStats> {
    let active: Vec<f64> = samples.iter().copied().filter(|value| *value > 0.0).collect();
    if active.is_empty() {
        return None;
    }
    Some(CadenceStats {
        average: active.iter().sum::<f64>() / active.len() as f64,
        max: max(&active),
    })
}

fn elevation_stats(samples: &[f64]) -> ElevationStats {
    let (gain, loss) = samples.windows(2).fold((0.0, 0.0), |(gain, loss), pair| {
        let diff = pair[1] - pair[0];
        if diff > 0.0 {
            (gain + diff, loss)
        } else {
            (gain, loss - diff)
        }
    });
    ElevationStats {
        gain,
        loss,
        min: samples.iter().copied().fold(f64::INFINITY, f64::min),
        max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Energy cost of running on a grade relative to flat ground (Minetti et al.).
fn grade_cost_factor(grade_percent: f64) -> f64 {
    let i = (grade_percent / 100.0).clamp(-MAX_GRADE, MAX_GRADE);
    let cost = 155.4 * i.powi(5) - 30.4 * i.powi(4) - 43.3 * i.powi(3) + 46.3 * i.powi(2)
        + 19.5 * i
        + 3.6;
    cost / 3.6
}

fn grade_adjusted_speed(velocity: &[f64], grade: &[f64], deltas: &[f64], threshold: f64) -> f64 {
    let mut distance = 0.0;
    let mut seconds = 0.0;
    for ((speed, grade), dt) in velocity.iter().zip(grade).zip(deltas) {
        if *speed > threshold {
            distance += speed * grade_cost_factor(*grade) * dt;
            seconds += dt;
        }
    }
    self::speed(distance, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_worker::ComputeOptions;
    use crate::model::{
        ActivitySourceData, ActivityStreams, ActivityType, AthleteModel, AthleteZones,
    };

    fn steady_streams(samples: usize) -> ActivityStreams {
        ActivityStreams {
            time: (0..samples).map(|i| i as f64).collect(),
            distance: (0..samples).map(|i| i as f64 * 5.0).collect(),
            velocity_smooth: vec![5.0; samples],
            heartrate: vec![150.0; samples],
            watts: vec![200.0; samples],
            cadence: vec![90.0; samples],
            altitude: (0..samples).map(|i| 100.0 + (i % 2) as f64).collect(),
            grade_smooth: vec![0.0; samples],
        }
    }

    fn task(streams: ActivityStreams) -> ComputeTask {
        let mut athlete_model = AthleteModel::default();
        athlete_model.settings.weight = 80.0;
        athlete_model.settings.cycling_ftp = Some(250.0);
        athlete_model.zones = AthleteZones {
            heart_rate: vec![
                ZoneBound { from: 0.0, to: 140.0 },
                ZoneBound { from: 140.0, to: 220.0 },
            ],
            power: vec![ZoneBound { from: 0.0, to: 1000.0 }],
        };
        ComputeTask {
            activity_id: "1".into(),
            activity_type: ActivityType::Ride,
            is_trainer: false,
            is_owner: true,
            supports_gap: false,
            has_power_meter: true,
            athlete_model,
            source_data: ActivitySourceData::default(),
            streams,
            options: ComputeOptions::default(),
        }
    }

    #[test]
    fn steady_ride_statistics() {
        let analysis = StandardAnalyzer::default()
            .analyze(&task(steady_streams(61)))
            .unwrap();
        assert_eq!(analysis.elapsed_time, 60.0);
        assert_eq!(analysis.moving_time, 60.0);
        assert_eq!(analysis.distance, 300.0);
        assert_eq!(analysis.average_speed, 5.0);
        assert_eq!(analysis.max_speed, 5.0);
        assert!(analysis.grade_adjusted_speed.is_none());

        let power = analysis.power.unwrap();
        assert_eq!(power.average, 200.0);
        assert!((power.normalized - 200.0).abs() < 1e-9);
        assert_eq!(power.watts_per_kg, 2.5);
        assert_eq!(power.work_kj, 12.0);
        assert!((power.intensity_factor.unwrap() - 0.8).abs() < 1e-9);
        assert!(!power.estimated);

        let cadence = analysis.cadence.unwrap();
        assert_eq!(cadence.average, 90.0);
        let elevation = analysis.elevation.unwrap();
        assert_eq!(elevation.gain, 30.0);
        assert_eq!(elevation.loss, 30.0);
    }

    #[test]
    fn heart_rate_zones_split_by_bounds() {
        let analysis = StandardAnalyzer::default()
            .analyze(&task(steady_streams(61)))
            .unwrap();
        let hr = analysis.heart_rate.unwrap();
        assert_eq!(hr.average, 150.0);
        let zones = hr.zones.unwrap();
        assert_eq!(zones[0].seconds, 0.0);
        assert_eq!(zones[1].seconds, 60.0);
        assert_eq!(zones[1].percent, 100.0);
    }

    #[test]
    fn zones_omitted_when_not_requested() {
        let mut task = task(steady_streams(61));
        task.options.return_zones = false;
        let analysis = StandardAnalyzer::default().analyze(&task).unwrap();
        assert!(analysis.heart_rate.unwrap().zones.is_none());
        assert!(analysis.power.unwrap().zones.is_none());
    }

    #[test]
    fn trimp_uses_gender_coefficient() {
        let male = task(steady_streams(61));
        let mut female = male.clone();
        female.athlete_model.gender = Gender::Female;
        let analyzer = StandardAnalyzer::default();
        let male_trimp = analyzer.analyze(&male).unwrap().heart_rate.unwrap().trimp;
        let female_trimp = analyzer.analyze(&female).unwrap().heart_rate.unwrap().trimp;
        assert!(male_trimp > female_trimp);
        assert!(female_trimp > 0.0);
    }

    #[test]
    fn power_without_meter_is_estimated() {
        let mut task = task(steady_streams(61));
        task.has_power_meter = false;
        let analysis = StandardAnalyzer::default().analyze(&task).unwrap();
        assert!(analysis.power.unwrap().estimated);
    }

    #[test]
    fn bounds_restrict_samples() {
        let mut task = task(steady_streams(61));
        task.options.bounds = Some((10, 21));
        let analysis = StandardAnalyzer::default().analyze(&task).unwrap();
        assert_eq!(analysis.elapsed_time, 10.0);
        assert_eq!(analysis.distance, 50.0);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut task = task(steady_streams(10));
        task.options.bounds = Some((5, 50));
        assert!(StandardAnalyzer::default().analyze(&task).is_err());
    }

    #[test]
    fn stopped_samples_do_not_count_as_moving() {
        let mut streams = steady_streams(61);
        for speed in streams.velocity_smooth.iter_mut().skip(31) {
            *speed = 0.0;
        }
        let analysis = StandardAnalyzer::default().analyze(&task(streams)).unwrap();
        assert_eq!(analysis.moving_time, 30.0);
    }

    #[test]
    fn uphill_running_raises_adjusted_speed() {
        let mut streams = steady_streams(61);
        streams.grade_smooth = vec![8.0; 61];
        let mut task = task(streams);
        task.activity_type = ActivityType::Run;
        task.supports_gap = true;
        let analysis = StandardAnalyzer::default().analyze(&task).unwrap();
        assert!(analysis.grade_adjusted_speed.unwrap() > analysis.average_speed);
    }

    #[test]
    fn empty_streams_fall_back_to_source_summary() {
        let mut task = task(ActivityStreams::default());
        task.source_data.distance = Some(1000.0);
        task.source_data.moving_time = Some(200.0);
        let analysis = StandardAnalyzer::default().analyze(&task).unwrap();
        assert_eq!(analysis.distance, 1000.0);
        assert_eq!(analysis.average_speed, 5.0);
        assert!(analysis.heart_rate.is_none());
    }
}
