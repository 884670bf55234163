//! HRV analyzer
//!
//! Extracts a nightly RMSSD series, a trailing-window median baseline,
//! and a signed trend delta. When only heart-rate observations exist for
//! a night, RMSSD is derived from successive inter-beat-interval
//! differences; when neither exists the night is simply absent. Nothing
//! is interpolated.

use crate::config::HrvConfig;
use crate::store::RecordStore;
use crate::types::{HrvSummary, NightlyRmssd, SignalKind};
use chrono::{Duration, NaiveDate};

/// Minimum HR samples in a night before deriving RMSSD from intervals
const MIN_HR_SAMPLES: usize = 5;

/// Analyze nightly HRV. Returns None when no night has usable data,
/// which the assembler renders as an unavailable section.
pub fn analyze(store: &RecordStore, config: &HrvConfig) -> Option<HrvSummary> {
    let nightly = nightly_series(store, config);
    if nightly.is_empty() {
        return None;
    }

    let latest = nightly.last().map(|n| n.rmssd_ms);

    // Baseline excludes the latest night so the delta compares today
    // against history
    let history: Vec<f64> = nightly
        .iter()
        .rev()
        .skip(1)
        .take(config.baseline_window_days)
        .map(|n| n.rmssd_ms)
        .collect();
    let baseline = median(&history);

    let trend_delta = match (latest, baseline) {
        (Some(l), Some(b)) => Some(l - b),
        _ => None,
    };

    let trailing_week: Vec<f64> = nightly
        .iter()
        .rev()
        .take(7)
        .rev()
        .map(|n| n.rmssd_ms)
        .collect();
    let slope = linear_slope(&trailing_week);

    Some(HrvSummary {
        low_data: nightly.len() < config.min_nights,
        nightly,
        baseline_rmssd_ms: baseline,
        latest_rmssd_ms: latest,
        trend_delta_ms: trend_delta,
        slope_ms_per_day: slope,
    })
}

/// One RMSSD value per night with usable data, attributed to the wake
/// date, in date order
fn nightly_series(store: &RecordStore, config: &HrvConfig) -> Vec<NightlyRmssd> {
    let mut nights = Vec::new();
    let days = store.all_days();
    let Some(&first) = days.first() else {
        return nights;
    };
    let Some(&last) = days.last() else {
        return nights;
    };

    // Wake dates run from the first day through the day after the last,
    // since a final evening's data belongs to the next morning's night
    let mut wake_date = first;
    let end = last + Duration::days(1);
    while wake_date <= end {
        if let Some(night) = night_rmssd(store, wake_date, config) {
            nights.push(night);
        }
        wake_date += Duration::days(1);
    }
    nights
}

fn night_rmssd(
    store: &RecordStore,
    wake_date: NaiveDate,
    config: &HrvConfig,
) -> Option<NightlyRmssd> {
    let start = (wake_date - Duration::days(1))
        .and_hms_opt(config.night_start_hour, 0, 0)?;
    let end = wake_date.and_hms_opt(config.night_end_hour, 0, 0)?;

    // Direct RMSSD observations win over derivation
    let direct: Vec<f64> = store
        .in_range(SignalKind::HrvRmssd, start, end)
        .iter()
        .map(|o| o.value)
        .collect();
    if !direct.is_empty() {
        return Some(NightlyRmssd {
            date: wake_date,
            rmssd_ms: direct.iter().sum::<f64>() / direct.len() as f64,
            derived_from_hr: false,
        });
    }

    // Fall back to the successive-difference formulation over inter-beat
    // intervals implied by the HR series
    let hr: Vec<f64> = store
        .in_range(SignalKind::HeartRate, start, end)
        .iter()
        .map(|o| o.value)
        .filter(|v| *v > 0.0)
        .collect();
    if hr.len() < MIN_HR_SAMPLES {
        return None;
    }
    let intervals: Vec<f64> = hr.iter().map(|bpm| 60_000.0 / bpm).collect();
    let sq_diff_sum: f64 = intervals
        .windows(2)
        .map(|w| (w[1] - w[0]).powi(2))
        .sum();
    let rmssd = (sq_diff_sum / (intervals.len() - 1) as f64).sqrt();

    Some(NightlyRmssd {
        date: wake_date,
        rmssd_ms: rmssd,
        derived_from_hr: true,
    })
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Least-squares slope of values against their ordinal position
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use chrono::NaiveDate;

    fn night_obs(
        wake_day: u32,
        hour: u32,
        kind: SignalKind,
        value: f64,
    ) -> Observation {
        // Place the observation at 02:00-ish of the wake day
        Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, wake_day)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            signal_kind: kind,
            value,
            unit: "ms".to_string(),
            source_tag: "test".to_string(),
        }
    }

    #[test]
    fn test_direct_rmssd_nights() {
        let mut observations = Vec::new();
        for day in 1..=5 {
            observations.push(night_obs(day, 2, SignalKind::HrvRmssd, 60.0 + day as f64));
            observations.push(night_obs(day, 4, SignalKind::HrvRmssd, 62.0 + day as f64));
        }
        let store = RecordStore::from_observations(observations);
        let summary = analyze(&store, &HrvConfig::default()).unwrap();

        assert_eq!(summary.nightly.len(), 5);
        assert!(!summary.nightly[0].derived_from_hr);
        assert!(!summary.low_data);
        // Latest night mean = (65 + 67) / 2 = 66
        assert!((summary.latest_rmssd_ms.unwrap() - 66.0).abs() < 1e-9);
        // Baseline is the median of the four prior nights
        assert!(summary.baseline_rmssd_ms.is_some());
        assert!(summary.trend_delta_ms.unwrap() > 0.0);
    }

    #[test]
    fn test_rmssd_derived_from_hr_when_absent() {
        let mut observations = Vec::new();
        // Alternating 55/58 bpm through one night gives nonzero interval
        // differences
        for i in 0..12u32 {
            let bpm = if i % 2 == 0 { 55.0 } else { 58.0 };
            observations.push(night_obs(2, i % 8, SignalKind::HeartRate, bpm));
        }
        let store = RecordStore::from_observations(observations);
        let summary = analyze(&store, &HrvConfig::default()).unwrap();

        assert_eq!(summary.nightly.len(), 1);
        assert!(summary.nightly[0].derived_from_hr);
        assert!(summary.nightly[0].rmssd_ms > 0.0);
        assert!(summary.low_data);
    }

    #[test]
    fn test_no_data_yields_none_not_zero() {
        let store = RecordStore::from_observations(vec![night_obs(
            1,
            10,
            SignalKind::ReactionTime,
            150.0,
        )]);
        assert!(analyze(&store, &HrvConfig::default()).is_none());
    }

    #[test]
    fn test_slope_detects_decline() {
        let values = vec![70.0, 67.0, 64.0, 61.0, 58.0];
        let slope = linear_slope(&values).unwrap();
        assert!((slope - -3.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_night_never_panics() {
        let mut observations = Vec::new();
        for day in 1..=5 {
            observations.push(night_obs(day, 2, SignalKind::HrvRmssd, 60.0 + day as f64));
        }
        observations.push(night_obs(6, 2, SignalKind::HrvRmssd, f64::NAN));
        let store = RecordStore::from_observations(observations);

        // The baseline median must tolerate a NaN night from a library
        // caller instead of panicking mid-sort
        let summary = analyze(&store, &HrvConfig::default()).unwrap();
        assert_eq!(summary.nightly.len(), 6);
        assert!(summary.baseline_rmssd_ms.unwrap().is_finite());
    }

    #[test]
    fn test_single_night_has_no_baseline() {
        let store = RecordStore::from_observations(vec![night_obs(
            1,
            3,
            SignalKind::HrvRmssd,
            64.0,
        )]);
        let summary = analyze(&store, &HrvConfig::default()).unwrap();
        assert!(summary.baseline_rmssd_ms.is_none());
        assert!(summary.trend_delta_ms.is_none());
        assert!(summary.low_data);
    }
}
