//! Daily strain scorer
//!
//! Classifies each epoch into an intensity bucket from the heart-rate
//! reserve fraction, falling back to motion magnitude when no HR reading
//! is near the epoch. Weighted bucket minutes accumulate into a raw load
//! that is log-style compressed onto a bounded 0-21 scale:
//!
//! `score = cap * (1 - exp(-raw / compression_scale))`
//!
//! The compression keeps the score monotone non-decreasing in
//! accumulated intensity while saturating below the cap.

use crate::config::StrainConfig;
use crate::store::RecordStore;
use crate::types::{BucketMinutes, SignalKind, StrainDay, StrainLevel};
use chrono::{Duration, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Rest,
    Light,
    Moderate,
    Vigorous,
}

/// Score every day in the store. Returns None when neither motion nor HR
/// observations exist anywhere, which the assembler renders as an
/// unavailable section.
pub fn analyze(store: &RecordStore, config: &StrainConfig) -> Option<Vec<StrainDay>> {
    if !store.has_kind(SignalKind::MotionEpoch) && !store.has_kind(SignalKind::HeartRate) {
        return None;
    }
    Some(
        store
            .all_days()
            .into_iter()
            .map(|date| {
                let epochs = day_epochs(store, date);
                score_day(date, &epochs, config)
            })
            .collect(),
    )
}

/// Epoch timeline for one day: motion epochs paired with the nearest
/// preceding HR reading, or the HR stream alone when motion is absent
fn day_epochs(
    store: &RecordStore,
    date: chrono::NaiveDate,
) -> Vec<(NaiveDateTime, Option<f64>, Option<f64>)> {
    let motion = store.on_day(SignalKind::MotionEpoch, date);
    let hr = store.on_day(SignalKind::HeartRate, date);

    if motion.is_empty() {
        return hr
            .iter()
            .map(|o| (o.timestamp, None, Some(o.value)))
            .collect();
    }

    let mut epochs = Vec::with_capacity(motion.len());
    let mut hr_idx = 0usize;
    for m in &motion {
        let paired = if hr.is_empty() {
            None
        } else {
            while hr_idx + 1 < hr.len() && hr[hr_idx + 1].timestamp <= m.timestamp {
                hr_idx += 1;
            }
            if hr[hr_idx].timestamp <= m.timestamp
                && (m.timestamp - hr[hr_idx].timestamp) <= Duration::minutes(5)
            {
                Some(hr[hr_idx].value)
            } else {
                None
            }
        };
        epochs.push((m.timestamp, Some(m.value), paired));
    }
    epochs
}

fn classify(motion: Option<f64>, hr: Option<f64>, config: &StrainConfig) -> Bucket {
    if let Some(bpm) = hr {
        let reserve = ((bpm - config.resting_hr) / (config.max_hr - config.resting_hr))
            .clamp(0.0, 1.0);
        let [b0, b1, b2] = config.hr_reserve_bounds;
        return if reserve < b0 {
            Bucket::Rest
        } else if reserve < b1 {
            Bucket::Light
        } else if reserve < b2 {
            Bucket::Moderate
        } else {
            Bucket::Vigorous
        };
    }
    let magnitude = motion.unwrap_or(0.0);
    let [m0, m1, m2] = config.motion_bounds;
    if magnitude < m0 {
        Bucket::Rest
    } else if magnitude < m1 {
        Bucket::Light
    } else if magnitude < m2 {
        Bucket::Moderate
    } else {
        Bucket::Vigorous
    }
}

fn score_day(
    date: chrono::NaiveDate,
    epochs: &[(NaiveDateTime, Option<f64>, Option<f64>)],
    config: &StrainConfig,
) -> StrainDay {
    let mut buckets = BucketMinutes::default();
    for &(_, motion, hr) in epochs {
        let slot = match classify(motion, hr, config) {
            Bucket::Rest => &mut buckets.rest_min,
            Bucket::Light => &mut buckets.light_min,
            Bucket::Moderate => &mut buckets.moderate_min,
            Bucket::Vigorous => &mut buckets.vigorous_min,
        };
        *slot += config.epoch_minutes;
    }

    let [w_rest, w_light, w_moderate, w_vigorous] = config.bucket_weights;
    let raw = w_rest * buckets.rest_min
        + w_light * buckets.light_min
        + w_moderate * buckets.moderate_min
        + w_vigorous * buckets.vigorous_min;

    // Zero epochs yields exactly 0.0, not a small residual
    let score = if epochs.is_empty() {
        0.0
    } else {
        config.cap * (1.0 - (-raw / config.compression_scale).exp())
    };

    StrainDay {
        date,
        score,
        level: level_of(score),
        buckets,
        epoch_count: epochs.len(),
        partial_day: epochs.len() < config.full_day_epochs,
        sleep_need_adjustment_min: sleep_need_adjustment(score),
    }
}

fn level_of(score: f64) -> StrainLevel {
    if score < 4.0 {
        StrainLevel::Minimal
    } else if score < 8.0 {
        StrainLevel::Light
    } else if score < 14.0 {
        StrainLevel::Moderate
    } else if score < 18.0 {
        StrainLevel::High
    } else {
        StrainLevel::Overreaching
    }
}

/// Extra sleep to recommend tonight after a hard day
fn sleep_need_adjustment(score: f64) -> u32 {
    if score >= 18.0 {
        45
    } else if score >= 14.0 {
        30
    } else if score >= 10.0 {
        15
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use chrono::NaiveDate;

    fn obs(day: u32, hour: u32, minute: u32, kind: SignalKind, value: f64) -> Observation {
        Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
            signal_kind: kind,
            value,
            unit: "raw".to_string(),
            source_tag: "test".to_string(),
        }
    }

    /// `count` paired epochs at the given HR, one per minute from 10:00
    fn hr_day(day: u32, count: u32, bpm: f64) -> Vec<Observation> {
        let mut observations = Vec::new();
        for i in 0..count {
            let (h, m) = (10 + i / 60, i % 60);
            observations.push(obs(day, h, m, SignalKind::MotionEpoch, 100.0));
            observations.push(obs(day, h, m, SignalKind::HeartRate, bpm));
        }
        observations
    }

    #[test]
    fn test_score_bounded_by_cap() {
        // 8 hours of vigorous work cannot exceed the cap
        let store = RecordStore::from_observations(hr_day(1, 480, 180.0));
        let days = analyze(&store, &StrainConfig::default()).unwrap();
        assert_eq!(days.len(), 1);
        assert!(days[0].score <= 21.0);
        assert!(days[0].score > 18.0);
        assert_eq!(days[0].level, StrainLevel::Overreaching);
        assert_eq!(days[0].sleep_need_adjustment_min, 45);
    }

    #[test]
    fn test_score_monotone_in_intensity() {
        let config = StrainConfig::default();
        let rest = analyze(
            &RecordStore::from_observations(hr_day(1, 120, 62.0)),
            &config,
        )
        .unwrap()[0]
            .score;
        let moderate = analyze(
            &RecordStore::from_observations(hr_day(1, 120, 135.0)),
            &config,
        )
        .unwrap()[0]
            .score;
        let vigorous = analyze(
            &RecordStore::from_observations(hr_day(1, 120, 175.0)),
            &config,
        )
        .unwrap()[0]
            .score;
        assert!(rest < moderate);
        assert!(moderate < vigorous);
    }

    #[test]
    fn test_hr_reserve_buckets() {
        let config = StrainConfig::default();
        // Reserve bounds at resting 60 / max 190: 99, 125, 151 bpm
        assert_eq!(classify(None, Some(70.0), &config), Bucket::Rest);
        assert_eq!(classify(None, Some(110.0), &config), Bucket::Light);
        assert_eq!(classify(None, Some(140.0), &config), Bucket::Moderate);
        assert_eq!(classify(None, Some(170.0), &config), Bucket::Vigorous);
    }

    #[test]
    fn test_motion_fallback_when_hr_missing() {
        let config = StrainConfig::default();
        assert_eq!(classify(Some(20.0), None, &config), Bucket::Rest);
        assert_eq!(classify(Some(120.0), None, &config), Bucket::Light);
        assert_eq!(classify(Some(400.0), None, &config), Bucket::Moderate);
        assert_eq!(classify(Some(900.0), None, &config), Bucket::Vigorous);
    }

    #[test]
    fn test_zero_epoch_day_scores_zero_and_partial() {
        // Day 2 has only a reaction-time observation; day 1 carries the
        // epoch streams that make strain analyzable at all
        let mut observations = hr_day(1, 60, 120.0);
        observations.push(obs(2, 9, 0, SignalKind::ReactionTime, 150.0));
        let store = RecordStore::from_observations(observations);
        let days = analyze(&store, &StrainConfig::default()).unwrap();

        assert_eq!(days.len(), 2);
        let empty = &days[1];
        assert_eq!(empty.score, 0.0);
        assert_eq!(empty.epoch_count, 0);
        assert!(empty.partial_day);
        assert_eq!(empty.level, StrainLevel::Minimal);
    }

    #[test]
    fn test_unavailable_without_epoch_streams() {
        let store = RecordStore::from_observations(vec![obs(
            1,
            9,
            0,
            SignalKind::ReactionTime,
            150.0,
        )]);
        assert!(analyze(&store, &StrainConfig::default()).is_none());
    }
}
