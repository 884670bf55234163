//! Readiness tiering and task matching
//!
//! The tier blends three inputs: a z-score of today's test performance
//! against the user's own history, the recovery score, and yesterday's
//! strain. Any input may be missing; the assessment then rests on what
//! remains and is flagged `partial_basis`. A z-score is only computed
//! once enough history exists, so early tiers lean on recovery alone
//! rather than on a statistic with no support.

use crate::circadian::hours_from_peak;
use crate::config::ReadinessConfig;
use crate::store::RecordStore;
use crate::types::{
    CircadianProfile, ReadinessTier, Recovery, SignalKind, StrainDay, TaskCategory,
    TierAssessment,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Assess the latest day in the store
pub fn assess(
    store: &RecordStore,
    recovery: Option<&Recovery>,
    latest_strain: Option<&StrainDay>,
    circadian: Option<&CircadianProfile>,
    config: &ReadinessConfig,
) -> Option<TierAssessment> {
    let date = store.all_days().last().copied()?;

    let test_z = test_z_score(store, date, config);
    let recovery_score = recovery.map(|r| r.score);
    let strain_score = latest_strain.map(|s| s.score);

    let tier = tier_of(test_z, recovery_score, strain_score, config);
    let partial_basis = test_z.is_none() || recovery_score.is_none();

    Some(TierAssessment {
        date,
        tier,
        test_z_score: test_z,
        recovery_score,
        strain_score,
        partial_basis,
        task_suitability: task_suitability(tier, circadian, strain_score),
    })
}

/// Z-score of the latest day's test performance against prior daily
/// means. Readiness score is preferred; reaction time substitutes with
/// the sign flipped since lower is better.
fn test_z_score(store: &RecordStore, date: NaiveDate, config: &ReadinessConfig) -> Option<f64> {
    if let Some(z) = daily_mean_z(store, SignalKind::ReadinessScore, date, config) {
        return Some(z);
    }
    daily_mean_z(store, SignalKind::ReactionTime, date, config).map(|z| -z)
}

fn daily_mean_z(
    store: &RecordStore,
    kind: SignalKind,
    date: NaiveDate,
    config: &ReadinessConfig,
) -> Option<f64> {
    let today = store.on_day(kind, date);
    if today.is_empty() {
        return None;
    }
    let latest = today.iter().map(|o| o.value).sum::<f64>() / today.len() as f64;

    let history: Vec<f64> = store
        .all_days()
        .into_iter()
        .filter(|d| *d < date)
        .filter_map(|d| {
            let day = store.on_day(kind, d);
            if day.is_empty() {
                None
            } else {
                Some(day.iter().map(|o| o.value).sum::<f64>() / day.len() as f64)
            }
        })
        .collect();
    if history.len() < config.min_history_days {
        return None;
    }

    let n = history.len() as f64;
    let mean = history.iter().sum::<f64>() / n;
    let var = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    if std == 0.0 {
        return None;
    }
    Some((latest - mean) / std)
}

/// Graduated tier bands, highest first. Missing strain never blocks a
/// tier; missing z or recovery blocks Peak but degrades the lower bands
/// gracefully.
fn tier_of(
    z: Option<f64>,
    recovery: Option<f64>,
    strain: Option<f64>,
    config: &ReadinessConfig,
) -> ReadinessTier {
    let strain_at_most = |bound: f64| strain.map_or(true, |s| s <= bound);

    if let (Some(z), Some(rec)) = (z, recovery) {
        if z >= config.peak_z
            && rec >= config.peak_recovery
            && strain_at_most(config.peak_strain_max)
        {
            return ReadinessTier::Peak;
        }
    }

    let high = match (z, recovery) {
        (Some(z), Some(rec)) => z >= config.high_z && rec >= config.high_recovery,
        (Some(z), None) => z >= config.high_z,
        (None, Some(rec)) => rec >= config.peak_recovery,
        (None, None) => false,
    };
    if high {
        return ReadinessTier::High;
    }

    let moderate = match (z, recovery) {
        (None, None) => true,
        _ => {
            z.map_or(false, |z| z >= config.moderate_z)
                || recovery.map_or(false, |rec| rec >= config.moderate_recovery)
        }
    };
    if moderate {
        ReadinessTier::Moderate
    } else {
        ReadinessTier::Low
    }
}

/// Hour each task category is conventionally scheduled at, used to score
/// circadian alignment
fn category_hour(category: TaskCategory) -> f64 {
    match category {
        TaskCategory::DeepWork => 10.0,
        TaskCategory::Physical => 17.0,
        TaskCategory::Social => 19.0,
        TaskCategory::Admin => 14.0,
    }
}

/// Per-category weights over (tier, circadian alignment, strain headroom)
fn category_weights(category: TaskCategory) -> (f64, f64, f64) {
    match category {
        TaskCategory::DeepWork => (0.5, 0.35, 0.15),
        TaskCategory::Physical => (0.35, 0.15, 0.5),
        TaskCategory::Social => (0.4, 0.3, 0.3),
        TaskCategory::Admin => (0.6, 0.1, 0.3),
    }
}

fn tier_component(tier: ReadinessTier) -> f64 {
    match tier {
        ReadinessTier::Low => 0.25,
        ReadinessTier::Moderate => 0.5,
        ReadinessTier::High => 0.75,
        ReadinessTier::Peak => 1.0,
    }
}

/// Suitability per task category in [0, 1]. Missing inputs contribute a
/// neutral 0.5 rather than dragging the category down.
fn task_suitability(
    tier: ReadinessTier,
    circadian: Option<&CircadianProfile>,
    strain: Option<f64>,
) -> BTreeMap<TaskCategory, f64> {
    let tier_score = tier_component(tier);
    let strain_headroom = strain.map_or(0.5, |s| (1.0 - s / 21.0).clamp(0.0, 1.0));

    let categories = [
        TaskCategory::DeepWork,
        TaskCategory::Physical,
        TaskCategory::Social,
        TaskCategory::Admin,
    ];
    let mut suitability = BTreeMap::new();
    for category in categories {
        let circadian_score = circadian.map_or(0.5, |profile| {
            1.0 - hours_from_peak(profile, category_hour(category)) / 12.0
        });
        let (w_tier, w_circ, w_strain) = category_weights(category);
        let score = w_tier * tier_score + w_circ * circadian_score + w_strain * strain_headroom;
        suitability.insert(category, score.clamp(0.0, 1.0));
    }
    suitability
}
