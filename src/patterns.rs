//! Pattern detector
//!
//! Runs a small catalogue of templates over the daily summaries. Every
//! template has a hard precondition; when the data cannot support it the
//! template simply does not fire. At most one pattern is emitted per
//! signal per run, and the template chosen last run for a signal is
//! skipped when an alternative is eligible, so consecutive packets vary
//! their observations instead of repeating one.
//!
//! The population-percentile template is in the catalogue but can never
//! fire: there is no population reference data, and inventing one is
//! worse than silence.

use crate::baseline::RotationState;
use crate::config::PatternConfig;
use crate::hrv::linear_slope;
use crate::types::{DailySummary, Pattern, PatternKind, SignalKind};

/// Signals the catalogue scans, in emission order
const SCAN_KINDS: [SignalKind; 8] = [
    SignalKind::ReactionTime,
    SignalKind::ReadinessScore,
    SignalKind::AgilityScore,
    SignalKind::HeartRate,
    SignalKind::HrvRmssd,
    SignalKind::SkinTemp,
    SignalKind::SelfReportStress,
    SignalKind::MotionEpoch,
];

/// Template priority when several are eligible for one signal
const TEMPLATE_ORDER: [PatternKind; 5] = [
    PatternKind::ContextAnomaly,
    PatternKind::SelfComparisonDelta,
    PatternKind::RollingTrend,
    PatternKind::ActivityCluster,
    PatternKind::PopulationPercentile,
];

/// Detect patterns across all scanned signals, updating the rotation
/// state with the template each signal used this run
pub fn detect(
    dailies: &[DailySummary],
    rotation: &mut RotationState,
    config: &PatternConfig,
) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    for kind in SCAN_KINDS {
        let series = daily_means(dailies, kind);
        if series.is_empty() {
            continue;
        }

        let mut eligible: Vec<Pattern> = TEMPLATE_ORDER
            .iter()
            .filter_map(|&template| try_template(template, kind, &series, config))
            .collect();
        if eligible.is_empty() {
            continue;
        }

        // Vary the selection: with an alternative available, skip the
        // template this signal used last run
        if eligible.len() >= 2 {
            if let Some(&last) = rotation.last_template.get(&kind) {
                eligible.retain(|p| p.kind != last);
            }
        }

        let chosen = eligible.remove(0);
        rotation.last_template.insert(kind, chosen.kind);
        patterns.push(chosen);
    }
    patterns
}

fn daily_means(dailies: &[DailySummary], kind: SignalKind) -> Vec<f64> {
    dailies
        .iter()
        .filter_map(|d| d.signals.get(&kind).map(|s| s.mean))
        .collect()
}

fn try_template(
    template: PatternKind,
    kind: SignalKind,
    series: &[f64],
    config: &PatternConfig,
) -> Option<Pattern> {
    match template {
        PatternKind::ContextAnomaly => context_anomaly(kind, series, config),
        PatternKind::SelfComparisonDelta => self_comparison(kind, series, config),
        PatternKind::RollingTrend => rolling_trend(kind, series, config),
        PatternKind::ActivityCluster => activity_cluster(kind, series, config),
        // No population reference data exists
        PatternKind::PopulationPercentile => None,
    }
}

/// Sample-size-scaled heuristic confidence in (0, 1)
fn confidence_of(n: usize, config: &PatternConfig) -> f64 {
    n as f64 / (n as f64 + config.confidence_scale)
}

/// Latest day versus the mean of prior days, firing beyond the
/// configured percentage threshold
fn self_comparison(
    kind: SignalKind,
    series: &[f64],
    config: &PatternConfig,
) -> Option<Pattern> {
    if series.len() < 3 {
        return None;
    }
    let latest = *series.last()?;
    let prior = &series[..series.len() - 1];
    let prior_mean = prior.iter().sum::<f64>() / prior.len() as f64;
    if prior_mean.abs() < f64::EPSILON {
        return None;
    }
    let delta_pct = (latest - prior_mean) / prior_mean.abs() * 100.0;
    if delta_pct.abs() < config.delta_threshold_pct {
        return None;
    }
    let direction = if delta_pct > 0.0 { "above" } else { "below" };
    Some(Pattern {
        kind: PatternKind::SelfComparisonDelta,
        signals_involved: vec![kind],
        description: format!(
            "{} today is {:.0}% {} your recent typical",
            kind.as_str(),
            delta_pct.abs(),
            direction,
        ),
        confidence: confidence_of(series.len(), config),
    })
}

/// Sustained drift over the window, measured as total slope-implied
/// change relative to the window mean
fn rolling_trend(kind: SignalKind, series: &[f64], config: &PatternConfig) -> Option<Pattern> {
    if series.len() < config.min_trend_points {
        return None;
    }
    let slope = linear_slope(series)?;
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    if mean.abs() < f64::EPSILON {
        return None;
    }
    let total_change_pct = slope * (series.len() - 1) as f64 / mean.abs() * 100.0;
    if total_change_pct.abs() < config.delta_threshold_pct {
        return None;
    }
    let direction = if total_change_pct > 0.0 {
        "rising"
    } else {
        "falling"
    };
    Some(Pattern {
        kind: PatternKind::RollingTrend,
        signals_involved: vec![kind],
        description: format!(
            "{} has been {} steadily, about {:.0}% over {} days",
            kind.as_str(),
            direction,
            total_change_pct.abs(),
            series.len(),
        ),
        confidence: confidence_of(series.len(), config),
    })
}

/// A sustained run of above-median days
fn activity_cluster(
    kind: SignalKind,
    series: &[f64],
    config: &PatternConfig,
) -> Option<Pattern> {
    if series.len() < config.min_cluster_days + 1 {
        return None;
    }
    let mut sorted = series.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = sorted[sorted.len() / 2];

    let mut best_run = 0usize;
    let mut run = 0usize;
    for &v in series {
        if v > median {
            run += 1;
            best_run = best_run.max(run);
        } else {
            run = 0;
        }
    }
    if best_run < config.min_cluster_days {
        return None;
    }
    Some(Pattern {
        kind: PatternKind::ActivityCluster,
        signals_involved: vec![kind],
        description: format!(
            "{} ran above typical for {} consecutive days",
            kind.as_str(),
            best_run,
        ),
        confidence: confidence_of(best_run, config),
    })
}

/// Latest day beyond two standard deviations of prior days
fn context_anomaly(
    kind: SignalKind,
    series: &[f64],
    config: &PatternConfig,
) -> Option<Pattern> {
    if series.len() < 4 {
        return None;
    }
    let latest = *series.last()?;
    let prior = &series[..series.len() - 1];
    let n = prior.len() as f64;
    let mean = prior.iter().sum::<f64>() / n;
    let std = (prior.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std < f64::EPSILON {
        return None;
    }
    let z = (latest - mean) / std;
    if z.abs() < 2.0 {
        return None;
    }
    Some(Pattern {
        kind: PatternKind::ContextAnomaly,
        signals_involved: vec![kind],
        description: format!(
            "{} today sits {:.1} standard deviations from your usual range",
            kind.as_str(),
            z.abs(),
        ),
        confidence: confidence_of(series.len(), config),
    })
}
