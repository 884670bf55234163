//! Circadian profiler
//!
//! Fits a single-component cosinor model to each configured signal by
//! time-of-day across all days of history:
//!
//! `y(t) = mesor + amplitude * cos(2*pi*(t - acrophase)/24)`
//!
//! The fit is the closed-form linear least-squares solution over the
//! cos/sin regressors, so re-runs are exactly reproducible. Coverage
//! below the policy thresholds yields `insufficient_data`, never a fit
//! with undefined parameters.

use crate::config::CircadianConfig;
use crate::store::{hour_of_day, RecordStore};
use crate::types::{
    Chronotype, CircadianFit, CircadianProfile, PhaseWindow, SignalKind,
};
use std::collections::BTreeMap;
use std::f64::consts::PI;

const OMEGA: f64 = 2.0 * PI / 24.0;

/// Fit every configured signal present in the store
pub fn profile_signals(
    store: &RecordStore,
    config: &CircadianConfig,
) -> BTreeMap<SignalKind, CircadianFit> {
    let mut profiles = BTreeMap::new();
    for &kind in &config.fit_signals {
        if store.has_kind(kind) {
            profiles.insert(kind, fit_signal(store, kind, config));
        }
    }
    profiles
}

/// Fit one signal's observations by time-of-day
pub fn fit_signal(
    store: &RecordStore,
    kind: SignalKind,
    config: &CircadianConfig,
) -> CircadianFit {
    let observations = store.of_kind(kind);
    let hours: Vec<f64> = observations
        .iter()
        .map(|o| hour_of_day(o.timestamp) % 24.0)
        .collect();
    let values: Vec<f64> = observations.iter().map(|o| o.value).collect();

    let distinct_days = store.days_covered(kind);
    let distinct_hours = count_distinct_hours(&hours);

    if distinct_days < config.min_days
        || distinct_hours < config.min_distinct_hours
        || values.len() < config.min_samples
    {
        return CircadianFit::InsufficientData {
            sample_count: values.len(),
            distinct_days,
            distinct_hours,
        };
    }

    let values = winsorize(&values, config.outlier_z);

    let Some((mesor, a, b)) = solve_cosinor(&hours, &values) else {
        return CircadianFit::InsufficientData {
            sample_count: values.len(),
            distinct_days,
            distinct_hours,
        };
    };

    let amplitude = (a * a + b * b).sqrt();
    let acrophase_hour = (b.atan2(a) / OMEGA).rem_euclid(24.0);

    let goodness_of_fit = r_squared(&hours, &values, mesor, a, b);

    let tol = config.window_tolerance_hours;
    let profile = CircadianProfile {
        mesor,
        amplitude,
        acrophase_hour,
        peak_window: window_around(acrophase_hour, tol),
        trough_window: window_around((acrophase_hour + 12.0).rem_euclid(24.0), tol),
        goodness_of_fit,
        sample_count: values.len(),
        distinct_days,
        chronotype: chronotype_from_acrophase(acrophase_hour),
    };

    CircadianFit::Fitted { profile }
}

fn count_distinct_hours(hours: &[f64]) -> usize {
    let mut buckets: Vec<i64> = hours.iter().map(|h| h.floor() as i64).collect();
    buckets.sort_unstable();
    buckets.dedup();
    buckets.len()
}

/// Clip values beyond `z` robust standard deviations to the boundary.
///
/// The spread estimate uses the median absolute deviation scaled to the
/// normal distribution, so the clip bounds are not dragged outward by the
/// very outliers they are meant to contain.
fn winsorize(values: &[f64], z: f64) -> Vec<f64> {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    // 1.4826 * MAD estimates sigma for normally distributed data
    let spread = 1.4826 * median(&deviations);
    if spread == 0.0 || !spread.is_finite() || !center.is_finite() {
        return values.to_vec();
    }
    let lo = center - z * spread;
    let hi = center + z * spread;
    values.iter().map(|v| v.clamp(lo, hi)).collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Least-squares solution of y = m + a*cos(w t) + b*sin(w t).
/// Returns None if the normal equations are singular (all samples at
/// effectively one phase).
fn solve_cosinor(hours: &[f64], values: &[f64]) -> Option<(f64, f64, f64)> {
    let n = hours.len() as f64;
    let cos: Vec<f64> = hours.iter().map(|h| (OMEGA * h).cos()).collect();
    let sin: Vec<f64> = hours.iter().map(|h| (OMEGA * h).sin()).collect();

    let sc: f64 = cos.iter().sum();
    let ss: f64 = sin.iter().sum();
    let scc: f64 = cos.iter().map(|c| c * c).sum();
    let sss: f64 = sin.iter().map(|s| s * s).sum();
    let scs: f64 = cos.iter().zip(&sin).map(|(c, s)| c * s).sum();
    let sy: f64 = values.iter().sum();
    let syc: f64 = values.iter().zip(&cos).map(|(y, c)| y * c).sum();
    let sys: f64 = values.iter().zip(&sin).map(|(y, s)| y * s).sum();

    // Normal equations, 3x3
    let mut m = [
        [n, sc, ss, sy],
        [sc, scc, scs, syc],
        [ss, scs, sss, sys],
    ];

    // Gaussian elimination with partial pivoting
    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        if m[pivot][col].abs() < 1e-10 {
            return None;
        }
        m.swap(col, pivot);
        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    let b = m[2][3] / m[2][2];
    let a = (m[1][3] - m[1][2] * b) / m[1][1];
    let mesor = (m[0][3] - m[0][1] * a - m[0][2] * b) / m[0][0];

    if !mesor.is_finite() || !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some((mesor, a, b))
}

/// Proportion of variance explained, clamped to [0, 1]
fn r_squared(hours: &[f64], values: &[f64], mesor: f64, a: f64, b: f64) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss_tot: f64 = values.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = hours
        .iter()
        .zip(values)
        .map(|(h, y)| {
            let fitted = mesor + a * (OMEGA * h).cos() + b * (OMEGA * h).sin();
            (y - fitted).powi(2)
        })
        .sum();
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

fn window_around(center: f64, tolerance: f64) -> PhaseWindow {
    PhaseWindow {
        start_hour: (center - tolerance).rem_euclid(24.0),
        end_hour: (center + tolerance).rem_euclid(24.0),
    }
}

fn chronotype_from_acrophase(acrophase_hour: f64) -> Chronotype {
    if acrophase_hour < 11.0 {
        Chronotype::MorningLark
    } else if acrophase_hour < 15.0 {
        Chronotype::Intermediate
    } else {
        Chronotype::EveningOwl
    }
}

/// Fractional-hour distance to the fitted peak, wrapped to [0, 12]
pub fn hours_from_peak(profile: &CircadianProfile, hour: f64) -> f64 {
    let diff = (hour - profile.acrophase_hour).rem_euclid(24.0);
    diff.min(24.0 - diff)
}
