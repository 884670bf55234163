//! Daily and weekly summaries
//!
//! Daily summaries are rebuilt wholesale from the record store each run,
//! never partially mutated. Weekly summaries are derived from dailies and
//! never independently stored.

use crate::store::RecordStore;
use crate::types::{DailySummary, SignalKind, SignalStats, WeeklySummary};
use chrono::Duration;
use std::collections::BTreeMap;

const ALL_KINDS: [SignalKind; 10] = [
    SignalKind::ReactionTime,
    SignalKind::ReadinessScore,
    SignalKind::AgilityScore,
    SignalKind::HeartRate,
    SignalKind::HrvRmssd,
    SignalKind::SkinTemp,
    SignalKind::SleepStage,
    SignalKind::MotionEpoch,
    SignalKind::SelfReportStress,
    SignalKind::SelfReportSleepiness,
];

fn stats_of(values: &[f64]) -> Option<SignalStats> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    Some(SignalStats {
        mean: sum / values.len() as f64,
        min,
        max,
        count: values.len(),
    })
}

/// One DailySummary per local calendar day with data, in date order
pub fn build_daily_summaries(store: &RecordStore) -> Vec<DailySummary> {
    store
        .all_days()
        .into_iter()
        .map(|date| {
            let mut signals = BTreeMap::new();
            for kind in ALL_KINDS {
                let values: Vec<f64> =
                    store.on_day(kind, date).iter().map(|o| o.value).collect();
                if let Some(stats) = stats_of(&values) {
                    signals.insert(kind, stats);
                }
            }
            DailySummary { date, signals }
        })
        .collect()
}

/// Rolling 7-day aggregates over the daily summaries.
///
/// Weeks are anchored to the earliest day with data and stepped in whole
/// 7-day strides; a trailing partial week is included with its actual
/// day count.
pub fn build_weekly_summaries(dailies: &[DailySummary]) -> Vec<WeeklySummary> {
    let Some(first) = dailies.first() else {
        return Vec::new();
    };
    let last_date = dailies.last().map(|d| d.date).unwrap_or(first.date);

    let mut weeks = Vec::new();
    let mut week_start = first.date;
    while week_start <= last_date {
        let week_end = week_start + Duration::days(6);
        let in_week: Vec<&DailySummary> = dailies
            .iter()
            .filter(|d| d.date >= week_start && d.date <= week_end)
            .collect();

        if !in_week.is_empty() {
            let mut signals = BTreeMap::new();
            for kind in ALL_KINDS {
                // Aggregate across days: mean of daily means weighted by
                // count, min/max over the week
                let mut total = 0.0;
                let mut count = 0usize;
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                for day in &in_week {
                    if let Some(stats) = day.signals.get(&kind) {
                        total += stats.mean * stats.count as f64;
                        count += stats.count;
                        min = min.min(stats.min);
                        max = max.max(stats.max);
                    }
                }
                if count > 0 {
                    signals.insert(
                        kind,
                        SignalStats {
                            mean: total / count as f64,
                            min,
                            max,
                            count,
                        },
                    );
                }
            }

            weeks.push(WeeklySummary {
                week_start,
                week_end,
                days_with_data: in_week.len(),
                signals,
                vs_prior_week_pct: None,
            });
        }
        week_start = week_end + Duration::days(1);
    }

    // Week-over-week change in per-signal means
    for i in 1..weeks.len() {
        let prior = weeks[i - 1].signals.clone();
        let mut changes = BTreeMap::new();
        for (kind, stats) in &weeks[i].signals {
            if let Some(prev) = prior.get(kind) {
                if prev.mean.abs() > f64::EPSILON {
                    changes.insert(*kind, (stats.mean - prev.mean) / prev.mean * 100.0);
                }
            }
        }
        if !changes.is_empty() {
            weeks[i].vs_prior_week_pct = Some(changes);
        }
    }

    weeks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use chrono::NaiveDate;

    fn obs(day: u32, kind: SignalKind, value: f64) -> Observation {
        Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            signal_kind: kind,
            value,
            unit: "score".to_string(),
            source_tag: "test".to_string(),
        }
    }

    #[test]
    fn test_daily_summary_aggregates() {
        let store = RecordStore::from_observations(vec![
            obs(1, SignalKind::ReadinessScore, 150.0),
            obs(1, SignalKind::ReadinessScore, 170.0),
            obs(2, SignalKind::ReadinessScore, 160.0),
        ]);
        let dailies = build_daily_summaries(&store);
        assert_eq!(dailies.len(), 2);
        let day1 = &dailies[0].signals[&SignalKind::ReadinessScore];
        assert!((day1.mean - 160.0).abs() < 1e-9);
        assert_eq!(day1.min, 150.0);
        assert_eq!(day1.max, 170.0);
        assert_eq!(day1.count, 2);
    }

    #[test]
    fn test_daily_summary_omits_absent_signals() {
        let store =
            RecordStore::from_observations(vec![obs(1, SignalKind::ReactionTime, 150.0)]);
        let dailies = build_daily_summaries(&store);
        assert!(dailies[0].signals.contains_key(&SignalKind::ReactionTime));
        assert!(!dailies[0].signals.contains_key(&SignalKind::HeartRate));
    }

    #[test]
    fn test_weekly_change_pct() {
        let mut observations = Vec::new();
        // Week 1: readiness 160, week 2: readiness 144 (-10%)
        for day in 1..=7 {
            observations.push(obs(day, SignalKind::ReadinessScore, 160.0));
        }
        for day in 8..=14 {
            observations.push(obs(day, SignalKind::ReadinessScore, 144.0));
        }
        let store = RecordStore::from_observations(observations);
        let weeks = build_weekly_summaries(&build_daily_summaries(&store));
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].days_with_data, 7);
        let change =
            weeks[1].vs_prior_week_pct.as_ref().unwrap()[&SignalKind::ReadinessScore];
        assert!((change - -10.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_store_yields_no_summaries() {
        let store = RecordStore::from_observations(Vec::new());
        assert!(build_daily_summaries(&store).is_empty());
        assert!(build_weekly_summaries(&[]).is_empty());
    }
}
