//! Canonical Record Store
//!
//! Immutable-after-load collection of typed observations. Every derived
//! entity downstream is a pure function of this store plus the per-user
//! baseline, which is what makes re-runs reproducible.
//!
//! The store assumes the ingestion adapter already normalized timestamps
//! to user-local time and deduplicated rows; it does not re-validate.

use crate::error::AnalysisError;
use crate::types::{CoverageWindow, Observation, SignalKind};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    observations: Vec<Observation>,
}

impl RecordStore {
    /// Build a store from adapter output. Observations are sorted by
    /// timestamp once here so every module sees a stable order.
    pub fn from_observations(mut observations: Vec<Observation>) -> Self {
        observations.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.signal_kind.cmp(&b.signal_kind))
        });
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn all(&self) -> &[Observation] {
        &self.observations
    }

    /// All observations of one signal kind, in timestamp order
    pub fn of_kind(&self, kind: SignalKind) -> Vec<&Observation> {
        self.observations
            .iter()
            .filter(|o| o.signal_kind == kind)
            .collect()
    }

    pub fn has_kind(&self, kind: SignalKind) -> bool {
        self.observations.iter().any(|o| o.signal_kind == kind)
    }

    /// Distinct local calendar days with at least one observation of `kind`
    pub fn days_covered(&self, kind: SignalKind) -> usize {
        let mut days: Vec<NaiveDate> = self
            .observations
            .iter()
            .filter(|o| o.signal_kind == kind)
            .map(|o| o.timestamp.date())
            .collect();
        days.sort();
        days.dedup();
        days.len()
    }

    /// All distinct local calendar days with any observation, sorted
    pub fn all_days(&self) -> Vec<NaiveDate> {
        let mut days: Vec<NaiveDate> = self
            .observations
            .iter()
            .map(|o| o.timestamp.date())
            .collect();
        days.sort();
        days.dedup();
        days
    }

    /// Observations of `kind` falling on one local calendar day
    pub fn on_day(&self, kind: SignalKind, day: NaiveDate) -> Vec<&Observation> {
        self.observations
            .iter()
            .filter(|o| o.signal_kind == kind && o.timestamp.date() == day)
            .collect()
    }

    /// Observations of `kind` within [start, end), timestamp order
    pub fn in_range(
        &self,
        kind: SignalKind,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<&Observation> {
        self.observations
            .iter()
            .filter(|o| o.signal_kind == kind && o.timestamp >= start && o.timestamp < end)
            .collect()
    }

    /// Earliest/latest timestamp and count per signal, recorded in packet
    /// meta for downstream trust assessment
    pub fn coverage_windows(&self) -> BTreeMap<SignalKind, CoverageWindow> {
        let mut windows: BTreeMap<SignalKind, CoverageWindow> = BTreeMap::new();
        for obs in &self.observations {
            windows
                .entry(obs.signal_kind)
                .and_modify(|w| {
                    if obs.timestamp < w.from {
                        w.from = obs.timestamp;
                    }
                    if obs.timestamp > w.to {
                        w.to = obs.timestamp;
                    }
                    w.count += 1;
                })
                .or_insert(CoverageWindow {
                    from: obs.timestamp,
                    to: obs.timestamp,
                    count: 1,
                });
        }
        windows
    }
}

/// Parse newline-delimited JSON, one observation per line
pub fn parse_ndjson(input: &str) -> Result<Vec<Observation>, AnalysisError> {
    let mut observations = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let obs: Observation = serde_json::from_str(trimmed).map_err(|e| {
            AnalysisError::ParseError(format!("line {}: {}", line_no + 1, e))
        })?;
        observations.push(obs);
    }
    Ok(observations)
}

/// Parse a JSON array of observations
pub fn parse_array(input: &str) -> Result<Vec<Observation>, AnalysisError> {
    serde_json::from_str(input)
        .map_err(|e| AnalysisError::ParseError(format!("invalid observation array: {e}")))
}

/// Fractional hour-of-day for a local timestamp (e.g., 14:30 -> 14.5)
pub fn hour_of_day(ts: NaiveDateTime) -> f64 {
    use chrono::Timelike;
    ts.hour() as f64 + ts.minute() as f64 / 60.0 + ts.second() as f64 / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    fn obs(day: u32, hour: u32, kind: SignalKind, value: f64) -> Observation {
        Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
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
    fn test_store_sorts_on_load() {
        let store = RecordStore::from_observations(vec![
            obs(3, 8, SignalKind::ReactionTime, 150.0),
            obs(1, 9, SignalKind::ReactionTime, 160.0),
            obs(2, 7, SignalKind::ReactionTime, 155.0),
        ]);
        let times: Vec<u32> = store
            .all()
            .iter()
            .map(|o| o.timestamp.date().day0() + 1)
            .collect();
        assert_eq!(times, vec![1, 2, 3]);
    }

    #[test]
    fn test_days_covered_dedups() {
        let store = RecordStore::from_observations(vec![
            obs(1, 8, SignalKind::ReactionTime, 150.0),
            obs(1, 12, SignalKind::ReactionTime, 152.0),
            obs(2, 8, SignalKind::ReactionTime, 149.0),
        ]);
        assert_eq!(store.days_covered(SignalKind::ReactionTime), 2);
        assert_eq!(store.days_covered(SignalKind::HeartRate), 0);
    }

    #[test]
    fn test_coverage_windows() {
        let store = RecordStore::from_observations(vec![
            obs(1, 8, SignalKind::ReactionTime, 150.0),
            obs(5, 20, SignalKind::ReactionTime, 140.0),
            obs(3, 2, SignalKind::HeartRate, 58.0),
        ]);
        let windows = store.coverage_windows();
        let rt = &windows[&SignalKind::ReactionTime];
        assert_eq!(rt.count, 2);
        assert_eq!(rt.from.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(rt.to.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(windows[&SignalKind::HeartRate].count, 1);
    }

    #[test]
    fn test_parse_ndjson_reports_line_numbers() {
        let input = concat!(
            r#"{"timestamp":"2024-03-01T09:00:00","signal_kind":"reaction_time","value":151.0,"unit":"ms","source_tag":"cli"}"#,
            "\n\n",
            "not json\n",
        );
        let err = parse_ndjson(input).unwrap_err();
        assert!(err.to_string().contains("line 3"));

        let good = parse_ndjson(input.lines().next().unwrap()).unwrap();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].signal_kind, SignalKind::ReactionTime);
    }

    #[test]
    fn test_hour_of_day_fractional() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert!((hour_of_day(ts) - 14.5).abs() < 1e-9);
    }
}
