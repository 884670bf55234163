//! Per-user persistent state: baseline anchors and pattern rotation
//!
//! Anchors are long-lived running statistics: they extend monotonically
//! as better values are observed and are never retracted within a run.
//! The state round-trips through JSON so callers can persist it in any
//! key-value store between runs.

use crate::error::AnalysisError;
use crate::store::RecordStore;
use crate::types::{Baseline, PatternKind, SignalKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Last template emitted per signal, carried across runs so the detector
/// can vary its selection. Value in, value out; no hidden process state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    pub last_template: BTreeMap<SignalKind, PatternKind>,
}

/// Everything the engine persists per user between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    pub baseline: Baseline,
    pub rotation: RotationState,
}

impl UserState {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn fold_max(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn fold_min(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn best_of(store: &RecordStore, kind: SignalKind, take_max: bool) -> Option<f64> {
    let values = store.of_kind(kind);
    if values.is_empty() {
        return None;
    }
    let iter = values.iter().map(|o| o.value);
    if take_max {
        iter.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
    } else {
        iter.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
    }
}

/// Extend anchors with this run's observations. Monotonic: an anchor can
/// only improve.
pub fn update_baseline(baseline: &mut Baseline, store: &RecordStore) {
    baseline.peak_readiness = fold_max(
        baseline.peak_readiness,
        best_of(store, SignalKind::ReadinessScore, true),
    );
    baseline.peak_agility = fold_max(
        baseline.peak_agility,
        best_of(store, SignalKind::AgilityScore, true),
    );
    baseline.hrv_peak_ms =
        fold_max(baseline.hrv_peak_ms, best_of(store, SignalKind::HrvRmssd, true));
    baseline.reaction_floor_ms = fold_min(
        baseline.reaction_floor_ms,
        best_of(store, SignalKind::ReactionTime, false),
    );
}

/// Recompute anchors from scratch over the full history in the store,
/// discarding prior values. The one sanctioned way to retract an anchor.
pub fn recompute_baseline(store: &RecordStore) -> Baseline {
    let mut baseline = Baseline::default();
    update_baseline(&mut baseline, store);
    baseline
}

/// External per-user state collaborator. Implementations must apply `put`
/// atomically per user; overlapping runs for the same user should be
/// rejected or serialized by the caller rather than interleaved.
pub trait StateStore {
    fn get(&self, user_id: &str) -> Result<Option<UserState>, AnalysisError>;
    fn put(&mut self, user_id: &str, state: &UserState) -> Result<(), AnalysisError>;
}

/// In-memory store for tests and single-process embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    states: HashMap<String, UserState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, user_id: &str) -> Result<Option<UserState>, AnalysisError> {
        Ok(self.states.get(user_id).cloned())
    }

    fn put(&mut self, user_id: &str, state: &UserState) -> Result<(), AnalysisError> {
        self.states.insert(user_id.to_string(), state.clone());
        Ok(())
    }
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
    fn test_anchors_extend_monotonically() {
        let mut baseline = Baseline {
            peak_readiness: Some(180.0),
            reaction_floor_ms: Some(140.0),
            ..Default::default()
        };
        let store = RecordStore::from_observations(vec![
            obs(1, SignalKind::ReadinessScore, 170.0),
            obs(1, SignalKind::ReactionTime, 150.0),
        ]);
        update_baseline(&mut baseline, &store);
        // Worse values do not retract anchors
        assert_eq!(baseline.peak_readiness, Some(180.0));
        assert_eq!(baseline.reaction_floor_ms, Some(140.0));

        let store = RecordStore::from_observations(vec![
            obs(2, SignalKind::ReadinessScore, 190.0),
            obs(2, SignalKind::ReactionTime, 132.0),
        ]);
        update_baseline(&mut baseline, &store);
        assert_eq!(baseline.peak_readiness, Some(190.0));
        assert_eq!(baseline.reaction_floor_ms, Some(132.0));
    }

    #[test]
    fn test_recompute_discards_stale_anchor() {
        let store =
            RecordStore::from_observations(vec![obs(1, SignalKind::ReadinessScore, 150.0)]);
        let baseline = recompute_baseline(&store);
        assert_eq!(baseline.peak_readiness, Some(150.0));
        assert_eq!(baseline.peak_agility, None);
    }

    #[test]
    fn test_user_state_json_roundtrip() {
        let mut state = UserState::default();
        state.baseline.hrv_peak_ms = Some(82.0);
        state
            .rotation
            .last_template
            .insert(SignalKind::ReadinessScore, PatternKind::RollingTrend);

        let json = state.to_json().unwrap();
        let back = UserState::from_json(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn test_memory_store_get_put() {
        let mut store = MemoryStateStore::new();
        assert!(store.get("u1").unwrap().is_none());

        let state = UserState::default();
        store.put("u1", &state).unwrap();
        assert_eq!(store.get("u1").unwrap(), Some(state));
    }
}
