//! Sleep architecture and debt engine
//!
//! Sessions come from one of two mutually exclusive per-night modes:
//! stage-coded observations reported by the device (session mode), or a
//! reconstruction from motion/HR epoch streams (fallback). Reported
//! sessions always win over reconstructions for the same night; on
//! overlap within a mode the longer session wins.
//!
//! Sleep debt follows the recurrence
//! `debt[d] = max(0, target - actual[d]) + lambda^gap * debt[prev]`
//! and is non-negative by construction. The recovery score combines the
//! debt level and trend with the HRV trend into a saturating 0-100 value.

use crate::config::SleepConfig;
use crate::store::RecordStore;
use crate::types::{
    DebtDay, Derivation, HrvSummary, Observation, Recovery, RecoveryZone, SignalKind,
    SleepDebt, SleepSession, SleepStage, StageSpan, TrendDirection,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Detect all sleep sessions, applying the reported-over-reconstructed
/// conflict policy per night
pub fn analyze_sessions(store: &RecordStore, config: &SleepConfig) -> Vec<SleepSession> {
    let reported = reported_sessions(store, config);
    let reconstructed = reconstructed_sessions(store, config);

    let mut by_night: BTreeMap<NaiveDate, SleepSession> = BTreeMap::new();
    for session in reconstructed.into_iter().chain(reported) {
        match by_night.get(&session.date) {
            None => {
                by_night.insert(session.date, session);
            }
            Some(existing) => {
                let replace = match (&existing.derivation, &session.derivation) {
                    // Reported beats reconstructed regardless of length
                    (Derivation::Reconstructed { .. }, Derivation::Reported) => true,
                    (Derivation::Reported, Derivation::Reconstructed { .. }) => false,
                    // Same provenance: longer session wins
                    _ => session.time_in_bed_min > existing.time_in_bed_min,
                };
                if replace {
                    by_night.insert(session.date, session);
                }
            }
        }
    }
    by_night.into_values().collect()
}

/// Night date a session starting at `onset` is attributed to: the evening
/// side of the 18:00 boundary
fn night_of(onset: NaiveDateTime) -> NaiveDate {
    (onset - Duration::hours(18)).date()
}

/// Session mode: group stage-coded observations into sessions on gaps
fn reported_sessions(store: &RecordStore, config: &SleepConfig) -> Vec<SleepSession> {
    let stages = store.of_kind(SignalKind::SleepStage);
    if stages.is_empty() {
        return Vec::new();
    }

    let gap = Duration::seconds((config.session_gap_min * 60.0) as i64);
    let mut sessions = Vec::new();
    let mut group: Vec<&Observation> = Vec::new();

    for obs in stages {
        if let Some(last) = group.last() {
            if obs.timestamp - last.timestamp > gap {
                if let Some(s) = session_from_group(&group, config) {
                    sessions.push(s);
                }
                group.clear();
            }
        }
        group.push(obs);
    }
    if let Some(s) = session_from_group(&group, config) {
        sessions.push(s);
    }
    sessions
}

fn session_from_group(group: &[&Observation], config: &SleepConfig) -> Option<SleepSession> {
    if group.len() < 2 {
        return None;
    }

    // Each observation covers the interval to its successor; the final
    // one inherits the preceding spacing
    let mut minutes: Vec<f64> = group
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds() as f64 / 60.0)
        .collect();
    let tail = minutes.last().copied().unwrap_or(config.epoch_minutes);
    minutes.push(tail);

    let mut spans: Vec<StageSpan> = Vec::new();
    for (obs, dur) in group.iter().zip(&minutes) {
        let stage = SleepStage::from_code(obs.value)?;
        match spans.last_mut() {
            Some(last) if last.stage == stage => last.minutes += dur,
            _ => spans.push(StageSpan {
                stage,
                minutes: *dur,
            }),
        }
    }

    let onset = group[0].timestamp;
    let offset = group.last()?.timestamp + Duration::seconds((tail * 60.0) as i64);
    finish_session(onset, offset, spans, Derivation::Reported, config)
}

fn finish_session(
    onset: NaiveDateTime,
    offset: NaiveDateTime,
    spans: Vec<StageSpan>,
    derivation: Derivation,
    config: &SleepConfig,
) -> Option<SleepSession> {
    let time_in_bed_min = (offset - onset).num_seconds() as f64 / 60.0;
    if time_in_bed_min < config.min_session_min {
        return None;
    }
    let total_sleep_min: f64 = spans
        .iter()
        .filter(|s| s.stage != SleepStage::Awake)
        .map(|s| s.minutes)
        .sum();
    let transitions = spans.len().saturating_sub(1);
    let fragmentation_index = transitions as f64 / (time_in_bed_min / 60.0);

    Some(SleepSession {
        date: night_of(onset),
        onset,
        offset,
        stage_sequence: spans,
        total_sleep_min,
        time_in_bed_min,
        efficiency: (total_sleep_min / time_in_bed_min).clamp(0.0, 1.0),
        fragmentation_index,
        derivation,
    })
}

/// Epoch mode: reconstruct sessions from sustained low-motion, lowered-HR
/// runs. Requires both streams; without HR the heuristic cannot qualify
/// an epoch and no session is produced.
fn reconstructed_sessions(store: &RecordStore, config: &SleepConfig) -> Vec<SleepSession> {
    let motion = store.of_kind(SignalKind::MotionEpoch);
    let hr = store.of_kind(SignalKind::HeartRate);
    if motion.is_empty() || hr.is_empty() {
        return Vec::new();
    }

    // Pair each motion epoch with the nearest HR reading at or before it
    let mut epochs: Vec<(NaiveDateTime, f64, Option<f64>)> = Vec::new();
    let mut hr_idx = 0usize;
    for m in &motion {
        while hr_idx + 1 < hr.len() && hr[hr_idx + 1].timestamp <= m.timestamp {
            hr_idx += 1;
        }
        let paired = if hr[hr_idx].timestamp <= m.timestamp
            && (m.timestamp - hr[hr_idx].timestamp) <= Duration::minutes(5)
        {
            Some(hr[hr_idx].value)
        } else {
            None
        };
        epochs.push((m.timestamp, m.value, paired));
    }

    let qualifies = |e: &(NaiveDateTime, f64, Option<f64>)| -> bool {
        matches!(e.2, Some(hr_bpm) if hr_bpm < config.sleep_hr_max)
            && e.1 < config.sleep_motion_max
    };

    let mut sessions = Vec::new();
    let mut i = 0usize;
    while i < epochs.len() {
        // Find the start of a sustained qualifying run
        if !qualifies(&epochs[i]) {
            i += 1;
            continue;
        }
        let run_start = i;
        let mut j = i;
        while j < epochs.len() && qualifies(&epochs[j]) {
            j += 1;
        }
        if j - run_start < config.min_sleep_run_epochs {
            i = j;
            continue;
        }

        // Extend past brief arousals until a sustained wake run
        let mut end = j;
        let mut wake_run = 0usize;
        let mut k = j;
        while k < epochs.len() {
            if qualifies(&epochs[k]) {
                wake_run = 0;
                end = k + 1;
            } else {
                wake_run += 1;
                if wake_run >= config.wake_run_epochs {
                    break;
                }
            }
            k += 1;
        }

        if let Some(session) =
            reconstruct_from_epochs(&epochs[run_start..end], config, qualifies)
        {
            sessions.push(session);
        }
        i = k.max(end);
    }
    sessions
}

fn reconstruct_from_epochs(
    epochs: &[(NaiveDateTime, f64, Option<f64>)],
    config: &SleepConfig,
    qualifies: impl Fn(&(NaiveDateTime, f64, Option<f64>)) -> bool,
) -> Option<SleepSession> {
    let onset = epochs.first()?.0;
    let offset = epochs.last()?.0
        + Duration::seconds((config.epoch_minutes * 60.0) as i64);

    // Coarse staging: awake on disqualifying epochs; deep on the quietest
    // low-HR epochs; light otherwise
    let deep_hr_max = config.sleep_hr_max - 8.0;
    let deep_motion_max = config.sleep_motion_max * 0.4;
    let mut spans: Vec<StageSpan> = Vec::new();
    for window in epochs.windows(2) {
        let epoch = &window[0];
        let dur = (window[1].0 - epoch.0).num_seconds() as f64 / 60.0;
        let stage = if !qualifies(epoch) {
            SleepStage::Awake
        } else if matches!(epoch.2, Some(bpm) if bpm < deep_hr_max)
            && epoch.1 < deep_motion_max
        {
            SleepStage::Deep
        } else {
            SleepStage::Light
        };
        match spans.last_mut() {
            Some(last) if last.stage == stage => last.minutes += dur,
            _ => spans.push(StageSpan {
                stage,
                minutes: dur,
            }),
        }
    }
    if let Some(last) = epochs.last() {
        let stage = if qualifies(last) {
            SleepStage::Light
        } else {
            SleepStage::Awake
        };
        match spans.last_mut() {
            Some(span) if span.stage == stage => span.minutes += config.epoch_minutes,
            _ => spans.push(StageSpan {
                stage,
                minutes: config.epoch_minutes,
            }),
        }
    }

    finish_session(
        onset,
        offset,
        spans,
        Derivation::Reconstructed {
            confidence: config.reconstructed_confidence,
        },
        config,
    )
}

/// Sleep debt ledger over the nights with session data.
///
/// Decay is applied per elapsed night, so a gap of g nights between
/// sessions attenuates the carried debt by lambda^g. Nights without data
/// neither add to nor fully reset the ledger; missing data is not
/// treated as zero sleep.
pub fn compute_debt(sessions: &[SleepSession], config: &SleepConfig) -> Option<SleepDebt> {
    if sessions.is_empty() {
        return None;
    }
    let mut sorted: Vec<&SleepSession> = sessions.iter().collect();
    sorted.sort_by_key(|s| s.date);

    let mut daily = Vec::new();
    let mut carried: f64 = 0.0;
    let mut prev_date: Option<NaiveDate> = None;
    for session in sorted {
        let gap = prev_date
            .map(|p| (session.date - p).num_days().max(1))
            .unwrap_or(1);
        let decayed = carried * config.debt_decay.powi(gap as i32);
        let shortfall = (config.target_sleep_min - session.total_sleep_min).max(0.0);
        carried = shortfall + decayed;
        daily.push(DebtDay {
            date: session.date,
            target_min: config.target_sleep_min,
            actual_min: session.total_sleep_min,
            debt_min: carried,
        });
        prev_date = Some(session.date);
    }

    let current = daily.last().map(|d| d.debt_min).unwrap_or(0.0);
    let trend = debt_trend(&daily);
    let nights_to_repay =
        (current / 60.0 * config.repay_nights_per_hour).ceil().max(0.0) as u32;

    Some(SleepDebt {
        daily,
        current_debt_min: current,
        trend,
        nights_to_repay,
    })
}

fn debt_trend(daily: &[DebtDay]) -> TrendDirection {
    let window: Vec<f64> = daily.iter().rev().take(3).rev().map(|d| d.debt_min).collect();
    if window.len() < 2 {
        return TrendDirection::Stable;
    }
    let delta = window.last().unwrap() - window.first().unwrap();
    if delta > 1.0 {
        TrendDirection::Declining
    } else if delta < -1.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Stable
    }
}

/// Bounded [0, 100] recovery score from the debt level/trend and, when
/// available, the HRV trend. Saturates at the bounds; never overflows.
pub fn compute_recovery(
    debt: &SleepDebt,
    hrv: Option<&HrvSummary>,
    config: &SleepConfig,
) -> Recovery {
    let debt_component =
        100.0 * (1.0 - (debt.current_debt_min / config.target_sleep_min).min(1.0));

    let hrv_component = hrv.and_then(|summary| {
        match (summary.trend_delta_ms, summary.baseline_rmssd_ms) {
            (Some(delta), Some(baseline)) if baseline > 0.0 => {
                // +/-10% deviation from baseline saturates the component
                let pct = delta / baseline;
                Some((50.0 + 500.0 * pct).clamp(0.0, 100.0))
            }
            _ => None,
        }
    });

    let (score, debt_only_basis) = match hrv_component {
        Some(h) => ((0.6 * debt_component + 0.4 * h).clamp(0.0, 100.0), false),
        None => (debt_component.clamp(0.0, 100.0), true),
    };

    let zone = if score < 34.0 {
        RecoveryZone::Red
    } else if score < 67.0 {
        RecoveryZone::Yellow
    } else {
        RecoveryZone::Green
    };

    // Falling debt means recovery is improving
    let trend = match debt.trend {
        TrendDirection::Declining => TrendDirection::Declining,
        TrendDirection::Improving => TrendDirection::Improving,
        TrendDirection::Stable => TrendDirection::Stable,
    };

    Recovery {
        score,
        zone,
        trend,
        debt_only_basis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn stage_obs(at: NaiveDateTime, code: f64) -> Observation {
        Observation {
            timestamp: at,
            signal_kind: SignalKind::SleepStage,
            value: code,
            unit: "stage_code".to_string(),
            source_tag: "export".to_string(),
        }
    }

    fn epoch_obs(at: NaiveDateTime, kind: SignalKind, value: f64) -> Observation {
        Observation {
            timestamp: at,
            signal_kind: kind,
            value,
            unit: if kind == SignalKind::HeartRate {
                "bpm".to_string()
            } else {
                "mag".to_string()
            },
            source_tag: "sensor".to_string(),
        }
    }

    /// 23:00 onset, stage intervals of 30 min: light, deep, light, rem,
    /// awake, light (3h total in bed)
    fn reported_night(day: u32) -> Vec<Observation> {
        let codes = [1.0, 2.0, 1.0, 3.0, 0.0, 1.0];
        codes
            .iter()
            .enumerate()
            .map(|(i, &code)| {
                let minutes = (i as i64) * 30;
                stage_obs(ts(day, 23, 0) + Duration::minutes(minutes), code)
            })
            .collect()
    }

    #[test]
    fn test_reported_session_architecture() {
        let store = RecordStore::from_observations(reported_night(4));
        let sessions = analyze_sessions(&store, &SleepConfig::default());

        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert_eq!(s.derivation, Derivation::Reported);
        assert_eq!(s.date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(s.onset, ts(4, 23, 0));
        assert!((s.time_in_bed_min - 180.0).abs() < 1e-9);
        // One 30-min awake span out of six
        assert!((s.total_sleep_min - 150.0).abs() < 1e-9);
        assert!((s.efficiency - 150.0 / 180.0).abs() < 1e-9);
        // 5 transitions over 3 hours
        assert!((s.fragmentation_index - 5.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_epoch_reconstruction_seven_hours() {
        // 7 continuous hours of low motion + depressed HR starting 23:10,
        // bracketed by clearly-awake epochs
        let mut observations = Vec::new();
        let mut at = ts(1, 22, 0);
        let end_awake = ts(1, 23, 10);
        while at < end_awake {
            observations.push(epoch_obs(at, SignalKind::MotionEpoch, 400.0));
            observations.push(epoch_obs(at, SignalKind::HeartRate, 78.0));
            at += Duration::minutes(1);
        }
        let wake = ts(2, 6, 10);
        while at < wake {
            observations.push(epoch_obs(at, SignalKind::MotionEpoch, 10.0));
            observations.push(epoch_obs(at, SignalKind::HeartRate, 55.0));
            at += Duration::minutes(1);
        }
        let done = ts(2, 7, 0);
        while at < done {
            observations.push(epoch_obs(at, SignalKind::MotionEpoch, 500.0));
            observations.push(epoch_obs(at, SignalKind::HeartRate, 82.0));
            at += Duration::minutes(1);
        }

        let store = RecordStore::from_observations(observations);
        let sessions = analyze_sessions(&store, &SleepConfig::default());

        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert!(matches!(s.derivation, Derivation::Reconstructed { .. }));
        assert_eq!(s.onset, ts(1, 23, 10));
        let duration_h = s.time_in_bed_min / 60.0;
        assert!((duration_h - 7.0).abs() < 0.2, "duration {duration_h}h");
        assert_eq!(s.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_reported_wins_over_reconstructed_same_night() {
        let mut observations = reported_night(1);
        // Reconstruction-worthy epoch stream the same night
        let mut at = ts(1, 23, 30);
        while at < ts(2, 5, 0) {
            observations.push(epoch_obs(at, SignalKind::MotionEpoch, 5.0));
            observations.push(epoch_obs(at, SignalKind::HeartRate, 52.0));
            at += Duration::minutes(1);
        }
        let store = RecordStore::from_observations(observations);
        let sessions = analyze_sessions(&store, &SleepConfig::default());

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].derivation, Derivation::Reported);
    }

    #[test]
    fn test_debt_recurrence_non_negative_with_decay() {
        let config = SleepConfig::default();
        let mut sessions = Vec::new();
        // Three nights: 6h, 9h, 7h against an 8h target
        for (i, sleep_h) in [6.0_f64, 9.0, 7.0].iter().enumerate() {
            let day = (i + 1) as u32;
            let onset = ts(day, 23, 0);
            sessions.push(SleepSession {
                date: night_of(onset),
                onset,
                offset: onset + Duration::minutes((sleep_h * 60.0) as i64),
                stage_sequence: vec![StageSpan {
                    stage: SleepStage::Light,
                    minutes: sleep_h * 60.0,
                }],
                total_sleep_min: sleep_h * 60.0,
                time_in_bed_min: sleep_h * 60.0,
                efficiency: 1.0,
                fragmentation_index: 0.0,
                derivation: Derivation::Reported,
            });
        }
        let debt = compute_debt(&sessions, &config).unwrap();

        assert_eq!(debt.daily.len(), 3);
        // Night 1: 120 min short
        assert!((debt.daily[0].debt_min - 120.0).abs() < 1e-9);
        // Night 2: surplus sleep adds nothing; carried debt decays
        assert!((debt.daily[1].debt_min - 120.0 * 0.7).abs() < 1e-9);
        // Night 3: 60 min short plus decayed carry
        assert!((debt.daily[2].debt_min - (60.0 + 120.0 * 0.7 * 0.7)).abs() < 1e-9);
        for day in &debt.daily {
            assert!(day.debt_min >= 0.0);
        }
    }

    #[test]
    fn test_recovery_saturates_and_flags_basis() {
        let config = SleepConfig::default();
        let debt = SleepDebt {
            daily: vec![],
            current_debt_min: 0.0,
            trend: TrendDirection::Stable,
            nights_to_repay: 0,
        };
        let recovery = compute_recovery(&debt, None, &config);
        assert!((recovery.score - 100.0).abs() < 1e-9);
        assert_eq!(recovery.zone, RecoveryZone::Green);
        assert!(recovery.debt_only_basis);

        // Enormous debt cannot push the score below zero
        let crushed = SleepDebt {
            daily: vec![],
            current_debt_min: 10_000.0,
            trend: TrendDirection::Declining,
            nights_to_repay: 99,
        };
        let recovery = compute_recovery(&crushed, None, &config);
        assert_eq!(recovery.score, 0.0);
        assert_eq!(recovery.zone, RecoveryZone::Red);
    }

    #[test]
    fn test_short_bouts_are_discarded() {
        // 20 minutes of stage data is below min_session_min
        let observations: Vec<Observation> = (0..4)
            .map(|i| stage_obs(ts(1, 23, 0) + Duration::minutes(i * 5), 1.0))
            .collect();
        let store = RecordStore::from_observations(observations);
        assert!(analyze_sessions(&store, &SleepConfig::default()).is_empty());
    }
}
