//! Core types for the analytics pipeline
//!
//! This module defines the data structures that flow through each stage:
//! canonical observations, daily/weekly summaries, per-module feature
//! outputs, and the final ContextPacket schema.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signal kinds the engine understands.
///
/// Timestamps are user-local wall-clock time; the ingestion adapter owns
/// timezone normalization and deduplication.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ReactionTime,
    ReadinessScore,
    AgilityScore,
    HeartRate,
    HrvRmssd,
    SkinTemp,
    SleepStage,
    MotionEpoch,
    SelfReportStress,
    SelfReportSleepiness,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::ReactionTime => "reaction_time",
            SignalKind::ReadinessScore => "readiness_score",
            SignalKind::AgilityScore => "agility_score",
            SignalKind::HeartRate => "heart_rate",
            SignalKind::HrvRmssd => "hrv_rmssd",
            SignalKind::SkinTemp => "skin_temp",
            SignalKind::SleepStage => "sleep_stage",
            SignalKind::MotionEpoch => "motion_epoch",
            SignalKind::SelfReportStress => "self_report_stress",
            SignalKind::SelfReportSleepiness => "self_report_sleepiness",
        }
    }
}

/// One time-stamped signal observation. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// User-local wall-clock time (normalized upstream)
    pub timestamp: NaiveDateTime,
    pub signal_kind: SignalKind,
    pub value: f64,
    /// Unit as declared by the adapter (e.g., "ms", "bpm", "stage_code")
    pub unit: String,
    /// Source identifier for provenance (device or export id)
    pub source_tag: String,
}

/// Aggregate statistics for one signal on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Per-day aggregates, rebuilt wholesale from the record store each run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub signals: BTreeMap<SignalKind, SignalStats>,
}

/// Rolling 7-day aggregate derived from daily summaries, never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub days_with_data: usize,
    pub signals: BTreeMap<SignalKind, SignalStats>,
    /// Change in per-signal mean vs the prior week, percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vs_prior_week_pct: Option<BTreeMap<SignalKind, f64>>,
}

/// Per-user anchor values. Anchors only improve; they are never retracted
/// except by explicit recompute over full history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Best readiness test score observed
    pub peak_readiness: Option<f64>,
    /// Best agility test score observed
    pub peak_agility: Option<f64>,
    /// Highest nightly RMSSD observed (ms)
    pub hrv_peak_ms: Option<f64>,
    /// Fastest reaction time observed (ms)
    pub reaction_floor_ms: Option<f64>,
}

/// Rough chronotype bucket derived from acrophase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chronotype {
    MorningLark,
    Intermediate,
    EveningOwl,
}

/// Time-of-day window in fractional hours, wrapped modulo 24
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseWindow {
    pub start_hour: f64,
    pub end_hour: f64,
}

/// Fitted diurnal rhythm for one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircadianProfile {
    pub mesor: f64,
    pub amplitude: f64,
    /// Hour of day at which the fitted rhythm peaks
    pub acrophase_hour: f64,
    pub peak_window: PhaseWindow,
    pub trough_window: PhaseWindow,
    /// Proportion of variance explained by the cosinor fit (0-1)
    pub goodness_of_fit: f64,
    pub sample_count: usize,
    pub distinct_days: usize,
    pub chronotype: Chronotype,
}

/// Cosinor fit outcome for one signal. Below-threshold coverage yields an
/// explicit insufficient_data result, never a fit with NaN parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CircadianFit {
    Fitted {
        #[serde(flatten)]
        profile: CircadianProfile,
    },
    InsufficientData {
        sample_count: usize,
        distinct_days: usize,
        distinct_hours: usize,
    },
}

/// Sleep stage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    Awake,
    Light,
    Deep,
    Rem,
}

impl SleepStage {
    /// Stage code used by adapters for `sleep_stage` observation values
    pub fn from_code(code: f64) -> Option<SleepStage> {
        match code as i64 {
            0 => Some(SleepStage::Awake),
            1 => Some(SleepStage::Light),
            2 => Some(SleepStage::Deep),
            3 => Some(SleepStage::Rem),
            _ => None,
        }
    }
}

/// Contiguous run of one stage within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpan {
    pub stage: SleepStage,
    pub minutes: f64,
}

/// Provenance of a sleep session. Consumers must branch on this before
/// trusting fine-grained stage data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    /// Stage data came directly from session-level export rows
    Reported,
    /// Onset/offset and coarse stages inferred from motion/HR epochs
    Reconstructed { confidence: f64 },
}

/// One detected sleep bout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSession {
    /// Night date: the local date the night is attributed to
    pub date: NaiveDate,
    pub onset: NaiveDateTime,
    pub offset: NaiveDateTime,
    pub stage_sequence: Vec<StageSpan>,
    pub total_sleep_min: f64,
    pub time_in_bed_min: f64,
    /// Sleep time / time in bed, 0-1
    pub efficiency: f64,
    /// Stage transitions per hour of session time
    pub fragmentation_index: f64,
    pub derivation: Derivation,
}

/// Debt trend over the most recent nights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
}

/// One day's entry in the sleep debt ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtDay {
    pub date: NaiveDate,
    pub target_min: f64,
    pub actual_min: f64,
    /// Always >= 0
    pub debt_min: f64,
}

/// Cumulative sleep debt with decay applied night over night
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepDebt {
    pub daily: Vec<DebtDay>,
    pub current_debt_min: f64,
    pub trend: TrendDirection,
    /// Estimated nights to repay at the configured repayment pace
    pub nights_to_repay: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryZone {
    Red,
    Yellow,
    Green,
}

/// Bounded recovery score combining debt trend and HRV trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recovery {
    /// 0-100, saturating at the bounds
    pub score: f64,
    pub zone: RecoveryZone,
    pub trend: TrendDirection,
    /// True when the HRV contribution was absent and the score rests on
    /// sleep debt alone
    pub debt_only_basis: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrainLevel {
    Minimal,
    Light,
    Moderate,
    High,
    Overreaching,
}

/// Intensity bucket minutes accumulated for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketMinutes {
    pub rest_min: f64,
    pub light_min: f64,
    pub moderate_min: f64,
    pub vigorous_min: f64,
}

/// Bounded daily physical-load score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainDay {
    pub date: NaiveDate,
    /// 0-21, monotone non-decreasing in accumulated intensity
    pub score: f64,
    pub level: StrainLevel,
    pub buckets: BucketMinutes,
    pub epoch_count: usize,
    /// Set when the day had fewer contributing epochs than a full day
    pub partial_day: bool,
    /// Extra sleep recommended tonight for high-strain days
    pub sleep_need_adjustment_min: u32,
}

/// Ordinal readiness tier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessTier {
    Low,
    Moderate,
    High,
    Peak,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    DeepWork,
    Physical,
    Social,
    Admin,
}

/// Readiness tier plus the inputs it was derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAssessment {
    pub date: NaiveDate,
    pub tier: ReadinessTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_z_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strain_score: Option<f64>,
    /// Set when the test score was missing and the tier rests on
    /// recovery and strain alone
    pub partial_basis: bool,
    /// Suitability score per task category, 0-1
    pub task_suitability: BTreeMap<TaskCategory, f64>,
}

/// Pattern template identifiers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    SelfComparisonDelta,
    RollingTrend,
    ActivityCluster,
    ContextAnomaly,
    PopulationPercentile,
}

/// A detected cross-signal, multi-day pattern.
///
/// `confidence` is a sample-size-scaled heuristic, not a statistical
/// p-value, and must never be presented as ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub signals_involved: Vec<SignalKind>,
    pub description: String,
    pub confidence: f64,
}

/// A packet section that is either present or explicitly unavailable.
///
/// Unavailable sections serialize as `{"status": "unavailable"}` so naive
/// consumers cannot mistake "not computed" for "zero/empty".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section<T> {
    Available(T),
    Unavailable { status: String },
}

impl<T> Section<T> {
    pub fn unavailable() -> Self {
        Section::Unavailable {
            status: "unavailable".to_string(),
        }
    }

    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Section::Available(v),
            None => Section::unavailable(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Section::Available(_))
    }

    pub fn as_available(&self) -> Option<&T> {
        match self {
            Section::Available(v) => Some(v),
            Section::Unavailable { .. } => None,
        }
    }
}

/// Nightly RMSSD value, direct or derived from beat-interval proxies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightlyRmssd {
    pub date: NaiveDate,
    pub rmssd_ms: f64,
    /// True when no direct rmssd observations existed and the value was
    /// derived from heart-rate interval differences
    pub derived_from_hr: bool,
}

/// Autonomic baseline and trend extraction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    pub nightly: Vec<NightlyRmssd>,
    /// Trailing-window median of nightly RMSSD (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_rmssd_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_rmssd_ms: Option<f64>,
    /// Latest night vs baseline, signed (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_delta_ms: Option<f64>,
    /// Linear slope of nightly RMSSD over the trailing week (ms/day)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope_ms_per_day: Option<f64>,
    pub low_data: bool,
}

/// Cross-module trend summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trends {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_slope_7d: Option<f64>,
    pub readiness_direction: TrendDirection,
    pub hrv: Section<HrvSummary>,
}

/// Engine identity recorded in packet meta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
    /// Fresh per run, like `generated_at`; both are run metadata and the
    /// only fields that differ between re-runs over identical inputs
    pub instance_id: String,
}

/// Earliest/latest observation per signal, for downstream trust assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageWindow {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketMeta {
    /// Run timestamp (RFC 3339). Run metadata, together with
    /// `engine.instance_id`; everything else is a pure function of the
    /// observations and prior state.
    pub generated_at: String,
    pub engine: EngineInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub coverage: BTreeMap<SignalKind, CoverageWindow>,
}

/// The final versioned artifact handed to the downstream agent.
/// Built once per run and never mutated after assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPacket {
    pub schema_version: String,
    pub meta: PacketMeta,
    pub baseline: Baseline,
    pub latest_day: Section<DailySummary>,
    pub daily_summaries: Vec<DailySummary>,
    pub weekly_summaries: Vec<WeeklySummary>,
    pub trends: Section<Trends>,
    pub patterns: Vec<Pattern>,
    pub circadian_profile: Section<BTreeMap<SignalKind, CircadianFit>>,
    pub task_matching: Section<BTreeMap<TaskCategory, f64>>,
    pub sleep_sessions: Section<Vec<SleepSession>>,
    pub sleep_debt: Section<SleepDebt>,
    pub recovery: Section<Recovery>,
    pub strain: Section<Vec<StrainDay>>,
    pub insights: Vec<String>,
}
