//! Policy thresholds for every analysis module
//!
//! All heuristic constants live here as named fields rather than inline
//! magic numbers, so they can be tested and recalibrated independently.
//! `AnalysisConfig::validate` runs before any module executes; an invalid
//! configuration aborts the run.

use crate::error::AnalysisError;
use crate::types::SignalKind;
use serde::{Deserialize, Serialize};

/// Circadian profiler thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircadianConfig {
    /// Signals the profiler attempts to fit
    pub fit_signals: Vec<SignalKind>,
    /// Minimum distinct days of coverage before fitting
    pub min_days: usize,
    /// Minimum distinct integer hours-of-day before fitting
    pub min_distinct_hours: usize,
    /// Minimum total samples before fitting
    pub min_samples: usize,
    /// Samples beyond this z-score are winsorized before the fit
    pub outlier_z: f64,
    /// Half-width of the reported peak/trough windows (hours)
    pub window_tolerance_hours: f64,
}

impl Default for CircadianConfig {
    fn default() -> Self {
        Self {
            fit_signals: vec![SignalKind::ReadinessScore, SignalKind::ReactionTime],
            min_days: 5,
            min_distinct_hours: 3,
            min_samples: 6,
            outlier_z: 3.0,
            window_tolerance_hours: 1.5,
        }
    }
}

/// HRV analyzer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvConfig {
    /// Trailing window for the rolling median baseline (days)
    pub baseline_window_days: usize,
    /// Nights below this count set the low_data flag
    pub min_nights: usize,
    /// Nightly window start hour (local), evening side
    pub night_start_hour: u32,
    /// Nightly window end hour (local), morning side
    pub night_end_hour: u32,
}

impl Default for HrvConfig {
    fn default() -> Self {
        Self {
            baseline_window_days: 14,
            min_nights: 3,
            night_start_hour: 21,
            night_end_hour: 9,
        }
    }
}

/// Sleep architecture and debt thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepConfig {
    /// Nightly sleep target (minutes)
    pub target_sleep_min: f64,
    /// Debt decay constant, must be in (0, 1)
    pub debt_decay: f64,
    /// Nights needed to repay one hour of debt
    pub repay_nights_per_hour: f64,
    /// HR below this (bpm) counts toward sleep in epoch mode
    pub sleep_hr_max: f64,
    /// Motion magnitude below this counts toward sleep in epoch mode
    pub sleep_motion_max: f64,
    /// Minimum sustained qualifying epochs before onset is declared
    pub min_sleep_run_epochs: usize,
    /// Consecutive wake epochs that terminate a session
    pub wake_run_epochs: usize,
    /// Epoch duration the adapter emits (minutes)
    pub epoch_minutes: f64,
    /// Sessions shorter than this are discarded (minutes)
    pub min_session_min: f64,
    /// Gap between stage observations that splits sessions (minutes)
    pub session_gap_min: f64,
    /// Confidence attached to reconstructed sessions
    pub reconstructed_confidence: f64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            target_sleep_min: 480.0,
            debt_decay: 0.7,
            repay_nights_per_hour: 4.0,
            sleep_hr_max: 65.0,
            sleep_motion_max: 50.0,
            min_sleep_run_epochs: 20,
            wake_run_epochs: 5,
            epoch_minutes: 0.5,
            min_session_min: 60.0,
            session_gap_min: 30.0,
            reconstructed_confidence: 0.6,
        }
    }
}

/// Strain scorer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainConfig {
    /// Score cap (Borg-style scale)
    pub cap: f64,
    /// Compression scale: larger values flatten the curve
    pub compression_scale: f64,
    /// HR-reserve fractions bounding light/moderate/vigorous buckets
    pub hr_reserve_bounds: [f64; 3],
    /// Motion-magnitude bounds used when HR is absent for an epoch
    pub motion_bounds: [f64; 3],
    /// Bucket weights for rest/light/moderate/vigorous
    pub bucket_weights: [f64; 4],
    /// Assumed resting and max HR for the reserve calculation
    pub resting_hr: f64,
    pub max_hr: f64,
    /// Epochs below this count flag the day partial_day
    pub full_day_epochs: usize,
    /// Epoch duration (minutes)
    pub epoch_minutes: f64,
}

impl Default for StrainConfig {
    fn default() -> Self {
        Self {
            cap: 21.0,
            compression_scale: 160.0,
            hr_reserve_bounds: [0.3, 0.5, 0.7],
            motion_bounds: [50.0, 200.0, 600.0],
            bucket_weights: [0.0, 1.0, 2.0, 4.0],
            resting_hr: 60.0,
            max_hr: 190.0,
            full_day_epochs: 480,
            epoch_minutes: 0.5,
        }
    }
}

/// Readiness tiering cut points.
///
/// Tier bands, highest first: Peak requires z >= peak_z AND recovery >=
/// peak_recovery AND strain <= peak_strain_max; High and Moderate use the
/// graduated bands below; everything else is Low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    pub peak_z: f64,
    pub peak_recovery: f64,
    pub peak_strain_max: f64,
    pub high_z: f64,
    pub high_recovery: f64,
    pub moderate_z: f64,
    pub moderate_recovery: f64,
    /// Minimum historical days before a z-score is computed
    pub min_history_days: usize,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            peak_z: 1.0,
            peak_recovery: 70.0,
            peak_strain_max: 12.0,
            high_z: 0.25,
            high_recovery: 55.0,
            moderate_z: -0.5,
            moderate_recovery: 40.0,
            min_history_days: 3,
        }
    }
}

/// Pattern detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Same-metric points required before trend detection
    pub min_trend_points: usize,
    /// Daily deltas beyond this fraction of baseline trigger
    /// self-comparison patterns
    pub delta_threshold_pct: f64,
    /// Minimum days for activity-score clustering
    pub min_cluster_days: usize,
    /// Sample-size scale for the heuristic confidence
    pub confidence_scale: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_trend_points: 5,
            delta_threshold_pct: 15.0,
            min_cluster_days: 4,
            confidence_scale: 5.0,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub circadian: CircadianConfig,
    pub hrv: HrvConfig,
    pub sleep: SleepConfig,
    pub strain: StrainConfig,
    pub readiness: ReadinessConfig,
    pub patterns: PatternConfig,
}

impl AnalysisConfig {
    /// Validate all thresholds. Called once before any module executes;
    /// failure is fatal for the run.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(0.0..1.0).contains(&self.sleep.debt_decay) || self.sleep.debt_decay <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "sleep.debt_decay must be in (0, 1), got {}",
                self.sleep.debt_decay
            )));
        }
        if self.sleep.target_sleep_min <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "sleep.target_sleep_min must be positive".to_string(),
            ));
        }
        if self.strain.cap <= 0.0 || self.strain.compression_scale <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "strain cap and compression_scale must be positive".to_string(),
            ));
        }
        if self.strain.max_hr <= self.strain.resting_hr {
            return Err(AnalysisError::InvalidConfig(format!(
                "strain.max_hr ({}) must exceed strain.resting_hr ({})",
                self.strain.max_hr, self.strain.resting_hr
            )));
        }
        let mut prev = f64::NEG_INFINITY;
        for bound in self.strain.hr_reserve_bounds {
            if bound <= prev {
                return Err(AnalysisError::InvalidConfig(
                    "strain.hr_reserve_bounds must be strictly increasing".to_string(),
                ));
            }
            prev = bound;
        }
        let mut prev = f64::NEG_INFINITY;
        for bound in self.strain.motion_bounds {
            if bound <= prev {
                return Err(AnalysisError::InvalidConfig(
                    "strain.motion_bounds must be strictly increasing".to_string(),
                ));
            }
            prev = bound;
        }
        if self.strain.epoch_minutes <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "strain.epoch_minutes must be positive".to_string(),
            ));
        }
        if self.strain.bucket_weights.iter().any(|w| *w < 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "strain.bucket_weights must be non-negative".to_string(),
            ));
        }
        if self.sleep.epoch_minutes <= 0.0 || self.sleep.min_session_min <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "sleep.epoch_minutes and sleep.min_session_min must be positive".to_string(),
            ));
        }
        if self.hrv.night_start_hour >= 24 || self.hrv.night_end_hour >= 24 {
            return Err(AnalysisError::InvalidConfig(format!(
                "hrv night window hours must be below 24, got {}..{}",
                self.hrv.night_start_hour, self.hrv.night_end_hour
            )));
        }
        if self.circadian.min_distinct_hours < 3 {
            return Err(AnalysisError::InvalidConfig(
                "circadian.min_distinct_hours must be at least 3 for a well-posed fit"
                    .to_string(),
            ));
        }
        if self.circadian.outlier_z <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "circadian.outlier_z must be positive".to_string(),
            ));
        }
        if self.hrv.baseline_window_days == 0 {
            return Err(AnalysisError::InvalidConfig(
                "hrv.baseline_window_days must be nonzero".to_string(),
            ));
        }
        if self.patterns.min_trend_points < 2 {
            return Err(AnalysisError::InvalidConfig(
                "patterns.min_trend_points must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
