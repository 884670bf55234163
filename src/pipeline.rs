//! Engine facade
//!
//! Wires the analyzers together behind one entry point. Configuration is
//! validated up front and rejects the whole run on failure. Per-user
//! state flows value-in/value-out: the caller hands in the prior
//! `UserState` and receives the updated one next to the packet, so the
//! engine itself holds nothing between runs.

use crate::assembler::{self, PacketParts};
use crate::baseline::{self, StateStore, UserState};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::store::RecordStore;
use crate::types::{CircadianFit, CircadianProfile, ContextPacket, Observation, SignalKind};
use crate::{circadian, hrv, patterns, readiness, sleep, strain, summary};
use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// One run's outputs: the packet plus the state to persist for next time
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub packet: ContextPacket,
    pub state: UserState,
}

pub struct InsightsEngine {
    config: AnalysisConfig,
}

impl InsightsEngine {
    /// Build an engine, rejecting invalid configuration outright
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one user's observation history against their prior state
    pub fn run(
        &self,
        observations: Vec<Observation>,
        user_id: Option<&str>,
        mut state: UserState,
    ) -> Result<AnalysisRun, AnalysisError> {
        let store = RecordStore::from_observations(observations);

        baseline::update_baseline(&mut state.baseline, &store);

        let daily_summaries = summary::build_daily_summaries(&store);
        let weekly_summaries = summary::build_weekly_summaries(&daily_summaries);

        let hrv_summary = hrv::analyze(&store, &self.config.hrv);
        let circadian_fits = circadian::profile_signals(&store, &self.config.circadian);
        let readiness_profile = fitted_profile(&circadian_fits, SignalKind::ReadinessScore)
            .or_else(|| fitted_profile(&circadian_fits, SignalKind::ReactionTime));

        let sleep_sessions = sleep::analyze_sessions(&store, &self.config.sleep);
        let sleep_debt = sleep::compute_debt(&sleep_sessions, &self.config.sleep);
        let recovery = sleep_debt
            .as_ref()
            .map(|debt| sleep::compute_recovery(debt, hrv_summary.as_ref(), &self.config.sleep));

        let strain_days = strain::analyze(&store, &self.config.strain);
        let latest_strain = strain_days.as_ref().and_then(|days| days.last());

        let assessment = readiness::assess(
            &store,
            recovery.as_ref(),
            latest_strain,
            readiness_profile,
            &self.config.readiness,
        );

        let detected =
            patterns::detect(&daily_summaries, &mut state.rotation, &self.config.patterns);

        let packet = assembler::assemble(
            &store,
            user_id,
            PacketParts {
                baseline: state.baseline.clone(),
                daily_summaries,
                weekly_summaries,
                hrv: hrv_summary,
                patterns: detected,
                circadian: circadian_fits,
                assessment,
                sleep_sessions,
                sleep_debt,
                recovery,
                strain: strain_days,
            },
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            Uuid::new_v4().to_string(),
        );

        Ok(AnalysisRun { packet, state })
    }

    /// Run against a state store, loading and persisting the user's state
    /// around the analysis
    pub fn run_with_store<S: StateStore>(
        &self,
        store: &mut S,
        user_id: &str,
        observations: Vec<Observation>,
    ) -> Result<ContextPacket, AnalysisError> {
        let state = store.get(user_id)?.unwrap_or_default();
        let run = self.run(observations, Some(user_id), state)?;
        store.put(user_id, &run.state)?;
        Ok(run.packet)
    }
}

fn fitted_profile(
    fits: &std::collections::BTreeMap<SignalKind, CircadianFit>,
    kind: SignalKind,
) -> Option<&CircadianProfile> {
    match fits.get(&kind) {
        Some(CircadianFit::Fitted { profile }) => Some(profile),
        _ => None,
    }
}

/// One-shot convenience: default configuration, fresh state
pub fn analyze_observations(
    observations: Vec<Observation>,
) -> Result<ContextPacket, AnalysisError> {
    let engine = InsightsEngine::with_defaults();
    let run = engine.run(observations, None, UserState::default())?;
    Ok(run.packet)
}
