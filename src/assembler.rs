//! Packet assembler
//!
//! Pure merge step: takes the analyzer outputs and folds them into the
//! versioned context packet. Nothing is computed here beyond the
//! human-readable insight strings; absent analyzer outputs become
//! explicit unavailable sections, never omitted keys and never
//! fabricated values.

use crate::store::RecordStore;
use crate::types::{
    Baseline, CircadianFit, ContextPacket, DailySummary, EngineInfo, HrvSummary,
    PacketMeta, Pattern, Recovery, RecoveryZone, Section, SignalKind, SleepDebt,
    SleepSession, StrainDay, TierAssessment, TrendDirection, Trends, WeeklySummary,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME, SCHEMA_VERSION};
use std::collections::BTreeMap;

/// Analyzer outputs feeding one packet
pub struct PacketParts {
    pub baseline: Baseline,
    pub daily_summaries: Vec<DailySummary>,
    pub weekly_summaries: Vec<WeeklySummary>,
    pub hrv: Option<HrvSummary>,
    pub patterns: Vec<Pattern>,
    pub circadian: BTreeMap<SignalKind, CircadianFit>,
    pub assessment: Option<TierAssessment>,
    pub sleep_sessions: Vec<SleepSession>,
    pub sleep_debt: Option<SleepDebt>,
    pub recovery: Option<Recovery>,
    pub strain: Option<Vec<StrainDay>>,
}

/// Assemble the final packet. `generated_at` and `instance_id` are the
/// only run-varying inputs; everything else is a pure function of the
/// store and state.
pub fn assemble(
    store: &RecordStore,
    user_id: Option<&str>,
    parts: PacketParts,
    generated_at: String,
    instance_id: String,
) -> ContextPacket {
    let insights = build_insights(&parts);

    let trends = build_trends(&parts);
    let latest_day = Section::from_option(parts.daily_summaries.last().cloned());
    let task_matching = Section::from_option(
        parts
            .assessment
            .as_ref()
            .map(|a| a.task_suitability.clone()),
    );
    let circadian_profile = if parts.circadian.is_empty() {
        Section::unavailable()
    } else {
        Section::Available(parts.circadian)
    };
    let sleep_sessions = if parts.sleep_sessions.is_empty() {
        Section::unavailable()
    } else {
        Section::Available(parts.sleep_sessions)
    };

    ContextPacket {
        schema_version: SCHEMA_VERSION.to_string(),
        meta: PacketMeta {
            generated_at,
            engine: EngineInfo {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id,
            },
            user_id: user_id.map(str::to_string),
            coverage: store.coverage_windows(),
        },
        baseline: parts.baseline,
        latest_day,
        daily_summaries: parts.daily_summaries,
        weekly_summaries: parts.weekly_summaries,
        trends,
        patterns: parts.patterns,
        circadian_profile,
        task_matching,
        sleep_sessions,
        sleep_debt: Section::from_option(parts.sleep_debt),
        recovery: Section::from_option(parts.recovery),
        strain: Section::from_option(parts.strain),
        insights,
    }
}

fn build_trends(parts: &PacketParts) -> Section<Trends> {
    let readiness_slope = readiness_slope_7d(&parts.daily_summaries);
    if readiness_slope.is_none() && parts.hrv.is_none() {
        return Section::unavailable();
    }
    let direction = match readiness_slope {
        Some(s) if s > 0.5 => TrendDirection::Improving,
        Some(s) if s < -0.5 => TrendDirection::Declining,
        _ => TrendDirection::Stable,
    };
    Section::Available(Trends {
        readiness_slope_7d: readiness_slope,
        readiness_direction: direction,
        hrv: Section::from_option(parts.hrv.clone()),
    })
}

fn readiness_slope_7d(dailies: &[DailySummary]) -> Option<f64> {
    let series: Vec<f64> = dailies
        .iter()
        .filter_map(|d| d.signals.get(&SignalKind::ReadinessScore).map(|s| s.mean))
        .collect();
    let window: Vec<f64> = series.iter().rev().take(7).rev().copied().collect();
    crate::hrv::linear_slope(&window)
}

/// Conversational one-liners summarizing the packet, in a fixed order
fn build_insights(parts: &PacketParts) -> Vec<String> {
    let mut insights = Vec::new();

    if let Some(assessment) = &parts.assessment {
        let tier = match assessment.tier {
            crate::types::ReadinessTier::Peak => "at a peak",
            crate::types::ReadinessTier::High => "high",
            crate::types::ReadinessTier::Moderate => "moderate",
            crate::types::ReadinessTier::Low => "low",
        };
        if assessment.partial_basis {
            insights.push(format!(
                "Readiness looks {tier} today, though some inputs were missing."
            ));
        } else {
            insights.push(format!("Readiness is {tier} today."));
        }
    }

    if let Some(recovery) = &parts.recovery {
        let zone = match recovery.zone {
            RecoveryZone::Red => "red",
            RecoveryZone::Yellow => "yellow",
            RecoveryZone::Green => "green",
        };
        insights.push(format!(
            "Recovery sits in the {zone} zone at {:.0}/100.",
            recovery.score
        ));
    }

    if let Some(debt) = &parts.sleep_debt {
        if debt.current_debt_min >= 30.0 {
            insights.push(format!(
                "Sleep debt stands at {:.1} h; roughly {} consistent nights would repay it.",
                debt.current_debt_min / 60.0,
                debt.nights_to_repay,
            ));
        }
    }

    if let Some(days) = &parts.strain {
        if let Some(latest) = days.last() {
            if latest.sleep_need_adjustment_min > 0 {
                insights.push(format!(
                    "Strain reached {:.1} of 21; aim for about {} extra minutes of sleep tonight.",
                    latest.score, latest.sleep_need_adjustment_min,
                ));
            }
        }
    }

    if let Some(hrv) = &parts.hrv {
        if let Some(delta) = hrv.trend_delta_ms {
            if delta.abs() >= 3.0 {
                let side = if delta > 0.0 { "above" } else { "below" };
                insights.push(format!(
                    "Overnight HRV is running {:.0} ms {side} your baseline.",
                    delta.abs()
                ));
            }
        }
    }

    if let Some(CircadianFit::Fitted { profile }) =
        parts.circadian.get(&SignalKind::ReadinessScore)
    {
        let chronotype = match profile.chronotype {
            crate::types::Chronotype::MorningLark => "a morning type",
            crate::types::Chronotype::Intermediate => "an intermediate type",
            crate::types::Chronotype::EveningOwl => "an evening type",
        };
        insights.push(format!(
            "Your readiness tends to peak around {:02}:00, consistent with {chronotype}.",
            profile.acrophase_hour.round() as u32 % 24,
        ));
    }

    for pattern in &parts.patterns {
        insights.push(format!("Noticed: {}.", pattern.description));
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;
    use chrono::NaiveDate;

    fn empty_parts() -> PacketParts {
        PacketParts {
            baseline: Baseline::default(),
            daily_summaries: Vec::new(),
            weekly_summaries: Vec::new(),
            hrv: None,
            patterns: Vec::new(),
            circadian: BTreeMap::new(),
            assessment: None,
            sleep_sessions: Vec::new(),
            sleep_debt: None,
            recovery: None,
            strain: None,
        }
    }

    fn tiny_store() -> RecordStore {
        RecordStore::from_observations(vec![Observation {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            signal_kind: SignalKind::ReactionTime,
            value: 150.0,
            unit: "ms".to_string(),
            source_tag: "test".to_string(),
        }])
    }

    #[test]
    fn test_absent_sections_serialize_as_unavailable() {
        let packet = assemble(
            &tiny_store(),
            None,
            empty_parts(),
            "2024-03-01T10:00:00Z".to_string(),
            "instance".to_string(),
        );
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&packet).unwrap()).unwrap();

        for key in [
            "trends",
            "circadian_profile",
            "task_matching",
            "sleep_sessions",
            "sleep_debt",
            "recovery",
            "strain",
            "latest_day",
        ] {
            assert_eq!(
                json[key]["status"], "unavailable",
                "section {key} should carry the sentinel"
            );
        }
        assert_eq!(json["schema_version"], SCHEMA_VERSION);
    }

    #[test]
    fn test_meta_carries_coverage_and_identity() {
        let packet = assemble(
            &tiny_store(),
            Some("user-7"),
            empty_parts(),
            "2024-03-01T10:00:00Z".to_string(),
            "instance".to_string(),
        );
        assert_eq!(packet.meta.user_id.as_deref(), Some("user-7"));
        assert_eq!(packet.meta.engine.name, PRODUCER_NAME);
        let coverage = &packet.meta.coverage[&SignalKind::ReactionTime];
        assert_eq!(coverage.count, 1);
    }

    #[test]
    fn test_insights_mention_recovery_zone() {
        let mut parts = empty_parts();
        parts.recovery = Some(Recovery {
            score: 25.0,
            zone: RecoveryZone::Red,
            trend: TrendDirection::Declining,
            debt_only_basis: true,
        });
        let packet = assemble(
            &tiny_store(),
            None,
            parts,
            "2024-03-01T10:00:00Z".to_string(),
            "instance".to_string(),
        );
        assert!(packet.insights.iter().any(|i| i.contains("red zone")));
    }
}
