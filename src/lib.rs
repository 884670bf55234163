//! Physio Insights - Analytics engine for physiological wearable signals
//!
//! Turns raw time-series observations (cognitive tests, heart metrics,
//! sleep and motion epochs, self-reports) into a versioned context packet
//! for a conversational agent: summaries, circadian profile, HRV and
//! sleep analysis, strain, readiness tiering, and detected patterns.
//!
//! ## Modules
//!
//! - **Summaries**: daily/weekly aggregates rebuilt from the record store
//! - **Analyzers**: circadian, hrv, sleep, strain, readiness, patterns
//! - **Assembly**: packet assembler and the `InsightsEngine` facade

pub mod assembler;
pub mod baseline;
pub mod circadian;
pub mod config;
pub mod error;
pub mod hrv;
pub mod patterns;
pub mod pipeline;
pub mod readiness;
pub mod sleep;
pub mod store;
pub mod strain;
pub mod summary;
pub mod types;

pub use baseline::{MemoryStateStore, RotationState, StateStore, UserState};
pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use pipeline::{analyze_observations, AnalysisRun, InsightsEngine};
pub use store::RecordStore;
pub use types::{ContextPacket, Observation, Section, SignalKind};

/// Packet schema version embedded in every context packet
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Engine version embedded in packet meta
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for packet meta
pub const PRODUCER_NAME: &str = "physio-insights";
