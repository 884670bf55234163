//! Error types for the analytics engine
//!
//! Only run-fatal conditions are errors. Sparse or missing signal data is
//! encoded in the ContextPacket itself (unavailable sections, low-data
//! flags) so the downstream agent can reason about data quality.

use thiserror::Error;

/// Errors that abort an analysis run
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State store failure for user {user_id}: {reason}")]
    StateStore { user_id: String, reason: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse observation input: {0}")]
    ParseError(String),
}
