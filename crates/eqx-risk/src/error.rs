//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Risk gate blocked: {gate} - {reason}")]
    GateBlocked { gate: String, reason: String },
}

impl RiskError {
    /// Name of the blocking gate.
    pub fn gate(&self) -> &str {
        match self {
            Self::GateBlocked { gate, .. } => gate,
        }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
