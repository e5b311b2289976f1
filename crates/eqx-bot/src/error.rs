//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] eqx_broker::BrokerError),

    #[error("Executor error: {0}")]
    Executor(#[from] eqx_executor::ExecutorError),

    #[error("Position error: {0}")]
    Position(#[from] eqx_position::PositionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] eqx_telemetry::TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;
