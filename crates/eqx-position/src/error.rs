//! Position error types.

use eqx_broker::BrokerError;
use eqx_executor::ExecutorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Snapshot read failed: {0}")]
    Snapshot(#[from] BrokerError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

pub type PositionResult<T> = Result<T, PositionError>;
