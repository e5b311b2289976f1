//! Executor error types.

use eqx_broker::BrokerError;
use thiserror::Error;

use crate::router::OrderPurpose;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{purpose} submission failed for {instrument}: {source}")]
    SubmissionFailed {
        purpose: OrderPurpose,
        instrument: String,
        #[source]
        source: BrokerError,
    },
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
