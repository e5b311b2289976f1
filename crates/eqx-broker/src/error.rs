//! Broker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Not connected to broker")]
    NotConnected,

    #[error("Broker session not authenticated")]
    NotAuthenticated,

    #[error("No managed account available")]
    NoAccount,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Unexpected broker response: {0}")]
    Decode(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Broker call failed: {0}")]
    CallFailed(String),

    #[error("Signal store error: {0}")]
    SignalStore(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
