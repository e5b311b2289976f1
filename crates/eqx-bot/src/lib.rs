//! Equity execution engine: configuration, wiring and the per-symbol run.
//!
//! Components:
//! - [`AppConfig`]: TOML configuration with defaults for every field
//! - [`Engine`]: kill switch, entry gates, entry routing, position management
//! - [`Application`]: binds the configured broker and signal store to an engine

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, Engine};
pub use config::{
    AppConfig, BrokerConfig, BrokerKind, ExecutionConfig, LoggingConfig, SignalsConfig,
    TimingConfig,
};
pub use error::{AppError, AppResult};
