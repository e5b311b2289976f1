//! Structured logging initialization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{TelemetryError, TelemetryResult};

/// Log verbosity. `Detailed` enables debug output for the engine crates,
/// including position/order snapshots and per-position state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Normal,
    Detailed,
}

impl Verbosity {
    pub fn is_detailed(&self) -> bool {
        matches!(self, Self::Detailed)
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_filter(&self) -> &'static str {
        match self {
            Self::Normal => "info,eqx=info",
            Self::Detailed => "info,eqx=debug",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Detailed => write!(f, "detailed"),
        }
    }
}

impl FromStr for Verbosity {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "info" => Ok(Self::Normal),
            "detailed" | "debug" => Ok(Self::Detailed),
            other => Err(TelemetryError::InvalidVerbosity(other.to_string())),
        }
    }
}

/// Initialize structured logging.
///
/// JSON output with span context when `RUST_ENV=production`, pretty output
/// otherwise. `RUST_LOG` overrides the verbosity filter.
pub fn init_logging(verbosity: Verbosity) -> TelemetryResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    let result = if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tfmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tfmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
