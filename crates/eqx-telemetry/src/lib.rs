//! Structured logging, Prometheus metrics and run statistics.
//!
//! - [`init_logging`]: tracing subscriber with a verbosity-driven filter
//! - [`Metrics`]: process-wide counters for orders, gate denials, breaches
//! - [`RunStats`]: per-symbol counters with a one-line summary
//! - [`CycleReport`]: one structured record per pass over the symbol list

pub mod error;
pub mod logging;
pub mod metrics;
pub mod run_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, Verbosity};
pub use metrics::Metrics;
pub use run_stats::{CycleReport, CycleTotals, RunStats};
