//! Application configuration.
//!
//! Every field has a default, so an empty file is a valid paper-trading
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use eqx_broker::{GatewayConfig, PaperBrokerConfig};
use eqx_core::{RiskConfig, SessionCalendar};
use eqx_telemetry::Verbosity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Broker backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// In-memory broker; nothing leaves the process.
    #[default]
    Paper,
    /// Client Portal REST gateway.
    Gateway,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub kind: BrokerKind,
    /// Gateway settings (`base_url`, `account_id`, ...).
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Seed values for the paper broker.
    #[serde(default)]
    pub paper: PaperBrokerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// CSV export of the signal table.
    #[serde(default = "default_signals_path")]
    pub path: PathBuf,
}

fn default_signals_path() -> PathBuf {
    PathBuf::from("data/stock_execution_signals_5m.csv")
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            path: default_signals_path(),
        }
    }
}

/// Order permission flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Master switch for order placement.
    #[serde(default = "default_true")]
    pub execute_trades: bool,
    /// Keep protective and liquidating orders flowing when trading is off.
    #[serde(default = "default_true")]
    pub allow_exits_when_killed: bool,
    /// Deny entries while still permitting exits.
    #[serde(default)]
    pub force_disable_entries: bool,
    /// Symbols processed each cycle, in order.
    #[serde(default)]
    pub symbols: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            execute_trades: true,
            allow_exits_when_killed: true,
            force_disable_entries: false,
            symbols: Vec::new(),
        }
    }
}

impl ExecutionConfig {
    pub fn allow_entries(&self) -> bool {
        self.execute_trades && !self.force_disable_entries
    }

    pub fn allow_exits(&self) -> bool {
        self.execute_trades || self.allow_exits_when_killed
    }
}

/// Bounded waits, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_mark_wait_ms")]
    pub mark_wait_ms: u64,
    #[serde(default = "default_order_settle_ms")]
    pub order_settle_ms: u64,
    #[serde(default = "default_pnl_first_wait_ms")]
    pub pnl_first_wait_ms: u64,
    #[serde(default = "default_pnl_poll_wait_ms")]
    pub pnl_poll_wait_ms: u64,
    #[serde(default = "default_inter_symbol_delay_ms")]
    pub inter_symbol_delay_ms: u64,
}

fn default_mark_wait_ms() -> u64 {
    600
}

fn default_order_settle_ms() -> u64 {
    200
}

fn default_pnl_first_wait_ms() -> u64 {
    250
}

fn default_pnl_poll_wait_ms() -> u64 {
    50
}

fn default_inter_symbol_delay_ms() -> u64 {
    150
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            mark_wait_ms: default_mark_wait_ms(),
            order_settle_ms: default_order_settle_ms(),
            pnl_first_wait_ms: default_pnl_first_wait_ms(),
            pnl_poll_wait_ms: default_pnl_poll_wait_ms(),
            inter_symbol_delay_ms: default_inter_symbol_delay_ms(),
        }
    }
}

impl TimingConfig {
    /// No waits at all.
    pub fn zero() -> Self {
        Self {
            mark_wait_ms: 0,
            order_settle_ms: 0,
            pnl_first_wait_ms: 0,
            pnl_poll_wait_ms: 0,
            inter_symbol_delay_ms: 0,
        }
    }

    pub fn mark_wait(&self) -> Duration {
        Duration::from_millis(self.mark_wait_ms)
    }

    pub fn order_settle(&self) -> Duration {
        Duration::from_millis(self.order_settle_ms)
    }

    pub fn pnl_first_wait(&self) -> Duration {
        Duration::from_millis(self.pnl_first_wait_ms)
    }

    pub fn pnl_poll_wait(&self) -> Duration {
        Duration::from_millis(self.pnl_poll_wait_ms)
    }

    pub fn inter_symbol_delay(&self) -> Duration {
        Duration::from_millis(self.inter_symbol_delay_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub verbosity: Verbosity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Exchange holidays for the regular-session calendar.
    #[serde(default)]
    pub session: SessionCalendar,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot act on.
    pub fn validate(&self) -> AppResult<()> {
        let risk = &self.risk;
        for (name, value) in [
            ("per_trade_risk_pct", risk.per_trade_risk_pct),
            ("per_day_risk_pct", risk.per_day_risk_pct),
            ("trail_pct", risk.trail_pct),
            ("preflight_stop_pct", risk.preflight_stop_pct),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(AppError::Config(format!(
                    "risk.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if risk.entry_qty == 0 {
            return Err(AppError::Config("risk.entry_qty must be positive".to_string()));
        }
        if risk.scaleout_qty == 0 {
            return Err(AppError::Config(
                "risk.scaleout_qty must be positive".to_string(),
            ));
        }
        if self.execution.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(AppError::Config("execution.symbols contains a blank entry".to_string()));
        }
        Ok(())
    }

    /// Replace the symbol list, e.g. from the command line.
    pub fn set_symbols(&mut self, symbols: Vec<String>) {
        self.execution.symbols = symbols;
    }
}
