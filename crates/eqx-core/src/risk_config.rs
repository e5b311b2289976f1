//! Risk configuration shared by the budget, gate, router and exit logic.

use crate::order::TimeInForce;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk parameters.
///
/// Thresholds are operator configuration; the defaults mirror the
/// production settings the engine was tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of buying power risked per trade.
    #[serde(default = "default_per_trade_risk_pct")]
    pub per_trade_risk_pct: Decimal,
    /// Fraction of buying power that may be lost per day before the kill switch trips.
    #[serde(default = "default_per_day_risk_pct")]
    pub per_day_risk_pct: Decimal,
    /// Maximum concurrent working entry orders.
    #[serde(default = "default_max_open_orders")]
    pub max_open_orders: usize,
    /// Minimum age of every open entry order before another entry is allowed.
    #[serde(default = "default_min_order_age_seconds")]
    pub min_order_age_seconds: u64,
    /// Trailing-stop distance as a fraction (0.02 = 2%).
    #[serde(default = "default_trail_pct")]
    pub trail_pct: Decimal,
    #[serde(default = "default_trail_tif")]
    pub trail_tif: TimeInForce,
    /// Fixed entry size in shares.
    #[serde(default = "default_entry_qty")]
    pub entry_qty: u32,
    /// Stop distance used only to size the dollar-risk estimate. Never submitted.
    #[serde(default = "default_preflight_stop_pct")]
    pub preflight_stop_pct: Decimal,
    /// Unrealized return (percent units) that arms the breakeven stop.
    #[serde(default = "default_breakeven_trigger_pct")]
    pub breakeven_trigger_pct: Decimal,
    /// Unrealized return (percent units) that triggers the partial scale-out.
    #[serde(default = "default_scaleout_trigger_pct")]
    pub scaleout_trigger_pct: Decimal,
    /// Shares sold on scale-out.
    #[serde(default = "default_scaleout_qty")]
    pub scaleout_qty: u32,
}

fn default_per_trade_risk_pct() -> Decimal {
    dec!(0.005)
}

fn default_per_day_risk_pct() -> Decimal {
    dec!(0.01)
}

fn default_max_open_orders() -> usize {
    3
}

fn default_min_order_age_seconds() -> u64 {
    60 * 60
}

fn default_trail_pct() -> Decimal {
    dec!(0.02)
}

fn default_trail_tif() -> TimeInForce {
    TimeInForce::Gtc
}

fn default_entry_qty() -> u32 {
    2
}

fn default_preflight_stop_pct() -> Decimal {
    dec!(0.04)
}

fn default_breakeven_trigger_pct() -> Decimal {
    dec!(0.5)
}

fn default_scaleout_trigger_pct() -> Decimal {
    dec!(1.0)
}

fn default_scaleout_qty() -> u32 {
    1
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            per_trade_risk_pct: default_per_trade_risk_pct(),
            per_day_risk_pct: default_per_day_risk_pct(),
            max_open_orders: default_max_open_orders(),
            min_order_age_seconds: default_min_order_age_seconds(),
            trail_pct: default_trail_pct(),
            trail_tif: default_trail_tif(),
            entry_qty: default_entry_qty(),
            preflight_stop_pct: default_preflight_stop_pct(),
            breakeven_trigger_pct: default_breakeven_trigger_pct(),
            scaleout_trigger_pct: default_scaleout_trigger_pct(),
            scaleout_qty: default_scaleout_qty(),
        }
    }
}

impl RiskConfig {
    /// Trailing distance in percent units as brokers expect it (0.02 -> 2).
    pub fn trailing_percent(&self) -> Decimal {
        self.trail_pct * Decimal::ONE_HUNDRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RiskConfig::default();
        assert_eq!(cfg.per_trade_risk_pct, dec!(0.005));
        assert_eq!(cfg.per_day_risk_pct, dec!(0.01));
        assert_eq!(cfg.max_open_orders, 3);
        assert_eq!(cfg.min_order_age_seconds, 3600);
        assert_eq!(cfg.trail_tif, TimeInForce::Gtc);
        assert_eq!(cfg.entry_qty, 2);
        assert_eq!(cfg.trailing_percent(), dec!(2));
    }
}
