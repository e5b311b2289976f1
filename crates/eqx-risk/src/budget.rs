//! Risk budget from account state.
//!
//! `max_trade_risk = B × per_trade_risk_pct`, `max_day_risk = B ×
//! per_day_risk_pct`, where B is buying power with available funds as
//! fallback. Missing or non-numeric values count as zero.

use eqx_broker::AccountSummary;
use eqx_core::{parse_broker_decimal, RiskConfig};
use rust_decimal::Decimal;
use serde::Serialize;

pub const BUYING_POWER_TAG: &str = "BuyingPower";
pub const AVAILABLE_FUNDS_TAG: &str = "AvailableFunds";

/// Buying power from an account summary.
///
/// Blank or unparsable tags are skipped, so a garbled `BuyingPower` falls
/// through to `AvailableFunds`.
pub fn buying_power(summary: &AccountSummary) -> Decimal {
    [BUYING_POWER_TAG, AVAILABLE_FUNDS_TAG]
        .iter()
        .find_map(|tag| summary.get(*tag).and_then(|raw| parse_broker_decimal(raw)))
        .unwrap_or(Decimal::ZERO)
}

/// Dollar risk ceilings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskBudget {
    pub buying_power: Decimal,
    pub max_trade_risk: Decimal,
    pub max_day_risk: Decimal,
}

impl RiskBudget {
    /// Negative buying power is clamped to zero.
    pub fn compute(buying_power: Decimal, risk: &RiskConfig) -> Self {
        let buying_power = buying_power.max(Decimal::ZERO);
        Self {
            buying_power,
            max_trade_risk: buying_power * risk.per_trade_risk_pct,
            max_day_risk: buying_power * risk.per_day_risk_pct,
        }
    }

    pub fn from_summary(summary: &AccountSummary, risk: &RiskConfig) -> Self {
        Self::compute(buying_power(summary), risk)
    }
}
