//! Position flattening (liquidation).
//!
//! Builds one market-sell request per long position and submits them
//! through the router. A failure on one request never stops the rest.

use chrono::{DateTime, Utc};
use eqx_core::{Instrument, OrderSide, Position, Quantity};
use eqx_executor::{OrderRouter, RouteOutcome};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Reason for flattening positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlattenReason {
    /// Daily PnL at or below the negative day-risk budget.
    DailyLoss {
        daily_pnl: Decimal,
        max_day_risk: Decimal,
    },
    /// Operator request.
    Manual,
}

impl std::fmt::Display for FlattenReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyLoss {
                daily_pnl,
                max_day_risk,
            } => write!(
                f,
                "DailyLoss(pnl={}, limit={})",
                daily_pnl.round_dp(2),
                max_day_risk.round_dp(2)
            ),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

/// Request to close one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenRequest {
    pub instrument: Instrument,
    /// Always SELL: only long positions are flattened.
    pub side: OrderSide,
    pub quantity: Quantity,
    pub reason: FlattenReason,
    pub requested_at: DateTime<Utc>,
}

/// One request per long position with at least one whole unit.
pub fn flatten_all_positions(
    positions: &[Position],
    reason: FlattenReason,
    now: DateTime<Utc>,
) -> Vec<FlattenRequest> {
    positions
        .iter()
        .filter(|p| p.quantity.whole().is_positive())
        .map(|p| FlattenRequest {
            instrument: p.instrument.clone(),
            side: OrderSide::Sell,
            quantity: p.quantity.whole(),
            reason: reason.clone(),
            requested_at: now,
        })
        .collect()
}

/// Outcome of submitting a batch of flatten requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidationReport {
    pub requested: usize,
    pub submitted: usize,
    pub failed: usize,
}

/// Submit every request as a market sell.
///
/// With `allow_exits` false nothing is submitted.
pub async fn submit_flatten_requests(
    router: &OrderRouter,
    requests: &[FlattenRequest],
    allow_exits: bool,
) -> LiquidationReport {
    let mut report = LiquidationReport {
        requested: requests.len(),
        ..LiquidationReport::default()
    };
    if !allow_exits {
        info!(requested = requests.len(), "Liquidation skipped: exits disabled");
        return report;
    }

    info!(requested = requests.len(), "Liquidation start");
    for request in requests {
        match router
            .place_market_sell(&request.instrument, request.quantity, true)
            .await
        {
            Ok(RouteOutcome::Placed(_)) => report.submitted += 1,
            Ok(RouteOutcome::Skipped(reason)) => {
                info!(instrument = %request.instrument, ?reason, "Liquidation order skipped");
            }
            Err(e) => {
                report.failed += 1;
                error!(
                    instrument = %request.instrument,
                    qty = %request.quantity,
                    reason = %request.reason,
                    error = %e,
                    "Liquidation order failed"
                );
            }
        }
    }
    info!(
        submitted = report.submitted,
        failed = report.failed,
        "Liquidation end"
    );
    report
}
