//! Daily-loss kill switch.
//!
//! Reads today's PnL for the primary account and, when
//! `daily_pnl ≤ -max_day_risk`, liquidates every long position at market
//! and denies new entries for the rest of the run. PnL that cannot be
//! measured fails open.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eqx_broker::DynBroker;
use eqx_core::{InstrumentId, OrderSide, OrderType, Quantity, WorkingOrder};
use eqx_executor::OrderRouter;
use eqx_position::{
    flatten_all_positions, submit_flatten_requests, working_for, FlattenReason, LiquidationReport,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

/// Waits around the PnL read. The first read after subscribing gets longer
/// to let the first value arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnlTiming {
    pub first_wait: Duration,
    pub poll_wait: Duration,
}

impl Default for PnlTiming {
    fn default() -> Self {
        Self {
            first_wait: Duration::from_millis(250),
            poll_wait: Duration::from_millis(50),
        }
    }
}

/// Reads daily PnL through a single account subscription.
///
/// The account is fixed on first use and reused for the lifetime of the
/// reader.
pub struct DailyPnlReader {
    broker: DynBroker,
    timing: PnlTiming,
    account: Mutex<Option<String>>,
}

impl DailyPnlReader {
    pub fn new(broker: DynBroker, timing: PnlTiming) -> Self {
        Self {
            broker,
            timing,
            account: Mutex::new(None),
        }
    }

    /// Account the subscription is bound to, once established.
    pub fn subscribed_account(&self) -> Option<String> {
        self.account.lock().clone()
    }

    /// `None` when there is no account, no value yet, or the read failed.
    pub async fn read(&self) -> Option<Decimal> {
        let cached = self.account.lock().clone();
        let (account, wait) = match cached {
            Some(account) => (account, self.timing.poll_wait),
            None => {
                let accounts = match self.broker.managed_accounts().await {
                    Ok(accounts) => accounts,
                    Err(e) => {
                        warn!(error = %e, "Managed accounts unavailable; daily PnL unmeasured");
                        return None;
                    }
                };
                let account = accounts.into_iter().next()?;
                *self.account.lock() = Some(account.clone());
                debug!(account = %account, "Daily PnL subscription established");
                (account, self.timing.first_wait)
            }
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        match self.broker.daily_pnl(&account).await {
            Ok(pnl) => pnl,
            Err(e) => {
                warn!(account = %account, error = %e, "Daily PnL read failed");
                None
            }
        }
    }
}

/// Result of one kill-switch evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillSwitchOutcome {
    /// PnL measured and above the limit.
    Clear { daily_pnl: Decimal },
    /// PnL not measurable; entries stay allowed.
    Unmeasured,
    /// Limit breached. `liquidation` is `None` if positions could not be read.
    Breached {
        daily_pnl: Decimal,
        max_day_risk: Decimal,
        liquidation: Option<LiquidationReport>,
    },
}

impl KillSwitchOutcome {
    pub fn allows_entries(&self) -> bool {
        !self.is_breached()
    }

    pub fn is_breached(&self) -> bool {
        matches!(self, Self::Breached { .. })
    }

    pub fn daily_pnl(&self) -> Option<Decimal> {
        match self {
            Self::Clear { daily_pnl } | Self::Breached { daily_pnl, .. } => Some(*daily_pnl),
            Self::Unmeasured => None,
        }
    }
}

/// True if `daily_pnl` is at or below the negative day budget.
pub fn is_daily_loss_breached(daily_pnl: Decimal, max_day_risk: Decimal) -> bool {
    daily_pnl <= -max_day_risk
}

/// Quantity already being sold by working SELL MARKET/LIMIT orders.
pub fn pending_exit_quantity(orders: &[WorkingOrder], instrument_id: InstrumentId) -> Quantity {
    working_for(orders, instrument_id)
        .filter(|o| {
            o.side == OrderSide::Sell && matches!(o.order_type, OrderType::Market | OrderType::Limit)
        })
        .fold(Quantity::ZERO, |total, o| total + o.quantity.whole())
}

pub struct DailyLossKillSwitch {
    reader: DailyPnlReader,
    broker: DynBroker,
    router: Arc<OrderRouter>,
}

impl DailyLossKillSwitch {
    pub fn new(reader: DailyPnlReader, broker: DynBroker, router: Arc<OrderRouter>) -> Self {
        Self {
            reader,
            broker,
            router,
        }
    }

    pub fn reader(&self) -> &DailyPnlReader {
        &self.reader
    }

    /// Evaluate the switch and liquidate on breach.
    ///
    /// Working SELL MARKET/LIMIT quantity counts toward the liquidation, so
    /// repeated breaches do not stack sells and a pending scale-out only
    /// reduces the size of the market sell.
    pub async fn enforce(&self, max_day_risk: Decimal, allow_exits: bool) -> KillSwitchOutcome {
        let pnl = self.reader.read().await;
        info!(
            daily_pnl = ?pnl.map(|p| p.round_dp(2)),
            max_day_risk = %max_day_risk.round_dp(2),
            allow_exits,
            "Daily PnL"
        );

        let Some(daily_pnl) = pnl else {
            return KillSwitchOutcome::Unmeasured;
        };
        if !is_daily_loss_breached(daily_pnl, max_day_risk) {
            return KillSwitchOutcome::Clear { daily_pnl };
        }

        info!(
            daily_pnl = %daily_pnl.round_dp(2),
            max_day_risk = %max_day_risk.round_dp(2),
            action = "liquidate",
            "Daily loss breach"
        );

        let positions = match self.broker.positions().await {
            Ok(positions) => positions,
            Err(e) => {
                error!(error = %e, "Liquidation aborted: positions unavailable");
                return KillSwitchOutcome::Breached {
                    daily_pnl,
                    max_day_risk,
                    liquidation: None,
                };
            }
        };
        // Best effort: without an order snapshot every long position is sold.
        let orders = self.broker.working_orders().await.unwrap_or_default();

        let reason = FlattenReason::DailyLoss {
            daily_pnl,
            max_day_risk,
        };
        let requests: Vec<_> = flatten_all_positions(&positions, reason, Utc::now())
            .into_iter()
            .filter_map(|mut request| {
                let pending = pending_exit_quantity(&orders, request.instrument.id);
                if pending >= request.quantity {
                    info!(
                        instrument = %request.instrument,
                        held = %request.quantity,
                        pending = %pending,
                        "Liquidation already pending"
                    );
                    return None;
                }
                request.quantity = request.quantity - pending;
                Some(request)
            })
            .collect();

        let liquidation = submit_flatten_requests(&self.router, &requests, allow_exits).await;
        info!(
            submitted = liquidation.submitted,
            failed = liquidation.failed,
            "Daily loss kill done"
        );

        KillSwitchOutcome::Breached {
            daily_pnl,
            max_day_risk,
            liquidation: Some(liquidation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqx_broker::PaperBroker;
    use eqx_core::{Instrument, InstrumentId, OrderId, OrderStatus, Position, Price, Quantity};
    use eqx_executor::{MarkPriceResolver, RouterConfig, SubmitTimeTracker};
    use rust_decimal_macros::dec;

    fn zero_timing() -> PnlTiming {
        PnlTiming {
            first_wait: Duration::ZERO,
            poll_wait: Duration::ZERO,
        }
    }

    fn kill_switch(broker: &Arc<PaperBroker>) -> DailyLossKillSwitch {
        let router = OrderRouter::new(
            broker.clone(),
            MarkPriceResolver::new(broker.clone(), Duration::ZERO),
            Arc::new(SubmitTimeTracker::new()),
            RouterConfig {
                order_settle: Duration::ZERO,
                ..RouterConfig::default()
            },
        );
        DailyLossKillSwitch::new(
            DailyPnlReader::new(broker.clone(), zero_timing()),
            broker.clone(),
            Arc::new(router),
        )
    }

    fn seed_longs(broker: &PaperBroker) {
        for (id, qty) in [(777, dec!(2)), (111, dec!(5))] {
            broker.add_position(Position {
                instrument: Instrument::equity(InstrumentId(id), None),
                quantity: Quantity::new(qty),
                avg_cost: Some(Price::new(dec!(10))),
            });
        }
    }

    #[test]
    fn test_breach_threshold() {
        assert!(is_daily_loss_breached(dec!(-150), dec!(100)));
        assert!(is_daily_loss_breached(dec!(-100), dec!(100)));
        assert!(!is_daily_loss_breached(dec!(-50), dec!(100)));
    }

    #[tokio::test]
    async fn test_breach_liquidates_every_long() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(false));
        broker.set_daily_pnl(Some(dec!(-150)));
        seed_longs(&broker);

        let outcome = kill_switch(&broker).enforce(dec!(100), true).await;

        assert!(!outcome.allows_entries());
        let placements = broker.placements();
        assert_eq!(placements.len(), 2);
        assert!(placements
            .iter()
            .all(|p| p.spec.order_type == OrderType::Market && p.spec.side == OrderSide::Sell));
        assert_eq!(placements[1].spec.quantity, Quantity::units(5));
    }

    #[tokio::test]
    async fn test_within_budget_places_nothing() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_daily_pnl(Some(dec!(-50)));
        seed_longs(&broker);

        let outcome = kill_switch(&broker).enforce(dec!(100), true).await;

        assert_eq!(outcome, KillSwitchOutcome::Clear { daily_pnl: dec!(-50) });
        assert!(outcome.allows_entries());
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_unmeasured_pnl_fails_open() {
        let broker = Arc::new(PaperBroker::default());
        seed_longs(&broker);

        let outcome = kill_switch(&broker).enforce(dec!(100), true).await;

        assert_eq!(outcome, KillSwitchOutcome::Unmeasured);
        assert!(outcome.allows_entries());
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_breach_without_exits_still_denies() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_daily_pnl(Some(dec!(-150)));
        seed_longs(&broker);

        let outcome = kill_switch(&broker).enforce(dec!(100), false).await;

        assert!(outcome.is_breached());
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_breach_does_not_stack_sells() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_daily_pnl(Some(dec!(-150)));
        seed_longs(&broker);
        let kill_switch = kill_switch(&broker);

        kill_switch.enforce(dec!(100), true).await;
        let second = kill_switch.enforce(dec!(100), true).await;

        assert_eq!(broker.placements().len(), 2);
        assert!(second.is_breached());
    }

    #[tokio::test]
    async fn test_partial_pending_sell_still_liquidates_remainder() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_daily_pnl(Some(dec!(-150)));
        broker.add_position(Position {
            instrument: Instrument::equity(InstrumentId(777), None),
            quantity: Quantity::units(5),
            avg_cost: Some(Price::new(dec!(10))),
        });
        broker.add_order(WorkingOrder {
            order_id: OrderId(900),
            instrument_id: InstrumentId(777),
            symbol: None,
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            quantity: Quantity::ONE,
            status: OrderStatus::Working,
        });

        kill_switch(&broker).enforce(dec!(100), true).await;

        let placements = broker.placements();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].instrument.id, InstrumentId(777));
        assert_eq!(placements[0].spec.side, OrderSide::Sell);
        assert_eq!(placements[0].spec.order_type, OrderType::Market);
        assert_eq!(placements[0].spec.quantity, Quantity::units(4));
    }

    #[test]
    fn test_pending_exit_quantity_ignores_stops_and_done_orders() {
        let order = |id: i64, order_type: OrderType, status: OrderStatus| WorkingOrder {
            order_id: OrderId(id),
            instrument_id: InstrumentId(777),
            symbol: None,
            side: OrderSide::Sell,
            order_type,
            quantity: Quantity::units(2),
            status,
        };
        let orders = vec![
            order(1, OrderType::Market, OrderStatus::Working),
            order(2, OrderType::Limit, OrderStatus::New),
            order(3, OrderType::TrailingStop, OrderStatus::Working),
            order(4, OrderType::Stop, OrderStatus::Working),
            order(5, OrderType::Market, OrderStatus::Filled),
        ];

        assert_eq!(
            pending_exit_quantity(&orders, InstrumentId(777)),
            Quantity::units(4)
        );
        assert_eq!(pending_exit_quantity(&orders, InstrumentId(111)), Quantity::ZERO);
    }

    #[tokio::test]
    async fn test_reader_subscribes_once() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_daily_pnl(Some(dec!(12.5)));
        let reader = DailyPnlReader::new(broker.clone(), zero_timing());

        assert_eq!(reader.read().await, Some(dec!(12.5)));
        assert_eq!(reader.read().await, Some(dec!(12.5)));
        assert_eq!(reader.subscribed_account().as_deref(), Some("DU0000000"));
        assert_eq!(broker.pnl_requests(), 2);
    }

    #[tokio::test]
    async fn test_reader_without_accounts() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_accounts(Vec::new());
        broker.set_daily_pnl(Some(dec!(1)));
        let reader = DailyPnlReader::new(broker.clone(), zero_timing());

        assert_eq!(reader.read().await, None);
        assert_eq!(broker.pnl_requests(), 0);
    }
}
