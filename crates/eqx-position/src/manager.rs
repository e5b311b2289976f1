//! Staged protective-exit management.
//!
//! For every long position, each cycle:
//!
//! 1. `return ≥ breakeven_trigger_pct` and no working SELL STOP
//!    → SELL STOP at the entry price for the full quantity.
//! 2. `return ≥ scaleout_trigger_pct`, quantity ≥ `scaleout_qty + 1` and no
//!    working SELL MARKET/LIMIT → sell `scaleout_qty` through the router.
//! 3. No working SELL TRAILING-STOP → trailing stop for the full quantity.
//!
//! The rules are evaluated independently in the same pass. Protective state
//! is derived from the broker's working orders, so re-running on an
//! unchanged snapshot places nothing new.

use std::sync::Arc;

use eqx_broker::DynBroker;
use eqx_core::{Position, Price, Quantity, RiskConfig};
use eqx_executor::{MarkPriceResolver, OrderRouter, RouteOutcome, SkipReason};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::classifier::ProtectiveOrders;
use crate::error::PositionResult;

/// Exit thresholds. Percent values are in percent units (0.5 = 0.5%).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRules {
    pub breakeven_trigger_pct: Decimal,
    pub scaleout_trigger_pct: Decimal,
    pub scaleout_qty: Quantity,
}

impl ExitRules {
    pub fn from_risk(risk: &RiskConfig) -> Self {
        Self {
            breakeven_trigger_pct: risk.breakeven_trigger_pct,
            scaleout_trigger_pct: risk.scaleout_trigger_pct,
            scaleout_qty: Quantity::units(risk.scaleout_qty),
        }
    }

    /// A scale-out must leave at least one unit behind.
    pub fn scaleout_allowed(&self, quantity: Quantity) -> bool {
        self.scaleout_qty.is_positive() && quantity >= self.scaleout_qty + Quantity::ONE
    }
}

impl Default for ExitRules {
    fn default() -> Self {
        Self::from_risk(&RiskConfig::default())
    }
}

/// What one management pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagementReport {
    /// Long positions considered.
    pub positions: usize,
    /// Positions with both entry and mark available.
    pub evaluated: usize,
    pub breakeven_placed: u32,
    pub scaleouts_placed: u32,
    pub trailing_ensured: u32,
    pub no_price_skips: u32,
    pub errors: u32,
}

impl ManagementReport {
    pub fn orders_placed(&self) -> u32 {
        self.breakeven_placed + self.scaleouts_placed + self.trailing_ensured
    }

    /// True if the order was placed. No-price skips are counted here.
    fn record(&mut self, outcome: &RouteOutcome) -> bool {
        match outcome {
            RouteOutcome::Placed(_) => true,
            RouteOutcome::Skipped(SkipReason::NoPrice) => {
                self.no_price_skips += 1;
                false
            }
            RouteOutcome::Skipped(SkipReason::NotAllowed) => false,
        }
    }
}

pub struct PositionManager {
    broker: DynBroker,
    router: Arc<OrderRouter>,
    resolver: MarkPriceResolver,
    rules: ExitRules,
}

impl PositionManager {
    pub fn new(
        broker: DynBroker,
        router: Arc<OrderRouter>,
        resolver: MarkPriceResolver,
        rules: ExitRules,
    ) -> Self {
        Self {
            broker,
            router,
            resolver,
            rules,
        }
    }

    pub fn rules(&self) -> &ExitRules {
        &self.rules
    }

    /// Manage every open long position.
    ///
    /// Fails only if the position snapshot cannot be read. A failure while
    /// managing one position is logged, counted and does not stop the others.
    /// `log_state` enables per-position state at debug level.
    pub async fn manage_all(
        &self,
        allow_exits: bool,
        log_state: bool,
    ) -> PositionResult<ManagementReport> {
        let positions = self.broker.positions().await?;
        let mut report = ManagementReport::default();

        for position in positions.iter().filter(|p| p.is_long()) {
            report.positions += 1;
            if let Err(e) = self
                .manage_one(position, allow_exits, log_state, &mut report)
                .await
            {
                report.errors += 1;
                warn!(
                    instrument = %position.instrument,
                    qty = %position.quantity,
                    error = %e,
                    "Position management failed"
                );
            }
        }

        Ok(report)
    }

    async fn manage_one(
        &self,
        position: &Position,
        allow_exits: bool,
        log_state: bool,
        report: &mut ManagementReport,
    ) -> PositionResult<()> {
        let instrument = &position.instrument;
        let qty = position.quantity.whole();
        if !qty.is_positive() {
            return Ok(());
        }

        let Some(entry) = position.entry_price() else {
            if log_state {
                debug!(instrument = %instrument, qty = %qty, "Skip: no entry price");
            }
            return Ok(());
        };
        let Some(mark) = self.resolver.resolve(instrument).await else {
            if log_state {
                debug!(instrument = %instrument, qty = %qty, "Skip: no mark price");
            }
            return Ok(());
        };
        let Some(ret_pct) = return_pct(entry, mark) else {
            return Ok(());
        };
        report.evaluated += 1;

        let orders = self.broker.working_orders().await?;
        let protective = ProtectiveOrders::classify(&orders, instrument.id);

        if log_state {
            debug!(
                instrument = %instrument,
                qty = %qty,
                entry = %entry,
                mark = %mark,
                return_pct = %ret_pct.round_dp(3),
                breakeven_stop = protective.breakeven_stop,
                scaleout_sell = protective.scaleout_sell,
                trailing_sell = protective.trailing_sell,
                "Position state"
            );
        }

        if ret_pct >= self.rules.breakeven_trigger_pct && !protective.breakeven_stop {
            info!(
                instrument = %instrument,
                qty = %qty,
                stop_price = %entry,
                return_pct = %ret_pct.round_dp(3),
                "Breakeven trigger"
            );
            let outcome = self
                .router
                .place_breakeven_stop(instrument, qty, entry, allow_exits)
                .await?;
            if report.record(&outcome) {
                report.breakeven_placed += 1;
            }
        }

        if ret_pct >= self.rules.scaleout_trigger_pct
            && self.rules.scaleout_allowed(qty)
            && !protective.scaleout_sell
        {
            info!(
                instrument = %instrument,
                qty = %self.rules.scaleout_qty,
                return_pct = %ret_pct.round_dp(3),
                "Scale-out trigger"
            );
            let outcome = self
                .router
                .place_scaleout_sell(instrument, self.rules.scaleout_qty, allow_exits, Some(mark))
                .await?;
            if report.record(&outcome) {
                report.scaleouts_placed += 1;
            }
        }

        if !protective.trailing_sell {
            info!(instrument = %instrument, qty = %qty, "Trailing stop missing, ensuring");
            let outcome = self
                .router
                .place_trailing_stop(instrument, qty, allow_exits)
                .await?;
            if report.record(&outcome) {
                report.trailing_ensured += 1;
            }
        } else if log_state {
            debug!(instrument = %instrument, "Trailing stop present");
        }

        Ok(())
    }
}

/// Unrealized return in percent, or `None` without a usable entry price.
pub fn return_pct(entry: Price, mark: Price) -> Option<Decimal> {
    entry.positive().and_then(|entry| mark.pct_from(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqx_broker::PaperBroker;
    use eqx_core::{Instrument, InstrumentId, OrderSide, OrderStatus, OrderType};
    use eqx_executor::{RouterConfig, SubmitTimeTracker};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn instrument(id: i64, symbol: &str) -> Instrument {
        Instrument::equity(InstrumentId(id), Some(symbol.to_string()))
    }

    fn long(id: i64, symbol: &str, qty: Decimal, avg_cost: Decimal) -> Position {
        Position {
            instrument: instrument(id, symbol),
            quantity: Quantity::new(qty),
            avg_cost: Some(Price::new(avg_cost)),
        }
    }

    fn manager(broker: &Arc<PaperBroker>) -> PositionManager {
        let resolver = MarkPriceResolver::new(broker.clone(), Duration::ZERO);
        let router = OrderRouter::new(
            broker.clone(),
            resolver.clone(),
            Arc::new(SubmitTimeTracker::new()),
            RouterConfig {
                order_settle: Duration::ZERO,
                ..RouterConfig::default()
            },
        );
        PositionManager::new(broker.clone(), Arc::new(router), resolver, ExitRules::default())
    }

    fn regular_broker() -> Arc<PaperBroker> {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(true));
        broker
    }

    #[test]
    fn test_scaleout_guard() {
        let rules = ExitRules::default();
        assert!(!rules.scaleout_allowed(Quantity::units(1)));
        assert!(rules.scaleout_allowed(Quantity::units(2)));
    }

    #[test]
    fn test_return_pct() {
        assert_eq!(
            return_pct(Price::new(dec!(100)), Price::new(dec!(101.5))),
            Some(dec!(1.5))
        );
        assert_eq!(return_pct(Price::ZERO, Price::new(dec!(1))), None);
    }

    #[tokio::test]
    async fn test_all_three_rules_fire_in_one_pass() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(2), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(101.5)));

        let report = manager(&broker).manage_all(true, true).await.unwrap();

        assert_eq!(report.breakeven_placed, 1);
        assert_eq!(report.scaleouts_placed, 1);
        assert_eq!(report.trailing_ensured, 1);
        let specs: Vec<_> = broker.placements().into_iter().map(|p| p.spec).collect();
        assert_eq!(specs[0].order_type, OrderType::Stop);
        assert_eq!(specs[0].stop_price, Some(Price::new(dec!(100))));
        assert_eq!(specs[0].quantity, Quantity::units(2));
        assert_eq!(specs[1].order_type, OrderType::Market);
        assert_eq!(specs[1].side, OrderSide::Sell);
        assert_eq!(specs[1].quantity, Quantity::ONE);
        assert_eq!(specs[2].order_type, OrderType::TrailingStop);
        assert_eq!(specs[2].quantity, Quantity::units(2));
    }

    #[tokio::test]
    async fn test_rerun_on_unchanged_snapshot_is_idempotent() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(2), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(101.5)));
        let manager = manager(&broker);

        manager.manage_all(true, false).await.unwrap();
        let placed = broker.placements().len();
        let second = manager.manage_all(true, false).await.unwrap();

        assert_eq!(second.orders_placed(), 0);
        assert_eq!(broker.placements().len(), placed);
    }

    #[tokio::test]
    async fn test_cancelled_trailing_stop_is_restored() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(2), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(100)));
        let manager = manager(&broker);

        manager.manage_all(true, false).await.unwrap();
        let trailing = broker
            .orders()
            .into_iter()
            .find(|o| o.order_type == OrderType::TrailingStop)
            .unwrap();
        broker.set_order_status(trailing.order_id, OrderStatus::Cancelled);
        broker.clear_placements();

        let report = manager.manage_all(true, false).await.unwrap();

        assert_eq!(report.trailing_ensured, 1);
        let placements = broker.placements();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].spec.order_type, OrderType::TrailingStop);
        assert_eq!(placements[0].spec.quantity, Quantity::units(2));
    }

    #[tokio::test]
    async fn test_single_unit_never_scales_out() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(1), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(105)));

        let report = manager(&broker).manage_all(true, false).await.unwrap();

        assert_eq!(report.scaleouts_placed, 0);
        assert_eq!(report.breakeven_placed, 1);
        assert_eq!(report.trailing_ensured, 1);
    }

    #[tokio::test]
    async fn test_small_gain_only_ensures_trailing() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(2), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(100.3)));

        let report = manager(&broker).manage_all(true, false).await.unwrap();

        assert_eq!(report.orders_placed(), 1);
        assert_eq!(report.trailing_ensured, 1);
    }

    #[tokio::test]
    async fn test_missing_entry_or_mark_skips_position() {
        let broker = regular_broker();
        broker.add_position(Position {
            avg_cost: None,
            ..long(777, "XYZ", dec!(2), dec!(0))
        });
        broker.add_position(long(111, "ABC", dec!(2), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(101)));

        let report = manager(&broker).manage_all(true, false).await.unwrap();

        assert_eq!(report.positions, 2);
        assert_eq!(report.evaluated, 0);
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_short_and_flat_positions_ignored() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(-3), dec!(100)));
        broker.add_position(long(111, "ABC", dec!(0), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(90)));

        let report = manager(&broker).manage_all(true, false).await.unwrap();

        assert_eq!(report.positions, 0);
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_exits_disallowed_places_nothing() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(2), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(101.5)));

        let report = manager(&broker).manage_all(false, false).await.unwrap();

        assert_eq!(report.evaluated, 1);
        assert_eq!(report.orders_placed(), 0);
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_failure_on_one_position_does_not_stop_others() {
        let broker = regular_broker();
        broker.add_position(long(777, "XYZ", dec!(2), dec!(100)));
        broker.add_position(long(111, "ABC", dec!(2), dec!(100)));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(100.1)));
        broker.set_last_price(InstrumentId(111), Price::new(dec!(100.1)));
        broker.fail_placements_for(InstrumentId(777));

        let report = manager(&broker).manage_all(true, false).await.unwrap();

        assert_eq!(report.errors, 1);
        assert_eq!(report.trailing_ensured, 1);
        let placements = broker.placements();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].instrument.id, InstrumentId(111));
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_error() {
        let broker = regular_broker();
        broker.set_fail_reads(true);

        let result = manager(&broker).manage_all(true, false).await;
        assert!(result.is_err());
    }
}
