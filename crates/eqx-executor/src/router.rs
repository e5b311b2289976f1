//! Session-aware order router.
//!
//! Chooses the order shape for each purpose and submits it through the
//! broker:
//!
//! - Entry buy / scale-out sell: MARKET during regular hours; otherwise a
//!   LIMIT flagged outside-RTH, cushioned ±0.2% from the mark and rounded
//!   to cents. No mark outside regular hours means no order.
//! - Breakeven stop, trailing stop: STOP / TRAILING-STOP regardless of
//!   session, flagged outside-RTH.
//! - Liquidation: MARKET sell regardless of session.
//!
//! Every call honours an allow flag; a disallowed call is logged and
//! reported as skipped. Each accepted submission records its submit time
//! and then waits for the order to settle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eqx_broker::DynBroker;
use eqx_core::{Instrument, OrderHandle, OrderSide, OrderSpec, Price, Quantity, TimeInForce};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::price_provider::MarkPriceResolver;
use crate::submit_tracker::SubmitTimeTracker;

/// Limit cushion applied to the mark outside regular hours (0.2%).
pub fn limit_cushion() -> Decimal {
    Decimal::new(2, 3)
}

/// Cushioned limit price: above the mark for buys, below it for sells.
pub fn cushioned_limit(mark: Price, side: OrderSide) -> Price {
    let factor = match side {
        OrderSide::Buy => Decimal::ONE + limit_cushion(),
        OrderSide::Sell => Decimal::ONE - limit_cushion(),
    };
    (mark * factor).round_to_cents()
}

/// Why an order is being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderPurpose {
    Entry,
    ScaleOut,
    Breakeven,
    Trailing,
    Liquidation,
}

impl OrderPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPurpose::Entry => "entry",
            OrderPurpose::ScaleOut => "scaleout",
            OrderPurpose::Breakeven => "breakeven",
            OrderPurpose::Trailing => "trailing",
            OrderPurpose::Liquidation => "liquidation",
        }
    }
}

impl fmt::Display for OrderPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The caller's allow flag was false.
    NotAllowed,
    /// Outside regular hours with no usable mark.
    NoPrice,
}

/// Result of a routing call that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Placed(OrderHandle),
    Skipped(SkipReason),
}

impl RouteOutcome {
    #[must_use]
    pub fn is_placed(&self) -> bool {
        matches!(self, RouteOutcome::Placed(_))
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Pause after each accepted submission.
    pub order_settle: Duration,
    /// Trailing distance in percent units (2 = 2%).
    pub trailing_percent: Decimal,
    pub trail_tif: TimeInForce,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            order_settle: Duration::from_millis(200),
            trailing_percent: Decimal::from(2),
            trail_tif: TimeInForce::Gtc,
        }
    }
}

pub struct OrderRouter {
    broker: DynBroker,
    resolver: MarkPriceResolver,
    tracker: Arc<SubmitTimeTracker>,
    config: RouterConfig,
}

impl OrderRouter {
    pub fn new(
        broker: DynBroker,
        resolver: MarkPriceResolver,
        tracker: Arc<SubmitTimeTracker>,
        config: RouterConfig,
    ) -> Self {
        Self {
            broker,
            resolver,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<SubmitTimeTracker> {
        &self.tracker
    }

    /// Entry buy. `known_mark` avoids a second snapshot when the caller
    /// already resolved the price.
    pub async fn place_entry_buy(
        &self,
        instrument: &Instrument,
        quantity: Quantity,
        allow: bool,
        known_mark: Option<Price>,
    ) -> ExecutorResult<RouteOutcome> {
        self.place_session_order(
            OrderPurpose::Entry,
            OrderSide::Buy,
            instrument,
            quantity,
            allow,
            known_mark,
        )
        .await
    }

    /// Partial profit-take sell.
    pub async fn place_scaleout_sell(
        &self,
        instrument: &Instrument,
        quantity: Quantity,
        allow: bool,
        known_mark: Option<Price>,
    ) -> ExecutorResult<RouteOutcome> {
        self.place_session_order(
            OrderPurpose::ScaleOut,
            OrderSide::Sell,
            instrument,
            quantity,
            allow,
            known_mark,
        )
        .await
    }

    /// SELL STOP at the entry price for the full quantity.
    pub async fn place_breakeven_stop(
        &self,
        instrument: &Instrument,
        quantity: Quantity,
        stop_price: Price,
        allow: bool,
    ) -> ExecutorResult<RouteOutcome> {
        if !allow {
            return Ok(self.skip_disallowed(OrderPurpose::Breakeven, instrument, quantity));
        }
        let spec = OrderSpec::stop(OrderSide::Sell, quantity, stop_price);
        self.submit(OrderPurpose::Breakeven, instrument, &spec).await
    }

    /// SELL TRAILING-STOP for the full quantity.
    pub async fn place_trailing_stop(
        &self,
        instrument: &Instrument,
        quantity: Quantity,
        allow: bool,
    ) -> ExecutorResult<RouteOutcome> {
        if !allow {
            return Ok(self.skip_disallowed(OrderPurpose::Trailing, instrument, quantity));
        }
        let spec = OrderSpec::trailing_stop(
            OrderSide::Sell,
            quantity,
            self.config.trailing_percent,
            self.config.trail_tif,
        );
        self.submit(OrderPurpose::Trailing, instrument, &spec).await
    }

    /// Liquidating market sell.
    pub async fn place_market_sell(
        &self,
        instrument: &Instrument,
        quantity: Quantity,
        allow: bool,
    ) -> ExecutorResult<RouteOutcome> {
        if !allow {
            return Ok(self.skip_disallowed(OrderPurpose::Liquidation, instrument, quantity));
        }
        let spec = OrderSpec::market(OrderSide::Sell, quantity);
        self.submit(OrderPurpose::Liquidation, instrument, &spec).await
    }

    async fn place_session_order(
        &self,
        purpose: OrderPurpose,
        side: OrderSide,
        instrument: &Instrument,
        quantity: Quantity,
        allow: bool,
        known_mark: Option<Price>,
    ) -> ExecutorResult<RouteOutcome> {
        if !allow {
            return Ok(self.skip_disallowed(purpose, instrument, quantity));
        }

        let spec = if self.broker.is_regular_session_open_now() {
            OrderSpec::market(side, quantity)
        } else {
            let mark = match known_mark {
                Some(mark) => Some(mark),
                None => self.resolver.resolve(instrument).await,
            };
            let Some(mark) = mark else {
                info!(
                    purpose = %purpose,
                    instrument = %instrument,
                    qty = %quantity,
                    "Order skipped: no price outside regular hours"
                );
                return Ok(RouteOutcome::Skipped(SkipReason::NoPrice));
            };
            OrderSpec::extended_limit(side, quantity, cushioned_limit(mark, side))
        };

        self.submit(purpose, instrument, &spec).await
    }

    fn skip_disallowed(
        &self,
        purpose: OrderPurpose,
        instrument: &Instrument,
        quantity: Quantity,
    ) -> RouteOutcome {
        info!(
            purpose = %purpose,
            instrument = %instrument,
            qty = %quantity,
            "Order skipped: not allowed"
        );
        RouteOutcome::Skipped(SkipReason::NotAllowed)
    }

    async fn submit(
        &self,
        purpose: OrderPurpose,
        instrument: &Instrument,
        spec: &OrderSpec,
    ) -> ExecutorResult<RouteOutcome> {
        info!(purpose = %purpose, instrument = %instrument, order = %spec, "Placing order");

        let handle = self
            .broker
            .place_order(instrument, spec)
            .await
            .map_err(|source| ExecutorError::SubmissionFailed {
                purpose,
                instrument: instrument.label(),
                source,
            })?;

        match handle.order_id {
            Some(order_id) => self.tracker.record_now(order_id),
            None => warn!(
                purpose = %purpose,
                instrument = %instrument,
                "Order accepted without id; submit time not tracked"
            ),
        }

        if !self.config.order_settle.is_zero() {
            tokio::time::sleep(self.config.order_settle).await;
        }

        info!(
            purpose = %purpose,
            instrument = %instrument,
            order_id = ?handle.order_id,
            status = ?handle.status,
            "Order placed"
        );
        Ok(RouteOutcome::Placed(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqx_broker::PaperBroker;
    use eqx_core::{InstrumentId, OrderId, OrderType};
    use rust_decimal_macros::dec;

    fn xyz() -> Instrument {
        Instrument::equity(InstrumentId(777), Some("XYZ".to_string()))
    }

    fn router(broker: &Arc<PaperBroker>) -> OrderRouter {
        let resolver = MarkPriceResolver::new(broker.clone(), Duration::ZERO);
        OrderRouter::new(
            broker.clone(),
            resolver,
            Arc::new(SubmitTimeTracker::new()),
            RouterConfig {
                order_settle: Duration::ZERO,
                ..RouterConfig::default()
            },
        )
    }

    #[test]
    fn test_cushioned_limit_rounds_to_cents() {
        let mark = Price::new(dec!(50));
        assert_eq!(cushioned_limit(mark, OrderSide::Buy), Price::new(dec!(50.10)));
        assert_eq!(cushioned_limit(mark, OrderSide::Sell), Price::new(dec!(49.90)));
        assert_eq!(
            cushioned_limit(Price::new(dec!(12.345)), OrderSide::Buy),
            Price::new(dec!(12.37))
        );
    }

    #[tokio::test]
    async fn test_regular_hours_entry_is_market() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(true));
        let router = router(&broker);

        let outcome = router
            .place_entry_buy(&xyz(), Quantity::units(2), true, None)
            .await
            .unwrap();

        assert!(outcome.is_placed());
        let placements = broker.placements();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].spec.order_type, OrderType::Market);
        assert_eq!(placements[0].spec.limit_price, None);
        assert_eq!(broker.snapshot_requests(), 0);
        assert!(router.tracker().submitted_at(OrderId(1)).is_some());
    }

    #[tokio::test]
    async fn test_extended_hours_entry_uses_known_mark() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(false));
        let router = router(&broker);

        router
            .place_entry_buy(&xyz(), Quantity::units(2), true, Some(Price::new(dec!(50))))
            .await
            .unwrap();

        let spec = &broker.placements()[0].spec;
        assert_eq!(spec.order_type, OrderType::Limit);
        assert_eq!(spec.limit_price, Some(Price::new(dec!(50.10))));
        assert!(spec.outside_rth);
        assert_eq!(broker.snapshot_requests(), 0);
    }

    #[tokio::test]
    async fn test_extended_hours_scaleout_resolves_mark() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(false));
        broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));
        let router = router(&broker);

        router
            .place_scaleout_sell(&xyz(), Quantity::ONE, true, None)
            .await
            .unwrap();

        let spec = &broker.placements()[0].spec;
        assert_eq!(spec.side, OrderSide::Sell);
        assert_eq!(spec.limit_price, Some(Price::new(dec!(49.90))));
        assert_eq!(broker.snapshot_requests(), 1);
    }

    #[tokio::test]
    async fn test_extended_hours_without_price_skips() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(false));
        let router = router(&broker);

        let outcome = router
            .place_entry_buy(&xyz(), Quantity::units(2), true, None)
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::Skipped(SkipReason::NoPrice));
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_disallowed_calls_place_nothing() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(true));
        let router = router(&broker);
        let qty = Quantity::units(2);

        let outcomes = [
            router.place_entry_buy(&xyz(), qty, false, None).await.unwrap(),
            router
                .place_breakeven_stop(&xyz(), qty, Price::new(dec!(50)), false)
                .await
                .unwrap(),
            router.place_trailing_stop(&xyz(), qty, false).await.unwrap(),
            router.place_market_sell(&xyz(), qty, false).await.unwrap(),
        ];

        assert!(outcomes
            .iter()
            .all(|o| *o == RouteOutcome::Skipped(SkipReason::NotAllowed)));
        assert!(broker.placements().is_empty());
    }

    #[tokio::test]
    async fn test_protective_orders_ignore_session() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_regular_session(Some(false));
        let router = router(&broker);
        let qty = Quantity::units(2);

        router
            .place_breakeven_stop(&xyz(), qty, Price::new(dec!(50)), true)
            .await
            .unwrap();
        router.place_trailing_stop(&xyz(), qty, true).await.unwrap();

        let placements = broker.placements();
        assert_eq!(placements[0].spec.order_type, OrderType::Stop);
        assert_eq!(placements[0].spec.stop_price, Some(Price::new(dec!(50))));
        assert_eq!(placements[1].spec.order_type, OrderType::TrailingStop);
        assert_eq!(placements[1].spec.trailing_percent, Some(dec!(2)));
        assert_eq!(placements[1].spec.tif, TimeInForce::Gtc);
        assert!(placements.iter().all(|p| p.spec.outside_rth));
    }

    #[tokio::test]
    async fn test_missing_order_id_is_success_without_tracking() {
        let broker = Arc::new(PaperBroker::default());
        broker.set_omit_order_ids(true);
        let router = router(&broker);

        let outcome = router
            .place_market_sell(&xyz(), Quantity::units(3), true)
            .await
            .unwrap();

        assert!(outcome.is_placed());
        assert!(router.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_broker_rejection_is_typed_error() {
        let broker = Arc::new(PaperBroker::default());
        broker.fail_placements_for(InstrumentId(777));
        let router = router(&broker);

        let err = router
            .place_market_sell(&xyz(), Quantity::units(3), true)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutorError::SubmissionFailed {
                purpose: OrderPurpose::Liquidation,
                ..
            }
        ));
    }
}
