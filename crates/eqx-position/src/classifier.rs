//! Order classification over a working-order snapshot.
//!
//! Answers "does a protective order of kind K already exist for instrument
//! X". Only NEW/WORKING orders count; filled and cancelled history is
//! ignored. Nothing is cached: callers pass a fresh snapshot every time.

use eqx_core::{InstrumentId, OrderSide, OrderType, WorkingOrder};

/// Working orders for one instrument.
pub fn working_for(
    orders: &[WorkingOrder],
    instrument_id: InstrumentId,
) -> impl Iterator<Item = &WorkingOrder> {
    orders
        .iter()
        .filter(move |o| o.instrument_id == instrument_id && o.status.is_working())
}

fn working_sell_of(
    orders: &[WorkingOrder],
    instrument_id: InstrumentId,
    kinds: &[OrderType],
) -> bool {
    working_for(orders, instrument_id)
        .any(|o| o.side == OrderSide::Sell && kinds.contains(&o.order_type))
}

/// Any working SELL STOP counts as the breakeven stop.
pub fn has_breakeven_stop(orders: &[WorkingOrder], instrument_id: InstrumentId) -> bool {
    working_sell_of(orders, instrument_id, &[OrderType::Stop])
}

/// Any working SELL MARKET/LIMIT counts as a pending scale-out.
pub fn has_scaleout_sell(orders: &[WorkingOrder], instrument_id: InstrumentId) -> bool {
    working_sell_of(orders, instrument_id, &[OrderType::Market, OrderType::Limit])
}

pub fn has_trailing_sell(orders: &[WorkingOrder], instrument_id: InstrumentId) -> bool {
    working_sell_of(orders, instrument_id, &[OrderType::TrailingStop])
}

/// Working entry orders across all instruments: BUY and not TRAILING-STOP.
pub fn open_entry_orders(orders: &[WorkingOrder]) -> Vec<&WorkingOrder> {
    orders
        .iter()
        .filter(|o| o.status.is_working() && o.is_entry())
        .collect()
}

/// Protective orders present for one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtectiveOrders {
    pub breakeven_stop: bool,
    pub scaleout_sell: bool,
    pub trailing_sell: bool,
}

impl ProtectiveOrders {
    pub fn classify(orders: &[WorkingOrder], instrument_id: InstrumentId) -> Self {
        Self {
            breakeven_stop: has_breakeven_stop(orders, instrument_id),
            scaleout_sell: has_scaleout_sell(orders, instrument_id),
            trailing_sell: has_trailing_sell(orders, instrument_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqx_core::{OrderId, OrderStatus, Quantity};

    const XYZ: InstrumentId = InstrumentId(777);
    const ABC: InstrumentId = InstrumentId(111);

    fn order(
        id: i64,
        instrument_id: InstrumentId,
        side: OrderSide,
        order_type: OrderType,
        status: OrderStatus,
    ) -> WorkingOrder {
        WorkingOrder {
            order_id: OrderId(id),
            instrument_id,
            symbol: None,
            side,
            order_type,
            quantity: Quantity::units(2),
            status,
        }
    }

    #[test]
    fn test_classifies_by_kind_and_instrument() {
        let orders = vec![
            order(1, XYZ, OrderSide::Sell, OrderType::Stop, OrderStatus::Working),
            order(2, XYZ, OrderSide::Sell, OrderType::TrailingStop, OrderStatus::New),
            order(3, ABC, OrderSide::Sell, OrderType::Limit, OrderStatus::Working),
        ];

        assert_eq!(
            ProtectiveOrders::classify(&orders, XYZ),
            ProtectiveOrders {
                breakeven_stop: true,
                scaleout_sell: false,
                trailing_sell: true,
            }
        );
        assert!(has_scaleout_sell(&orders, ABC));
        assert!(!has_breakeven_stop(&orders, ABC));
    }

    #[test]
    fn test_terminal_orders_are_ignored() {
        let orders = vec![
            order(1, XYZ, OrderSide::Sell, OrderType::Stop, OrderStatus::Filled),
            order(2, XYZ, OrderSide::Sell, OrderType::TrailingStop, OrderStatus::Cancelled),
            order(3, XYZ, OrderSide::Sell, OrderType::Market, OrderStatus::Rejected),
        ];

        assert_eq!(ProtectiveOrders::classify(&orders, XYZ), ProtectiveOrders::default());
    }

    #[test]
    fn test_buy_stop_is_not_breakeven() {
        let orders = vec![order(1, XYZ, OrderSide::Buy, OrderType::Stop, OrderStatus::Working)];
        assert!(!has_breakeven_stop(&orders, XYZ));
    }

    #[test]
    fn test_open_entry_orders() {
        let orders = vec![
            order(1, XYZ, OrderSide::Buy, OrderType::Limit, OrderStatus::Working),
            order(2, ABC, OrderSide::Buy, OrderType::Market, OrderStatus::New),
            order(3, ABC, OrderSide::Buy, OrderType::TrailingStop, OrderStatus::Working),
            order(4, XYZ, OrderSide::Sell, OrderType::Limit, OrderStatus::Working),
            order(5, XYZ, OrderSide::Buy, OrderType::Limit, OrderStatus::Filled),
        ];

        let ids: Vec<_> = open_entry_orders(&orders).iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![OrderId(1), OrderId(2)]);
    }
}
