//! End-to-end symbol runs against the paper broker.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use eqx_bot::{AppConfig, Engine, TimingConfig};
use eqx_broker::{Broker, MemorySignalStore, PaperBroker};
use eqx_core::{
    Instrument, InstrumentId, OrderSide, OrderStatus, OrderType, Position, Price, Quantity,
    Signal,
};
use rust_decimal_macros::dec;

fn test_config() -> AppConfig {
    AppConfig {
        timing: TimingConfig::zero(),
        ..AppConfig::default()
    }
}

fn trade_signal(symbol: &str, con_id: &str) -> Signal {
    Signal {
        symbol: symbol.to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 15, 5, 0).unwrap(),
        raw_instrument_id: Some(con_id.to_string()),
        trade_signal: true,
    }
}

fn long(id: i64, symbol: &str, qty: u32, avg_cost: Price) -> Position {
    Position {
        instrument: Instrument::equity(InstrumentId(id), Some(symbol.to_string())),
        quantity: Quantity::units(qty),
        avg_cost: Some(avg_cost),
    }
}

struct Harness {
    broker: Arc<PaperBroker>,
    signals: Arc<MemorySignalStore>,
    engine: Engine,
}

fn harness(config: AppConfig) -> Harness {
    let broker = Arc::new(PaperBroker::default());
    broker.set_regular_session(Some(true));
    let signals = Arc::new(MemorySignalStore::new());
    let engine = Engine::new(broker.clone(), signals.clone(), &config);
    Harness {
        broker,
        signals,
        engine,
    }
}

#[tokio::test]
async fn test_signal_to_entry_and_trailing_stop() {
    let h = harness(test_config());
    h.signals.insert(trade_signal("XYZ", "777"));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));

    let stats = h.engine.run("XYZ").await;

    let placements = h.broker.placements();
    assert_eq!(placements.len(), 2);
    assert_eq!(placements[0].instrument.id, InstrumentId(777));
    assert_eq!(placements[0].spec.side, OrderSide::Buy);
    assert_eq!(placements[0].spec.order_type, OrderType::Market);
    assert_eq!(placements[0].spec.quantity, Quantity::units(2));
    assert_eq!(placements[1].spec.side, OrderSide::Sell);
    assert_eq!(placements[1].spec.order_type, OrderType::TrailingStop);
    assert_eq!(placements[1].spec.quantity, Quantity::units(2));
    assert_eq!(placements[1].spec.trailing_percent, Some(dec!(2)));

    assert_eq!(stats.signals, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.trailing_ensured, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.denied_by, None);
}

#[tokio::test]
async fn test_entry_outside_regular_hours_is_cushioned_limit() {
    let h = harness(test_config());
    h.broker.set_regular_session(Some(false));
    h.signals.insert(trade_signal("XYZ", "777"));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));

    h.engine.run("XYZ").await;

    let entry = &h.broker.placements()[0].spec;
    assert_eq!(entry.order_type, OrderType::Limit);
    assert_eq!(entry.limit_price, Some(Price::new(dec!(50.10))));
    assert!(entry.outside_rth);
}

#[tokio::test]
async fn test_rerun_is_blocked_by_fresh_entry_order() {
    let h = harness(test_config());
    h.signals.insert(trade_signal("XYZ", "777"));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));

    h.engine.run("XYZ").await;
    let second = h.engine.run("XYZ").await;

    assert_eq!(h.broker.placements().len(), 2);
    assert_eq!(second.entries, 0);
    assert_eq!(second.denied_by.as_deref(), Some("min_order_age"));
}

#[tokio::test]
async fn test_daily_loss_breach_liquidates_and_denies_entry() {
    let h = harness(test_config());
    h.broker.set_account_values(&[("BuyingPower", "10000")]);
    h.broker.set_daily_pnl(Some(dec!(-150)));
    h.broker.add_position(long(777, "XYZ", 2, Price::new(dec!(50))));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));
    h.signals.insert(trade_signal("ABC", "888"));

    let stats = h.engine.run("ABC").await;

    let placements = h.broker.placements();
    assert_eq!(placements[0].instrument.id, InstrumentId(777));
    assert_eq!(placements[0].spec.side, OrderSide::Sell);
    assert_eq!(placements[0].spec.order_type, OrderType::Market);
    assert_eq!(placements[0].spec.quantity, Quantity::units(2));
    assert!(placements.iter().all(|p| p.spec.side == OrderSide::Sell));
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.denied_by.as_deref(), Some("kill_switch"));
}

#[tokio::test]
async fn test_bad_instrument_id_counts_error_and_still_manages_positions() {
    let h = harness(test_config());
    h.signals.insert(trade_signal("XYZ", "not-a-number"));
    h.broker.add_position(long(555, "ABC", 2, Price::new(dec!(100))));
    h.broker.set_last_price(InstrumentId(555), Price::new(dec!(102)));

    let stats = h.engine.run("XYZ").await;

    assert_eq!(stats.signals, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.denied_by.as_deref(), Some("signal"));
    assert_eq!(stats.breakeven_stops, 1);
    assert_eq!(stats.scaleouts, 1);
    assert_eq!(stats.trailing_ensured, 1);
    assert!(h
        .broker
        .placements()
        .iter()
        .all(|p| p.instrument.id == InstrumentId(555)));
}

#[tokio::test]
async fn test_disabled_entries_still_protect_positions() {
    let mut config = test_config();
    config.execution.force_disable_entries = true;
    let h = harness(config);
    h.signals.insert(trade_signal("XYZ", "777"));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));
    h.broker.add_position(long(555, "ABC", 1, Price::new(dec!(100))));
    h.broker.set_last_price(InstrumentId(555), Price::new(dec!(100)));

    let stats = h.engine.run("XYZ").await;

    assert_eq!(stats.denied_by.as_deref(), Some("entries_enabled"));
    let placements = h.broker.placements();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].instrument.id, InstrumentId(555));
    assert_eq!(placements[0].spec.order_type, OrderType::TrailingStop);
    assert_eq!(stats.trailing_ensured, 1);
}

#[tokio::test]
async fn test_missing_mark_is_a_no_price_skip() {
    let h = harness(test_config());
    h.signals.insert(trade_signal("XYZ", "777"));

    let stats = h.engine.run("XYZ").await;

    assert!(h.broker.placements().is_empty());
    assert_eq!(stats.no_price_skips, 1);
    assert_eq!(stats.denied_by.as_deref(), Some("price_available"));
}

#[tokio::test]
async fn test_zero_buying_power_denies_on_preflight_risk() {
    let h = harness(test_config());
    h.broker.set_account_values(&[("BuyingPower", "0")]);
    h.signals.insert(trade_signal("XYZ", "777"));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));

    let stats = h.engine.run("XYZ").await;

    assert!(h.broker.placements().is_empty());
    assert_eq!(stats.denied_by.as_deref(), Some("preflight_risk"));
}

#[tokio::test]
async fn test_signal_store_failure_is_counted() {
    let h = harness(test_config());
    h.signals.set_fail(true);

    let stats = h.engine.run("XYZ").await;

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.denied_by.as_deref(), Some("signal"));
}

#[tokio::test]
async fn test_run_many_reports_every_symbol_and_disconnects() {
    let h = harness(test_config());
    h.signals.insert(trade_signal("XYZ", "777"));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));

    let report = h
        .engine
        .run_many(&["XYZ".to_string(), "ABC".to_string()])
        .await;

    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.runs[0].symbol, "XYZ");
    assert_eq!(report.runs[1].denied_by.as_deref(), Some("signal"));
    assert!(report.finished_at.is_some());
    assert_eq!(report.totals().entries, 1);
    assert!(!h.broker.is_connected());
}

#[tokio::test]
async fn test_manual_flatten_sells_every_long() {
    let h = harness(test_config());
    h.broker.add_position(long(777, "XYZ", 2, Price::new(dec!(50))));
    h.broker.add_position(long(555, "ABC", 3, Price::new(dec!(10))));

    let report = h.engine.flatten_all().await.unwrap();

    assert_eq!(report.requested, 2);
    assert_eq!(report.submitted, 2);
    assert!(h
        .broker
        .placements()
        .iter()
        .all(|p| p.spec.order_type == OrderType::Market && p.spec.side == OrderSide::Sell));
}

#[tokio::test]
async fn test_submit_times_of_finished_orders_are_pruned() {
    let mut config = test_config();
    config.risk.min_order_age_seconds = 0;
    let h = harness(config);
    h.signals.insert(trade_signal("XYZ", "777"));
    h.broker.set_last_price(InstrumentId(777), Price::new(dec!(50)));

    h.engine.run("XYZ").await;
    let entry = h
        .broker
        .orders()
        .into_iter()
        .find(|o| o.side == OrderSide::Buy)
        .unwrap();
    let tracker = h.engine.router().tracker();
    assert!(tracker.submitted_at(entry.order_id).is_some());

    h.broker.set_order_status(entry.order_id, OrderStatus::Cancelled);
    h.engine.run("XYZ").await;

    assert_eq!(tracker.submitted_at(entry.order_id), None);
}
