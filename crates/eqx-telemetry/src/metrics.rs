//! Prometheus metrics for the equity engine.
//!
//! Process-wide counters covering:
//! - Orders submitted, by purpose
//! - Entry gate denials, by gate
//! - Kill-switch breaches
//! - Run errors and no-price skips
//!
//! # Panics
//!
//! Each static unwraps its registration result. Registration only fails on a
//! duplicate metric name, which is a programming error; the panic happens on
//! first access and never afterwards.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Encoder, Gauge,
    IntCounter, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Orders accepted by the broker.
/// Labels: kind (entry/scaleout/breakeven/trailing/liquidation)
pub static ORDERS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "eqx_orders_submitted_total",
        "Orders accepted by the broker",
        &["kind"]
    )
    .unwrap()
});

/// Entry denials by the gate that blocked.
pub static GATE_DENIALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "eqx_gate_denials_total",
        "Entry denials by blocking gate",
        &["gate"]
    )
    .unwrap()
});

pub static KILL_SWITCH_BREACHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "eqx_kill_switch_breaches_total",
        "Daily-loss kill switch breaches"
    )
    .unwrap()
});

pub static RUN_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("eqx_run_errors_total", "Errors counted across symbol runs").unwrap()
});

pub static NO_PRICE_SKIPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "eqx_no_price_skips_total",
        "Actions skipped for lack of a usable price"
    )
    .unwrap()
});

pub static SYMBOL_RUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("eqx_symbol_runs_total", "Completed symbol runs").unwrap()
});

/// Last observed daily PnL of the primary account.
pub static DAILY_PNL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("eqx_daily_pnl", "Last observed daily PnL").unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn order_submitted(kind: &str) {
        ORDERS_SUBMITTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn gate_denied(gate: &str) {
        GATE_DENIALS_TOTAL.with_label_values(&[gate]).inc();
    }

    pub fn kill_switch_breached() {
        KILL_SWITCH_BREACHES_TOTAL.inc();
    }

    pub fn run_errors(n: u64) {
        RUN_ERRORS_TOTAL.inc_by(n);
    }

    pub fn no_price_skips(n: u64) {
        NO_PRICE_SKIPS_TOTAL.inc_by(n);
    }

    pub fn symbol_run_completed() {
        SYMBOL_RUNS_TOTAL.inc();
    }

    pub fn daily_pnl(pnl: Decimal) {
        if let Some(v) = pnl.to_f64() {
            DAILY_PNL.set(v);
        }
    }

    /// Render the default registry in the text exposition format.
    pub fn render() -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&prometheus::gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
