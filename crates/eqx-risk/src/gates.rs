//! Entry gate pipeline.
//!
//! Gates are named functions `(context) -> GateResult`, evaluated in order
//! with short-circuit: the first block decides. Any single block denies the
//! entry.
//!
//! Entry runs the pipeline in two stages because the mark price is only
//! requested once the cheap checks pass:
//!
//! 1. [`entry_gates`] over [`EntryContext`]: entries_enabled, kill_switch,
//!    max_open_orders, min_order_age, already_long, signal.
//! 2. [`pricing_gates`] over [`PricingContext`]: price_available,
//!    preflight_risk.

use std::fmt;

use eqx_core::{InstrumentId, OrderId, Position, Price, Quantity, RiskConfig, Signal};
use rust_decimal::Decimal;
use tracing::trace;

use crate::budget::RiskBudget;
use crate::error::{RiskError, RiskResult};

pub const GATE_ENTRIES_ENABLED: &str = "entries_enabled";
pub const GATE_KILL_SWITCH: &str = "kill_switch";
pub const GATE_MAX_OPEN_ORDERS: &str = "max_open_orders";
pub const GATE_MIN_ORDER_AGE: &str = "min_order_age";
pub const GATE_ALREADY_LONG: &str = "already_long";
pub const GATE_SIGNAL: &str = "signal";
pub const GATE_PRICE_AVAILABLE: &str = "price_available";
pub const GATE_PREFLIGHT_RISK: &str = "preflight_risk";

/// Gate check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    /// Gate passed.
    Pass,
    /// Gate blocked with reason.
    Block(String),
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }
}

/// A gate check over context `C`.
pub type GateFn<C> = fn(&C) -> GateResult;

/// Ordered, short-circuiting list of named gates.
pub struct GatePipeline<C> {
    gates: Vec<(&'static str, GateFn<C>)>,
}

impl<C> GatePipeline<C> {
    pub fn new() -> Self {
        Self { gates: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, check: GateFn<C>) -> Self {
        self.gates.push((name, check));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|(name, _)| *name).collect()
    }

    /// `Ok(())` if every gate passes, else the first block.
    pub fn evaluate(&self, ctx: &C) -> RiskResult<()> {
        for (gate, check) in &self.gates {
            if let GateResult::Block(reason) = check(ctx) {
                trace!(gate = *gate, reason, "gate blocked");
                return Err(RiskError::GateBlocked {
                    gate: (*gate).to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

impl<C> Default for GatePipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for GatePipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePipeline")
            .field("gates", &self.names())
            .finish()
    }
}

/// State the pre-price gates decide on.
#[derive(Debug, Clone)]
pub struct EntryContext<'a> {
    /// Symbol of this run; used for already-long when the signal has no id.
    pub symbol: &'a str,
    pub entries_enabled: bool,
    pub kill_switch_clear: bool,
    pub open_entry_orders: usize,
    /// Seconds since submission for each tracked open entry order.
    pub open_entry_ages: Vec<(OrderId, i64)>,
    pub positions: &'a [Position],
    pub signal: Option<&'a Signal>,
    pub risk: &'a RiskConfig,
}

impl EntryContext<'_> {
    /// Instrument the entry would be placed in.
    pub fn instrument_id(&self) -> Option<InstrumentId> {
        self.signal.and_then(Signal::instrument_id)
    }
}

/// State the pricing gates decide on.
#[derive(Debug, Clone)]
pub struct PricingContext<'a> {
    pub mark: Option<Price>,
    pub entry_qty: Quantity,
    pub budget: &'a RiskBudget,
    pub risk: &'a RiskConfig,
}

impl PricingContext<'_> {
    pub fn dollar_risk(&self) -> Option<Decimal> {
        self.mark
            .map(|mark| preflight_dollar_risk(mark, self.risk.preflight_stop_pct, self.entry_qty))
    }
}

/// `entry × stop_pct × qty`. Used for sizing only; no stop is placed at it.
pub fn preflight_dollar_risk(entry: Price, stop_pct: Decimal, qty: Quantity) -> Decimal {
    entry.inner() * stop_pct * qty.inner()
}

fn check_entries_enabled(ctx: &EntryContext<'_>) -> GateResult {
    if ctx.entries_enabled {
        GateResult::Pass
    } else {
        GateResult::Block("entries disabled".to_string())
    }
}

fn check_kill_switch(ctx: &EntryContext<'_>) -> GateResult {
    if ctx.kill_switch_clear {
        GateResult::Pass
    } else {
        GateResult::Block("daily loss limit breached".to_string())
    }
}

fn check_max_open_orders(ctx: &EntryContext<'_>) -> GateResult {
    if ctx.open_entry_orders >= ctx.risk.max_open_orders {
        GateResult::Block(format!(
            "{} open entry orders >= max {}",
            ctx.open_entry_orders, ctx.risk.max_open_orders
        ))
    } else {
        GateResult::Pass
    }
}

fn check_min_order_age(ctx: &EntryContext<'_>) -> GateResult {
    let min_age = i64::try_from(ctx.risk.min_order_age_seconds).unwrap_or(i64::MAX);
    match ctx.open_entry_ages.iter().find(|(_, age)| *age < min_age) {
        Some((order_id, age)) => GateResult::Block(format!(
            "order {order_id} age {age}s < min {min_age}s"
        )),
        None => GateResult::Pass,
    }
}

fn check_already_long(ctx: &EntryContext<'_>) -> GateResult {
    let target = ctx.instrument_id();
    let held = ctx.positions.iter().filter(|p| p.is_long()).find(|p| match target {
        Some(id) => p.instrument.id == id,
        None => p
            .instrument
            .symbol
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(ctx.symbol)),
    });
    match held {
        Some(p) => GateResult::Block(format!("already long {} x{}", p.instrument, p.quantity)),
        None => GateResult::Pass,
    }
}

fn check_signal(ctx: &EntryContext<'_>) -> GateResult {
    let Some(signal) = ctx.signal else {
        return GateResult::Block("no signal row".to_string());
    };
    if !signal.trade_signal {
        return GateResult::Block("trade_signal false".to_string());
    }
    if signal.instrument_id().is_none() {
        return GateResult::Block(format!(
            "unresolvable instrument id {:?}",
            signal.raw_instrument_id
        ));
    }
    GateResult::Pass
}

fn check_price_available(ctx: &PricingContext<'_>) -> GateResult {
    if ctx.mark.is_some() {
        GateResult::Pass
    } else {
        GateResult::Block("no mark price".to_string())
    }
}

fn check_preflight_risk(ctx: &PricingContext<'_>) -> GateResult {
    let Some(dollar_risk) = ctx.dollar_risk() else {
        return GateResult::Block("no mark price".to_string());
    };
    if dollar_risk > ctx.budget.max_trade_risk {
        GateResult::Block(format!(
            "dollar risk {} > max trade risk {}",
            dollar_risk.round_dp(2),
            ctx.budget.max_trade_risk.round_dp(2)
        ))
    } else {
        GateResult::Pass
    }
}

/// Pre-price entry gates, in evaluation order.
pub fn entry_gates<'a>() -> GatePipeline<EntryContext<'a>> {
    GatePipeline::new()
        .with(GATE_ENTRIES_ENABLED, check_entries_enabled)
        .with(GATE_KILL_SWITCH, check_kill_switch)
        .with(GATE_MAX_OPEN_ORDERS, check_max_open_orders)
        .with(GATE_MIN_ORDER_AGE, check_min_order_age)
        .with(GATE_ALREADY_LONG, check_already_long)
        .with(GATE_SIGNAL, check_signal)
}

/// Pricing gates, evaluated after the mark is resolved.
pub fn pricing_gates<'a>() -> GatePipeline<PricingContext<'a>> {
    GatePipeline::new()
        .with(GATE_PRICE_AVAILABLE, check_price_available)
        .with(GATE_PREFLIGHT_RISK, check_preflight_risk)
}
