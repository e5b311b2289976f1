//! Risk controls for equity entries.
//!
//! Everything unmeasurable fails toward safety: unknown buying power is a
//! zero budget, unknown price skips the entry, and unknown daily PnL leaves
//! the kill switch open.
//!
//! # Key Components
//!
//! - [`RiskBudget`]: Per-trade and per-day dollar ceilings from buying power
//! - [`DailyPnlReader`]: Single-subscription daily PnL reads
//! - [`DailyLossKillSwitch`]: Liquidate and deny entries on daily-loss breach
//! - [`GatePipeline`]: Ordered, short-circuiting named gates
//!
//! # Entry Gates
//!
//! 1. entries_enabled -> execution flags permit entries
//! 2. kill_switch -> daily loss not breached
//! 3. max_open_orders -> open entry orders below cap
//! 4. min_order_age -> no tracked entry order younger than the minimum
//! 5. already_long -> no long position in the instrument
//! 6. signal -> latest row is a trade signal with a usable instrument id
//! 7. price_available -> mark price resolved
//! 8. preflight_risk -> entry × stop pct × qty within the trade budget

pub mod budget;
pub mod error;
pub mod gates;
pub mod kill_switch;

pub use budget::{buying_power, RiskBudget, AVAILABLE_FUNDS_TAG, BUYING_POWER_TAG};
pub use error::{RiskError, RiskResult};
pub use gates::{
    entry_gates, preflight_dollar_risk, pricing_gates, EntryContext, GateFn, GatePipeline,
    GateResult, PricingContext, GATE_ALREADY_LONG, GATE_ENTRIES_ENABLED, GATE_KILL_SWITCH,
    GATE_MAX_OPEN_ORDERS, GATE_MIN_ORDER_AGE, GATE_PREFLIGHT_RISK, GATE_PRICE_AVAILABLE,
    GATE_SIGNAL,
};
pub use kill_switch::{
    is_daily_loss_breached, DailyLossKillSwitch, DailyPnlReader, KillSwitchOutcome, PnlTiming,
};
