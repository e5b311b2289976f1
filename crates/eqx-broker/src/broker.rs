//! Broker trait for account state, market snapshots and order placement.
//!
//! Provides a trait-based abstraction over the broker session so that:
//! - The engine can be driven against an in-memory paper broker in tests
//! - The transport (REST gateway, socket API) stays outside the decision logic

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use eqx_core::{Instrument, OrderHandle, OrderSpec, Position, PriceSnapshot, WorkingOrder};
use rust_decimal::Decimal;

use crate::error::BrokerResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Account summary as reported by the broker: tag -> raw value.
///
/// Values are kept as strings because brokers format them inconsistently
/// (thousands separators, blanks for unavailable tags).
pub type AccountSummary = HashMap<String, String>;

/// Broker collaborator.
///
/// All reads return fresh snapshots; implementations must not cache
/// positions or orders across calls.
pub trait Broker: Send + Sync {
    /// Establish the session. Idempotent.
    fn connect(&self) -> BoxFuture<'_, BrokerResult<()>>;

    /// Release the session. Idempotent.
    fn disconnect(&self) -> BoxFuture<'_, BrokerResult<()>>;

    fn is_connected(&self) -> bool;

    /// Accounts managed by this session, primary account first.
    fn managed_accounts(&self) -> BoxFuture<'_, BrokerResult<Vec<String>>>;

    /// Current equity positions.
    fn positions(&self) -> BoxFuture<'_, BrokerResult<Vec<Position>>>;

    /// Orders known to the session, in any lifecycle status.
    ///
    /// Callers filter on [`eqx_core::OrderStatus::is_working`].
    fn working_orders(&self) -> BoxFuture<'_, BrokerResult<Vec<WorkingOrder>>>;

    fn account_summary(&self) -> BoxFuture<'_, BrokerResult<AccountSummary>>;

    /// Submit an order. A missing id in the handle is partial success.
    fn place_order<'a>(
        &'a self,
        instrument: &'a Instrument,
        spec: &'a OrderSpec,
    ) -> BoxFuture<'a, BrokerResult<OrderHandle>>;

    /// Request a one-shot price snapshot and read it back after `wait`.
    fn price_snapshot<'a>(
        &'a self,
        instrument: &'a Instrument,
        wait: Duration,
    ) -> BoxFuture<'a, BrokerResult<PriceSnapshot>>;

    /// Realized plus unrealized PnL for today. `None` when not yet populated.
    fn daily_pnl<'a>(&'a self, account: &'a str) -> BoxFuture<'a, BrokerResult<Option<Decimal>>>;

    fn is_regular_session_open_now(&self) -> bool;
}

/// Arc wrapper for Broker trait objects.
pub type DynBroker = Arc<dyn Broker>;
