//! In-memory paper broker.
//!
//! Serves positions, orders, account values and price snapshots from local
//! state and records every placement. Orders are never matched: a placed
//! order stays WORKING until the state is changed explicitly. Used for dry
//! runs and as the test double for the engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use eqx_core::{
    Instrument, InstrumentId, OrderHandle, OrderId, OrderSpec, OrderStatus, Position, Price,
    PriceSnapshot, SessionCalendar, WorkingOrder,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::broker::{AccountSummary, BoxFuture, Broker};
use crate::error::{BrokerError, BrokerResult};

/// Seed values for a paper session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperBrokerConfig {
    #[serde(default = "default_paper_account")]
    pub account_id: String,
    #[serde(default = "default_paper_buying_power")]
    pub buying_power: Decimal,
    /// Daily PnL to report. Unset means "not measurable".
    #[serde(default)]
    pub daily_pnl: Option<Decimal>,
    /// Force the regular-session flag. Unset follows the calendar.
    #[serde(default)]
    pub regular_session: Option<bool>,
}

fn default_paper_account() -> String {
    "DU0000000".to_string()
}

fn default_paper_buying_power() -> Decimal {
    Decimal::from(100_000)
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            account_id: default_paper_account(),
            buying_power: default_paper_buying_power(),
            daily_pnl: None,
            regular_session: None,
        }
    }
}

/// A recorded placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub order_id: OrderId,
    pub instrument: Instrument,
    pub spec: OrderSpec,
    pub placed_at: DateTime<Utc>,
}

/// In-memory broker.
#[derive(Debug)]
pub struct PaperBroker {
    connected: AtomicBool,
    accounts: Mutex<Vec<String>>,
    positions: Mutex<Vec<Position>>,
    orders: Mutex<Vec<WorkingOrder>>,
    placements: Mutex<Vec<Placement>>,
    summary: Mutex<AccountSummary>,
    daily_pnl: Mutex<Option<Decimal>>,
    snapshots: Mutex<HashMap<InstrumentId, PriceSnapshot>>,
    regular_session: Mutex<Option<bool>>,
    calendar: SessionCalendar,
    next_order_id: AtomicI64,
    fail_reads: AtomicBool,
    fail_placements: Mutex<HashSet<InstrumentId>>,
    omit_order_ids: AtomicBool,
    snapshot_requests: AtomicUsize,
    pnl_requests: AtomicUsize,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(PaperBrokerConfig::default(), SessionCalendar::default())
    }
}

impl PaperBroker {
    /// Create a paper broker seeded from configuration.
    pub fn new(config: PaperBrokerConfig, calendar: SessionCalendar) -> Self {
        let mut summary = AccountSummary::new();
        summary.insert("BuyingPower".to_string(), config.buying_power.to_string());

        Self {
            connected: AtomicBool::new(false),
            accounts: Mutex::new(vec![config.account_id]),
            positions: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            placements: Mutex::new(Vec::new()),
            summary: Mutex::new(summary),
            daily_pnl: Mutex::new(config.daily_pnl),
            snapshots: Mutex::new(HashMap::new()),
            regular_session: Mutex::new(config.regular_session),
            calendar,
            next_order_id: AtomicI64::new(1),
            fail_reads: AtomicBool::new(false),
            fail_placements: Mutex::new(HashSet::new()),
            omit_order_ids: AtomicBool::new(false),
            snapshot_requests: AtomicUsize::new(0),
            pnl_requests: AtomicUsize::new(0),
        }
    }

    /// Replace the account summary with a single tag/value pair per entry.
    pub fn set_account_values(&self, values: &[(&str, &str)]) {
        let mut summary = self.summary.lock();
        summary.clear();
        for (tag, value) in values {
            summary.insert((*tag).to_string(), (*value).to_string());
        }
    }

    pub fn set_accounts(&self, accounts: Vec<String>) {
        *self.accounts.lock() = accounts;
    }

    pub fn add_position(&self, position: Position) {
        self.positions.lock().push(position);
    }

    pub fn add_order(&self, order: WorkingOrder) {
        self.orders.lock().push(order);
    }

    /// Change the status of a known order (e.g. simulate a manual cancel).
    pub fn set_order_status(&self, order_id: OrderId, status: OrderStatus) {
        for order in self.orders.lock().iter_mut() {
            if order.order_id == order_id {
                order.status = status;
            }
        }
    }

    pub fn set_snapshot(&self, instrument_id: InstrumentId, snapshot: PriceSnapshot) {
        self.snapshots.lock().insert(instrument_id, snapshot);
    }

    /// Convenience: a snapshot with only a last trade price.
    pub fn set_last_price(&self, instrument_id: InstrumentId, last: Price) {
        self.set_snapshot(
            instrument_id,
            PriceSnapshot {
                last: Some(last),
                ..PriceSnapshot::default()
            },
        );
    }

    pub fn set_daily_pnl(&self, pnl: Option<Decimal>) {
        *self.daily_pnl.lock() = pnl;
    }

    pub fn set_regular_session(&self, open: Option<bool>) {
        *self.regular_session.lock() = open;
    }

    /// Make position and order reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make placements for an instrument fail.
    pub fn fail_placements_for(&self, instrument_id: InstrumentId) {
        self.fail_placements.lock().insert(instrument_id);
    }

    /// Return handles without order ids (partial success).
    pub fn set_omit_order_ids(&self, omit: bool) {
        self.omit_order_ids.store(omit, Ordering::SeqCst);
    }

    /// Get recorded placements.
    pub fn placements(&self) -> Vec<Placement> {
        self.placements.lock().clone()
    }

    pub fn clear_placements(&self) {
        self.placements.lock().clear();
    }

    pub fn orders(&self) -> Vec<WorkingOrder> {
        self.orders.lock().clone()
    }

    pub fn snapshot_requests(&self) -> usize {
        self.snapshot_requests.load(Ordering::SeqCst)
    }

    pub fn pnl_requests(&self) -> usize {
        self.pnl_requests.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> BrokerResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BrokerError::CallFailed("paper read failure".to_string()));
        }
        Ok(())
    }

    fn record_placement(&self, instrument: &Instrument, spec: &OrderSpec) -> BrokerResult<OrderHandle> {
        if self.fail_placements.lock().contains(&instrument.id) {
            return Err(BrokerError::OrderRejected(format!(
                "paper placement failure for {instrument}"
            )));
        }

        let order_id = OrderId(self.next_order_id.fetch_add(1, Ordering::SeqCst));
        self.orders.lock().push(WorkingOrder {
            order_id,
            instrument_id: instrument.id,
            symbol: instrument.symbol.clone(),
            side: spec.side,
            order_type: spec.order_type,
            quantity: spec.quantity,
            status: OrderStatus::Working,
        });
        self.placements.lock().push(Placement {
            order_id,
            instrument: instrument.clone(),
            spec: spec.clone(),
            placed_at: Utc::now(),
        });
        debug!(order_id = %order_id, instrument = %instrument, spec = %spec, "Paper order accepted");

        let order_id = if self.omit_order_ids.load(Ordering::SeqCst) {
            None
        } else {
            Some(order_id)
        };
        Ok(OrderHandle {
            order_id,
            status: Some(OrderStatus::Working),
        })
    }
}

impl Broker for PaperBroker {
    fn connect(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, BrokerResult<()>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn managed_accounts(&self) -> BoxFuture<'_, BrokerResult<Vec<String>>> {
        Box::pin(async move { Ok(self.accounts.lock().clone()) })
    }

    fn positions(&self) -> BoxFuture<'_, BrokerResult<Vec<Position>>> {
        Box::pin(async move {
            self.check_reads()?;
            Ok(self.positions.lock().clone())
        })
    }

    fn working_orders(&self) -> BoxFuture<'_, BrokerResult<Vec<WorkingOrder>>> {
        Box::pin(async move {
            self.check_reads()?;
            Ok(self.orders.lock().clone())
        })
    }

    fn account_summary(&self) -> BoxFuture<'_, BrokerResult<AccountSummary>> {
        Box::pin(async move { Ok(self.summary.lock().clone()) })
    }

    fn place_order<'a>(
        &'a self,
        instrument: &'a Instrument,
        spec: &'a OrderSpec,
    ) -> BoxFuture<'a, BrokerResult<OrderHandle>> {
        Box::pin(async move { self.record_placement(instrument, spec) })
    }

    fn price_snapshot<'a>(
        &'a self,
        instrument: &'a Instrument,
        wait: Duration,
    ) -> BoxFuture<'a, BrokerResult<PriceSnapshot>> {
        Box::pin(async move {
            self.snapshot_requests.fetch_add(1, Ordering::SeqCst);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            Ok(self
                .snapshots
                .lock()
                .get(&instrument.id)
                .copied()
                .unwrap_or_default())
        })
    }

    fn daily_pnl<'a>(&'a self, _account: &'a str) -> BoxFuture<'a, BrokerResult<Option<Decimal>>> {
        Box::pin(async move {
            self.pnl_requests.fetch_add(1, Ordering::SeqCst);
            Ok(*self.daily_pnl.lock())
        })
    }

    fn is_regular_session_open_now(&self) -> bool {
        match *self.regular_session.lock() {
            Some(open) => open,
            None => self.calendar.is_regular_open_now(),
        }
    }
}
