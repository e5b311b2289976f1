//! Main application orchestration.
//!
//! One symbol run goes through, in order:
//! - Broker connection and risk budgets
//! - Daily-loss kill switch (may liquidate)
//! - Entry gates, mark resolution, pricing gates
//! - Entry buy plus trailing stop
//! - Position management over every long position
//!
//! A run never fails as a whole: errors are logged, counted and reported in
//! the run summary.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use eqx_broker::{CsvSignalStore, DynBroker, GatewayBroker, PaperBroker, SignalStore};
use eqx_core::{Instrument, Quantity, RiskConfig, Signal};
use eqx_executor::{
    MarkPriceResolver, OrderRouter, RouteOutcome, RouterConfig, SkipReason, SubmitTimeTracker,
};
use eqx_position::{
    flatten_all_positions, has_trailing_sell, open_entry_orders, submit_flatten_requests,
    ExitRules, FlattenReason, LiquidationReport, ManagementReport, PositionManager,
};
use eqx_risk::{
    entry_gates, pricing_gates, DailyLossKillSwitch, DailyPnlReader, EntryContext,
    KillSwitchOutcome, PnlTiming, PricingContext, RiskBudget, RiskError, GATE_PRICE_AVAILABLE,
};
use eqx_telemetry::{CycleReport, Metrics, RunStats, Verbosity};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, BrokerKind, ExecutionConfig, TimingConfig};
use crate::error::AppResult;

/// Per-symbol execution engine over a broker and a signal store.
pub struct Engine {
    broker: DynBroker,
    signals: Arc<dyn SignalStore>,
    risk: RiskConfig,
    execution: ExecutionConfig,
    timing: TimingConfig,
    verbosity: Verbosity,
    resolver: MarkPriceResolver,
    router: Arc<OrderRouter>,
    positions: PositionManager,
    kill_switch: DailyLossKillSwitch,
}

impl Engine {
    pub fn new(broker: DynBroker, signals: Arc<dyn SignalStore>, config: &AppConfig) -> Self {
        let timing = config.timing.clone();
        let resolver = MarkPriceResolver::new(broker.clone(), timing.mark_wait());
        let tracker = Arc::new(SubmitTimeTracker::new());
        let router = Arc::new(OrderRouter::new(
            broker.clone(),
            resolver.clone(),
            tracker,
            RouterConfig {
                order_settle: timing.order_settle(),
                trailing_percent: config.risk.trailing_percent(),
                trail_tif: config.risk.trail_tif,
            },
        ));
        let positions = PositionManager::new(
            broker.clone(),
            router.clone(),
            resolver.clone(),
            ExitRules::from_risk(&config.risk),
        );
        let kill_switch = DailyLossKillSwitch::new(
            DailyPnlReader::new(
                broker.clone(),
                PnlTiming {
                    first_wait: timing.pnl_first_wait(),
                    poll_wait: timing.pnl_poll_wait(),
                },
            ),
            broker.clone(),
            router.clone(),
        );

        Self {
            broker,
            signals,
            risk: config.risk.clone(),
            execution: config.execution.clone(),
            timing,
            verbosity: config.logging.verbosity,
            resolver,
            router,
            positions,
            kill_switch,
        }
    }

    pub fn router(&self) -> &Arc<OrderRouter> {
        &self.router
    }

    pub fn broker(&self) -> &DynBroker {
        &self.broker
    }

    /// Run every symbol once, in order, then disconnect.
    pub async fn run_many(&self, symbols: &[String]) -> CycleReport {
        let mut report = CycleReport::start();
        let total = symbols.len();

        for (i, symbol) in symbols.iter().enumerate() {
            info!("({}/{}) {}", i + 1, total, symbol);
            let log_state = logs_state(self.verbosity, i);
            report.push(self.run_symbol(symbol, log_state).await);

            let delay = self.timing.inter_symbol_delay();
            if i + 1 < total && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        if let Err(e) = self.broker.disconnect().await {
            warn!(error = %e, "Disconnect failed");
        }

        report.finish();
        report.log();
        report
    }

    /// One symbol run. Always returns its counters and logs one summary.
    pub async fn run(&self, symbol: &str) -> RunStats {
        self.run_symbol(symbol, self.verbosity.is_detailed()).await
    }

    async fn run_symbol(&self, symbol: &str, log_state: bool) -> RunStats {
        let mut stats = RunStats::new(symbol);

        if let Err(e) = self.run_inner(symbol, log_state, &mut stats).await {
            stats.errors += 1;
            error!(symbol, error = %e, "Run failed");
        }

        Metrics::run_errors(u64::from(stats.errors));
        Metrics::no_price_skips(u64::from(stats.no_price_skips));
        Metrics::symbol_run_completed();
        stats.log_summary();
        stats
    }

    async fn run_inner(
        &self,
        symbol: &str,
        log_state: bool,
        stats: &mut RunStats,
    ) -> AppResult<()> {
        let allow_entries = self.execution.allow_entries();
        let allow_exits = self.execution.allow_exits();
        info!(symbol, allow_entries, allow_exits, "Run start");

        self.broker.connect().await?;

        if log_state {
            self.log_state("run_start").await;
        }

        let summary = self.broker.account_summary().await?;
        let budget = RiskBudget::from_summary(&summary, &self.risk);
        info!(
            buying_power = %budget.buying_power.round_dp(2),
            max_trade_risk = %budget.max_trade_risk.round_dp(2),
            max_day_risk = %budget.max_day_risk.round_dp(2),
            "Risk budgets"
        );

        let kill = self.kill_switch.enforce(budget.max_day_risk, allow_exits).await;
        self.record_kill_switch(&kill, stats);

        self.try_entry(symbol, &budget, &kill, stats, log_state).await?;

        let report = self.positions.manage_all(allow_exits, log_state).await?;
        record_management(&report, stats);
        Ok(())
    }

    fn record_kill_switch(&self, kill: &KillSwitchOutcome, stats: &mut RunStats) {
        if let Some(pnl) = kill.daily_pnl() {
            Metrics::daily_pnl(pnl);
        }
        if let KillSwitchOutcome::Breached { liquidation, .. } = kill {
            Metrics::kill_switch_breached();
            if let Some(LiquidationReport {
                submitted, failed, ..
            }) = liquidation
            {
                for _ in 0..*submitted {
                    Metrics::order_submitted("liquidation");
                }
                stats.errors += *failed as u32;
            }
        }
    }

    async fn try_entry(
        &self,
        symbol: &str,
        budget: &RiskBudget,
        kill: &KillSwitchOutcome,
        stats: &mut RunStats,
        log_state: bool,
    ) -> AppResult<()> {
        let allow_entries = self.execution.allow_entries();
        let allow_exits = self.execution.allow_exits();

        let orders = self.broker.working_orders().await?;
        let open_entries = open_entry_orders(&orders);
        let now = Utc::now();
        let working: HashSet<_> = orders
            .iter()
            .filter(|o| o.status.is_working())
            .map(|o| o.order_id)
            .collect();
        let min_age = i64::try_from(self.risk.min_order_age_seconds).unwrap_or(i64::MAX);
        self.router.tracker().prune(&working, now, min_age);
        let open_entry_ages = open_entries
            .iter()
            .filter_map(|o| {
                self.router
                    .tracker()
                    .age_seconds(o.order_id, now)
                    .map(|age| (o.order_id, age))
            })
            .collect();
        debug!(
            symbol,
            open_entry_orders = open_entries.len(),
            max_open_orders = self.risk.max_open_orders,
            "Open entry orders"
        );

        let positions = self.broker.positions().await?;
        let signal = self.latest_signal(symbol, stats);

        let ctx = EntryContext {
            symbol,
            entries_enabled: allow_entries,
            kill_switch_clear: kill.allows_entries(),
            open_entry_orders: open_entries.len(),
            open_entry_ages,
            positions: &positions,
            signal: signal.as_ref(),
            risk: &self.risk,
        };
        if let Err(e) = entry_gates().evaluate(&ctx) {
            deny(symbol, &e, stats);
            return Ok(());
        }
        let Some(instrument_id) = ctx.instrument_id() else {
            return Ok(());
        };

        let instrument = Instrument::equity(instrument_id, Some(symbol.to_string()));
        let mark = self.resolver.resolve(&instrument).await;
        let entry_qty = Quantity::units(self.risk.entry_qty);
        let pricing = PricingContext {
            mark,
            entry_qty,
            budget,
            risk: &self.risk,
        };
        info!(
            symbol,
            entry = ?mark.map(|m| m.round_to_cents()),
            dollar_risk = ?pricing.dollar_risk().map(|r| r.round_dp(2)),
            max_trade_risk = %budget.max_trade_risk.round_dp(2),
            "Preflight"
        );
        if let Err(e) = pricing_gates().evaluate(&pricing) {
            if e.gate() == GATE_PRICE_AVAILABLE {
                stats.no_price_skips += 1;
            }
            deny(symbol, &e, stats);
            return Ok(());
        }

        match self
            .router
            .place_entry_buy(&instrument, entry_qty, allow_entries, mark)
            .await?
        {
            RouteOutcome::Placed(handle) => {
                stats.entries += 1;
                Metrics::order_submitted("entry");
                info!(
                    instrument = %instrument,
                    order_id = ?handle.order_id,
                    status = ?handle.status,
                    "Entry placed"
                );
            }
            RouteOutcome::Skipped(SkipReason::NoPrice) => {
                stats.no_price_skips += 1;
                return Ok(());
            }
            RouteOutcome::Skipped(SkipReason::NotAllowed) => return Ok(()),
        }

        if log_state {
            self.log_state("after_entry").await;
        }

        let orders = self.broker.working_orders().await?;
        if has_trailing_sell(&orders, instrument.id) {
            info!(instrument = %instrument, "Trailing stop already working");
            return Ok(());
        }
        match self
            .router
            .place_trailing_stop(&instrument, entry_qty, allow_exits)
            .await?
        {
            RouteOutcome::Placed(_) => {
                stats.trailing_ensured += 1;
                Metrics::order_submitted("trailing");
            }
            RouteOutcome::Skipped(SkipReason::NoPrice) => stats.no_price_skips += 1,
            RouteOutcome::Skipped(SkipReason::NotAllowed) => {}
        }
        Ok(())
    }

    /// Latest signal row. A store failure counts as an error and reads as
    /// "no signal"; a trade signal with an unusable id is counted too.
    fn latest_signal(&self, symbol: &str, stats: &mut RunStats) -> Option<Signal> {
        let signal = match self.signals.latest_signal(symbol) {
            Ok(signal) => signal,
            Err(e) => {
                stats.errors += 1;
                error!(symbol, error = %e, "Signal read failed");
                return None;
            }
        };

        match &signal {
            Some(s) if s.trade_signal => {
                stats.signals += 1;
                info!(
                    symbol,
                    timestamp = %s.timestamp,
                    con_id = ?s.raw_instrument_id,
                    "Trade signal"
                );
                if s.instrument_id().is_none() {
                    stats.errors += 1;
                    error!(symbol, con_id = ?s.raw_instrument_id, "Signal has no usable instrument id");
                }
            }
            Some(s) => debug!(symbol, timestamp = %s.timestamp, "Latest signal is not a trade signal"),
            None => debug!(symbol, "No signal rows"),
        }
        signal
    }

    async fn log_state(&self, stage: &str) {
        match self.broker.positions().await {
            Ok(positions) => {
                for p in &positions {
                    debug!(
                        stage,
                        instrument = %p.instrument,
                        quantity = %p.quantity,
                        avg_cost = ?p.avg_cost,
                        "Position"
                    );
                }
            }
            Err(e) => warn!(stage, error = %e, "Position snapshot unavailable"),
        }
        match self.broker.working_orders().await {
            Ok(orders) => {
                for o in &orders {
                    debug!(
                        stage,
                        order_id = %o.order_id,
                        instrument = %o.instrument_id,
                        side = ?o.side,
                        order_type = ?o.order_type,
                        quantity = %o.quantity,
                        status = ?o.status,
                        "Working order"
                    );
                }
            }
            Err(e) => warn!(stage, error = %e, "Order snapshot unavailable"),
        }
    }

    /// Market-sell every long position on operator request.
    pub async fn flatten_all(&self) -> AppResult<LiquidationReport> {
        self.broker.connect().await?;
        let positions = self.broker.positions().await?;
        let requests = flatten_all_positions(&positions, FlattenReason::Manual, Utc::now());
        info!(reason = %FlattenReason::Manual, positions = requests.len(), "Flatten requested");

        let report =
            submit_flatten_requests(&self.router, &requests, self.execution.allow_exits()).await;
        for _ in 0..report.submitted {
            Metrics::order_submitted("liquidation");
        }

        if let Err(e) = self.broker.disconnect().await {
            warn!(error = %e, "Disconnect failed");
        }
        Ok(report)
    }
}

/// Detailed snapshots are dumped for the first symbol of a cycle only.
fn logs_state(verbosity: Verbosity, index: usize) -> bool {
    verbosity.is_detailed() && index == 0
}

fn deny(symbol: &str, err: &RiskError, stats: &mut RunStats) {
    let RiskError::GateBlocked { gate, reason } = err;
    info!(symbol, gate = %gate, reason = %reason, "Entry denied");
    Metrics::gate_denied(gate);
    stats.denied_by = Some(gate.clone());
}

fn record_management(report: &ManagementReport, stats: &mut RunStats) {
    stats.breakeven_stops += report.breakeven_placed;
    stats.scaleouts += report.scaleouts_placed;
    stats.trailing_ensured += report.trailing_ensured;
    stats.no_price_skips += report.no_price_skips;
    stats.errors += report.errors;

    for _ in 0..report.breakeven_placed {
        Metrics::order_submitted("breakeven");
    }
    for _ in 0..report.scaleouts_placed {
        Metrics::order_submitted("scaleout");
    }
    for _ in 0..report.trailing_ensured {
        Metrics::order_submitted("trailing");
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    engine: Engine,
}

impl Application {
    /// Wire the configured broker and signal store into an engine.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let broker: DynBroker = match config.broker.kind {
            BrokerKind::Paper => Arc::new(PaperBroker::new(
                config.broker.paper.clone(),
                config.session.clone(),
            )),
            BrokerKind::Gateway => Arc::new(GatewayBroker::new(
                config.broker.gateway.clone(),
                config.session.clone(),
            )?),
        };
        let signals: Arc<dyn SignalStore> = Arc::new(CsvSignalStore::new(config.signals.path.clone()));
        info!(
            broker = ?config.broker.kind,
            signals = %config.signals.path.display(),
            symbols = config.execution.symbols.len(),
            "Application wired"
        );

        let engine = Engine::new(broker, signals, &config);
        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// One pass over the configured symbols.
    pub async fn run(&self) -> CycleReport {
        if self.config.execution.symbols.is_empty() {
            warn!("No symbols configured");
        }
        self.engine.run_many(&self.config.execution.symbols).await
    }

    pub async fn flatten_all(&self) -> AppResult<LiquidationReport> {
        self.engine.flatten_all().await
    }
}
