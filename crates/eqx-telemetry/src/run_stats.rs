//! Per-run counters and the per-cycle report.
//!
//! A [`RunStats`] is fresh for every symbol run and always ends in exactly
//! one summary line. A [`CycleReport`] collects the runs of one pass over
//! the symbol list into a single structured record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::TelemetryResult;

/// Counters for one symbol run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub symbol: String,
    /// Latest signal row had `trade_signal = true`.
    pub signals: u32,
    pub entries: u32,
    pub breakeven_stops: u32,
    pub scaleouts: u32,
    pub trailing_ensured: u32,
    pub no_price_skips: u32,
    pub errors: u32,
    /// Entry gate that denied this run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_by: Option<String>,
}

impl RunStats {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn orders_placed(&self) -> u32 {
        self.entries + self.breakeven_stops + self.scaleouts + self.trailing_ensured
    }

    /// One-line summary, stable for grepping.
    pub fn summary_line(&self) -> String {
        format!(
            "SYM={} signal={} entry={} be={} tp1={} trail_ensure={} skips_no_price={} errs={}",
            if self.symbol.is_empty() { "?" } else { &self.symbol },
            self.signals,
            self.entries,
            self.breakeven_stops,
            self.scaleouts,
            self.trailing_ensured,
            self.no_price_skips,
            self.errors
        )
    }

    pub fn log_summary(&self) {
        info!(
            symbol = %self.symbol,
            signal = self.signals,
            entry = self.entries,
            be = self.breakeven_stops,
            tp1 = self.scaleouts,
            trail_ensure = self.trailing_ensured,
            skips_no_price = self.no_price_skips,
            errs = self.errors,
            "SUMMARY {}",
            self.summary_line()
        );
    }
}

/// Structured record for one pass over the symbol list.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub runs: Vec<RunStats>,
}

/// Totals across a cycle's runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleTotals {
    pub symbols: usize,
    pub signals: u32,
    pub entries: u32,
    pub breakeven_stops: u32,
    pub scaleouts: u32,
    pub trailing_ensured: u32,
    pub no_price_skips: u32,
    pub errors: u32,
}

impl CycleReport {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            runs: Vec::new(),
        }
    }

    pub fn push(&mut self, stats: RunStats) {
        self.runs.push(stats);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn totals(&self) -> CycleTotals {
        self.runs.iter().fold(
            CycleTotals {
                symbols: self.runs.len(),
                ..CycleTotals::default()
            },
            |mut t, r| {
                t.signals += r.signals;
                t.entries += r.entries;
                t.breakeven_stops += r.breakeven_stops;
                t.scaleouts += r.scaleouts;
                t.trailing_ensured += r.trailing_ensured;
                t.no_price_skips += r.no_price_skips;
                t.errors += r.errors;
                t
            },
        )
    }

    /// JSON record with per-symbol detail nested under `runs`.
    pub fn to_json(&self) -> TelemetryResult<String> {
        #[derive(Serialize)]
        struct Record<'a> {
            #[serde(flatten)]
            report: &'a CycleReport,
            totals: CycleTotals,
        }
        Ok(serde_json::to_string(&Record {
            report: self,
            totals: self.totals(),
        })?)
    }

    pub fn log(&self) {
        let totals = self.totals();
        match self.to_json() {
            Ok(record) => info!(
                symbols = totals.symbols,
                entries = totals.entries,
                errors = totals.errors,
                record = %record,
                "Cycle report"
            ),
            Err(e) => info!(
                symbols = totals.symbols,
                entries = totals.entries,
                errors = totals.errors,
                error = %e,
                "Cycle report (unserializable)"
            ),
        }
    }
}
