//! Signal store collaborators.
//!
//! The signal table is produced by an external pipeline. The engine only
//! asks for the most recent row of one symbol, every cycle, and never
//! writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use eqx_core::Signal;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{BrokerError, BrokerResult};

/// Read access to the latest signal per symbol.
pub trait SignalStore: Send + Sync {
    /// Most recent row for `symbol`, or `None` if the symbol has no rows.
    fn latest_signal(&self, symbol: &str) -> BrokerResult<Option<Signal>>;
}

/// Raw CSV row. Every field stays textual until validated.
#[derive(Debug, Deserialize)]
struct SignalRow {
    symbol: String,
    timestamp: String,
    #[serde(default)]
    con_id: Option<String>,
    #[serde(default)]
    trade_signal: String,
}

/// Signal store over a CSV export of the signal table.
///
/// Expected header: `symbol,timestamp,con_id,trade_signal`. The file is
/// re-read on every lookup because the producer rewrites it between cycles.
#[derive(Debug, Clone)]
pub struct CsvSignalStore {
    path: PathBuf,
}

impl CsvSignalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SignalStore for CsvSignalStore {
    fn latest_signal(&self, symbol: &str) -> BrokerResult<Option<Signal>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut latest: Option<Signal> = None;
        for (line, row) in reader.deserialize::<SignalRow>().enumerate() {
            let row = row?;
            if !row.symbol.eq_ignore_ascii_case(symbol) {
                continue;
            }
            let Some(timestamp) = parse_timestamp(&row.timestamp) else {
                warn!(line = line + 2, raw = %row.timestamp, symbol, "Skipping signal row with bad timestamp");
                continue;
            };
            let candidate = Signal {
                symbol: row.symbol,
                timestamp,
                raw_instrument_id: row.con_id.filter(|s| !s.is_empty()),
                trade_signal: parse_flag(&row.trade_signal),
            };
            if latest.as_ref().map_or(true, |cur| candidate.timestamp >= cur.timestamp) {
                latest = Some(candidate);
            }
        }

        debug!(symbol, found = latest.is_some(), path = %self.path.display(), "Signal lookup");
        Ok(latest)
    }
}

/// Parse RFC 3339 or `YYYY-MM-DD HH:MM:SS[.f]` (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "yes"
    )
}

/// In-memory signal store keyed by symbol.
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    rows: RwLock<HashMap<String, Signal>>,
    fail: RwLock<bool>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, keeping only the newest one per symbol.
    pub fn insert(&self, signal: Signal) {
        let mut rows = self.rows.write();
        let key = signal.symbol.to_ascii_uppercase();
        match rows.get(&key) {
            Some(existing) if existing.timestamp > signal.timestamp => {}
            _ => {
                rows.insert(key, signal);
            }
        }
    }

    /// Make every lookup fail.
    pub fn set_fail(&self, fail: bool) {
        *self.fail.write() = fail;
    }
}

impl SignalStore for MemorySignalStore {
    fn latest_signal(&self, symbol: &str) -> BrokerResult<Option<Signal>> {
        if *self.fail.read() {
            return Err(BrokerError::SignalStore("signal store unavailable".to_string()));
        }
        Ok(self.rows.read().get(&symbol.to_ascii_uppercase()).cloned())
    }
}
