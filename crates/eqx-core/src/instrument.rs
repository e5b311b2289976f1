//! Instruments, positions, price snapshots and trade signals.

use crate::decimal::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Broker-assigned numeric contract id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub i64);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a raw contract id the way signal exports carry them.
///
/// Accepts surrounding whitespace and integral decimals such as `"777.0"`.
/// Empty, `NaN`, non-integral, non-positive and non-numeric input yields `None`.
pub fn parse_instrument_id(raw: &str) -> Option<InstrumentId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(id) = trimmed.parse::<i64>() {
        return (id > 0).then_some(InstrumentId(id));
    }
    let value = Decimal::from_str(trimmed).ok()?;
    if value.fract() != Decimal::ZERO {
        return None;
    }
    value
        .to_i64()
        .filter(|id| *id > 0)
        .map(InstrumentId)
}

/// Security class. The engine only trades equities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityClass {
    #[default]
    Equity,
}

impl fmt::Display for SecurityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equity => write!(f, "STK"),
        }
    }
}

/// Immutable instrument identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: Option<String>,
    pub class: SecurityClass,
}

impl Instrument {
    pub fn equity(id: InstrumentId, symbol: Option<String>) -> Self {
        Self {
            id,
            symbol,
            class: SecurityClass::Equity,
        }
    }

    /// Symbol if known, otherwise the numeric id.
    pub fn label(&self) -> String {
        match &self.symbol {
            Some(s) => s.clone(),
            None => self.id.to_string(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(s) => write!(f, "{s}({})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Broker position snapshot. Never cached across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Instrument,
    /// Signed quantity; the engine only acts on positive (long) positions.
    pub quantity: Quantity,
    /// Per-share average cost, used as the entry price.
    pub avg_cost: Option<Price>,
}

impl Position {
    #[inline]
    pub fn is_long(&self) -> bool {
        self.quantity.is_positive()
    }

    /// Entry price proxy. Zero or negative cost basis is unavailable.
    pub fn entry_price(&self) -> Option<Price> {
        self.avg_cost.and_then(Price::positive)
    }
}

/// Raw snapshot fields as populated by the broker. Any may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub bid: Option<Price>,
    pub ask: Option<Price>,
    pub last: Option<Price>,
    pub close: Option<Price>,
}

/// Latest precomputed signal row for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Contract id exactly as exported, so malformed ids stay observable.
    pub raw_instrument_id: Option<String>,
    pub trade_signal: bool,
}

impl Signal {
    pub fn instrument_id(&self) -> Option<InstrumentId> {
        self.raw_instrument_id
            .as_deref()
            .and_then(parse_instrument_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_instrument_id() {
        assert_eq!(parse_instrument_id("777"), Some(InstrumentId(777)));
        assert_eq!(parse_instrument_id(" 777 "), Some(InstrumentId(777)));
        assert_eq!(parse_instrument_id("777.0"), Some(InstrumentId(777)));
        assert_eq!(parse_instrument_id("777.5"), None);
        assert_eq!(parse_instrument_id(""), None);
        assert_eq!(parse_instrument_id("NaN"), None);
        assert_eq!(parse_instrument_id("abc"), None);
        assert_eq!(parse_instrument_id("-5"), None);
    }

    #[test]
    fn test_position_entry_price() {
        let mut pos = Position {
            instrument: Instrument::equity(InstrumentId(1), Some("XYZ".into())),
            quantity: Quantity::units(2),
            avg_cost: Some(Price::new(dec!(50))),
        };
        assert!(pos.is_long());
        assert_eq!(pos.entry_price(), Some(Price::new(dec!(50))));

        pos.avg_cost = Some(Price::ZERO);
        assert_eq!(pos.entry_price(), None);

        pos.quantity = Quantity::new(dec!(-1));
        assert!(!pos.is_long());
    }

    #[test]
    fn test_instrument_display() {
        let inst = Instrument::equity(InstrumentId(777), Some("XYZ".into()));
        assert_eq!(inst.to_string(), "XYZ(777)");
        assert_eq!(inst.label(), "XYZ");
        assert_eq!(Instrument::equity(InstrumentId(5), None).label(), "5");
    }
}
