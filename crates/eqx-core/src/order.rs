//! Order-related types and identifiers.
//!
//! Provides order side, type, time-in-force, lifecycle status, the order
//! spec handed to the broker, and the normalized working-order snapshot.

use crate::decimal::{Price, Quantity};
use crate::error::CoreError;
use crate::instrument::InstrumentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    TrailingStop,
}

impl OrderType {
    /// Broker wire code (MKT, LMT, STP, TRAIL).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Market => "MKT",
            Self::Limit => "LMT",
            Self::Stop => "STP",
            Self::TrailingStop => "TRAIL",
        }
    }

    /// Parse a broker wire code. Unknown codes return `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "MKT" | "MARKET" => Some(Self::Market),
            "LMT" | "LIMIT" => Some(Self::Limit),
            "STP" | "STOP" => Some(Self::Stop),
            "TRAIL" | "TRAILING_STOP" => Some(Self::TrailingStop),
            _ => None,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Expires at the end of the trading day.
    #[default]
    Day,
    /// Good-til-cancelled.
    Gtc,
    /// Immediate-or-cancel.
    Ioc,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "DAY"),
            Self::Gtc => write!(f, "GTC"),
            Self::Ioc => write!(f, "IOC"),
        }
    }
}

impl FromStr for TimeInForce {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAY" => Ok(Self::Day),
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            other => Err(CoreError::InvalidConfig(format!(
                "unknown time-in-force: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a broker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted locally, not yet acknowledged by the exchange.
    New,
    /// Live at the broker or exchange.
    Working,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Only NEW and WORKING orders count for classification and gating.
    #[inline]
    pub fn is_working(&self) -> bool {
        matches!(self, Self::New | Self::Working)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Working => write!(f, "working"),
            Self::Filled => write!(f, "filled"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Broker-assigned order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order shape handed to the broker's placement primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    /// Limit price (LIMIT only).
    pub limit_price: Option<Price>,
    /// Trigger price (STOP only).
    pub stop_price: Option<Price>,
    /// Trailing distance in percent units, e.g. `2` for a 2% trail.
    pub trailing_percent: Option<Decimal>,
    pub tif: TimeInForce,
    /// Allow execution or triggering outside regular trading hours.
    pub outside_rth: bool,
}

impl OrderSpec {
    fn base(side: OrderSide, order_type: OrderType, quantity: Quantity) -> Self {
        Self {
            side,
            order_type,
            quantity,
            limit_price: None,
            stop_price: None,
            trailing_percent: None,
            tif: TimeInForce::Day,
            outside_rth: false,
        }
    }

    pub fn market(side: OrderSide, quantity: Quantity) -> Self {
        Self::base(side, OrderType::Market, quantity)
    }

    /// Limit order flagged to execute outside regular hours.
    pub fn extended_limit(side: OrderSide, quantity: Quantity, limit_price: Price) -> Self {
        Self {
            limit_price: Some(limit_price),
            outside_rth: true,
            ..Self::base(side, OrderType::Limit, quantity)
        }
    }

    pub fn stop(side: OrderSide, quantity: Quantity, stop_price: Price) -> Self {
        Self {
            stop_price: Some(stop_price),
            outside_rth: true,
            ..Self::base(side, OrderType::Stop, quantity)
        }
    }

    pub fn trailing_stop(
        side: OrderSide,
        quantity: Quantity,
        trailing_percent: Decimal,
        tif: TimeInForce,
    ) -> Self {
        Self {
            trailing_percent: Some(trailing_percent),
            tif,
            outside_rth: true,
            ..Self::base(side, OrderType::TrailingStop, quantity)
        }
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.order_type, self.quantity)?;
        if let Some(px) = self.limit_price {
            write!(f, " @{px}")?;
        }
        if let Some(px) = self.stop_price {
            write!(f, " stop={px}")?;
        }
        if let Some(pct) = self.trailing_percent {
            write!(f, " trail={pct}%")?;
        }
        write!(f, " {}", self.tif)
    }
}

/// Result of a placement call. The id may be missing on partial success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: Option<OrderId>,
    pub status: Option<OrderStatus>,
}

/// Normalized order from the broker's order snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingOrder {
    pub order_id: OrderId,
    pub instrument_id: InstrumentId,
    pub symbol: Option<String>,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub status: OrderStatus,
}

impl WorkingOrder {
    /// Entry orders are working BUYs that are not trailing stops.
    pub fn is_entry(&self) -> bool {
        self.side == OrderSide::Buy && self.order_type != OrderType::TrailingStop
    }
}
