//! Core domain types for the equity execution engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Quantity`: Precision-safe numeric types
//! - `Instrument`, `Position`, `Signal`, `PriceSnapshot`: Broker and signal snapshots
//! - `OrderSpec`, `WorkingOrder`, `OrderSide`, `OrderType`: Order model
//! - `RiskConfig`: Risk and exit-rule parameters
//! - `SessionCalendar`: New York regular-session classification

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod order;
pub mod risk_config;
pub mod trading_session;

pub use decimal::{parse_broker_decimal, Price, Quantity};
pub use error::{CoreError, Result};
pub use instrument::{
    parse_instrument_id, Instrument, InstrumentId, Position, PriceSnapshot, SecurityClass, Signal,
};
pub use order::{
    OrderHandle, OrderId, OrderSide, OrderSpec, OrderStatus, OrderType, TimeInForce, WorkingOrder,
};
pub use risk_config::RiskConfig;
pub use trading_session::{EquitySession, SessionCalendar};
