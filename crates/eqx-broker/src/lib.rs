//! Broker and signal-store collaborators for equity execution.
//!
//! The engine talks to the outside world only through the two seams defined
//! here. Both are object-safe so a run can be wired against a live gateway
//! or against in-memory doubles.
//!
//! # Key Components
//!
//! - [`Broker`]: Account reads, price snapshots, order placement
//! - [`PaperBroker`]: In-memory broker that records placements
//! - [`GatewayBroker`]: REST client for a local brokerage web gateway
//! - [`SignalStore`]: Latest signal lookup per symbol
//! - [`CsvSignalStore`] / [`MemorySignalStore`]: Signal store backends

pub mod broker;
pub mod error;
pub mod gateway;
pub mod paper;
pub mod signals;

pub use broker::{AccountSummary, BoxFuture, Broker, DynBroker};
pub use error::{BrokerError, BrokerResult};
pub use gateway::{map_status, GatewayBroker, GatewayConfig};
pub use paper::{PaperBroker, PaperBrokerConfig, Placement};
pub use signals::{parse_timestamp, CsvSignalStore, MemorySignalStore, SignalStore};
