//! Position management for the equity engine.
//!
//! Protective state is never stored: every decision is derived from the
//! broker's current positions and working orders.
//!
//! # Key Components
//!
//! - [`ProtectiveOrders`]: Which protective orders already work for an instrument
//! - [`PositionManager`]: Breakeven stop, scale-out and trailing-stop rules
//! - [`ExitRules`]: Thresholds for the staged exits
//! - [`FlattenRequest`]: Request to close a long position
//! - [`FlattenReason`]: Why positions are being flattened

pub mod classifier;
pub mod error;
pub mod flatten;
pub mod manager;

pub use classifier::{
    has_breakeven_stop, has_scaleout_sell, has_trailing_sell, open_entry_orders, working_for,
    ProtectiveOrders,
};
pub use error::{PositionError, PositionResult};
pub use flatten::{
    flatten_all_positions, submit_flatten_requests, FlattenReason, FlattenRequest,
    LiquidationReport,
};
pub use manager::{return_pct, ExitRules, ManagementReport, PositionManager};
