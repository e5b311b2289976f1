//! Order execution for the equity engine.
//!
//! # Key Components
//!
//! - [`MarkPriceResolver`]: Snapshot mark with mid → last → close fallback
//! - [`OrderRouter`]: Session-aware order shapes, allow flags, settle pause
//! - [`SubmitTimeTracker`]: Local order-id → submit-time map
//!
//! # Order Shapes
//!
//! | purpose     | regular hours | outside regular hours          |
//! |-------------|---------------|--------------------------------|
//! | entry       | MKT           | LMT mark × 1.002, outside-RTH  |
//! | scale-out   | MKT           | LMT mark × 0.998, outside-RTH  |
//! | breakeven   | STP at entry  | STP at entry                   |
//! | trailing    | TRAIL         | TRAIL                          |
//! | liquidation | MKT           | MKT                            |

pub mod error;
pub mod price_provider;
pub mod router;
pub mod submit_tracker;

pub use error::{ExecutorError, ExecutorResult};
pub use price_provider::{mark_from_snapshot, MarkPriceResolver};
pub use router::{
    cushioned_limit, limit_cushion, OrderPurpose, OrderRouter, RouteOutcome, RouterConfig,
    SkipReason,
};
pub use submit_tracker::SubmitTimeTracker;
