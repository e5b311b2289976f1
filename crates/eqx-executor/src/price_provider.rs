//! Mark-price resolution from broker snapshots.
//!
//! One snapshot request per price need. The fallback chain is
//! mid(bid, ask) → last → close, each leg only if strictly positive.
//! Resolution never fails: a broker error or an empty snapshot is `None`.

use std::time::Duration;

use eqx_broker::DynBroker;
use eqx_core::{Instrument, Price, PriceSnapshot};
use tracing::{debug, warn};

/// Best mark available in a snapshot.
pub fn mark_from_snapshot(snapshot: &PriceSnapshot) -> Option<Price> {
    let bid = snapshot.bid.and_then(Price::positive);
    let ask = snapshot.ask.and_then(Price::positive);
    if let (Some(bid), Some(ask)) = (bid, ask) {
        return Some(Price::mid(bid, ask));
    }
    snapshot
        .last
        .and_then(Price::positive)
        .or_else(|| snapshot.close.and_then(Price::positive))
}

/// Resolves a mark price through the broker's snapshot primitive.
#[derive(Clone)]
pub struct MarkPriceResolver {
    broker: DynBroker,
    wait: Duration,
}

impl MarkPriceResolver {
    /// `wait` bounds how long the snapshot is given to populate.
    #[must_use]
    pub fn new(broker: DynBroker, wait: Duration) -> Self {
        Self { broker, wait }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub async fn resolve(&self, instrument: &Instrument) -> Option<Price> {
        match self.broker.price_snapshot(instrument, self.wait).await {
            Ok(snapshot) => {
                let mark = mark_from_snapshot(&snapshot);
                debug!(
                    instrument = %instrument,
                    bid = ?snapshot.bid,
                    ask = ?snapshot.ask,
                    last = ?snapshot.last,
                    close = ?snapshot.close,
                    mark = ?mark,
                    "Mark resolved"
                );
                mark
            }
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Price snapshot failed");
                None
            }
        }
    }
}
