//! Collaborator seams: volatility index and historical open interest.
//!
//! Lookups are synchronous reads of data the collaborator already holds;
//! fetching and retrying happen on the collaborator's side.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;

use gex_core::PriorOpenInterest;

/// Supplies the VIX-equivalent value for the regime classifier.
pub trait VolatilityFeed: Send + Sync {
    fn vix_at(&self, at: DateTime<Utc>) -> Option<f64>;
}

/// Supplies prior-day open interest for accumulation signals.
pub trait OpenInterestHistory: Send + Sync {
    /// Most recent open interest recorded strictly before `date`.
    fn prior_day(&self, symbol: &str, date: NaiveDate) -> Option<PriorOpenInterest>;
}

#[derive(Debug, Clone, Copy)]
pub struct StaticVolatility(pub f64);

impl VolatilityFeed for StaticVolatility {
    fn vix_at(&self, _at: DateTime<Utc>) -> Option<f64> {
        Some(self.0)
    }
}

/// Latest value pushed by a live feed task.
#[derive(Debug, Clone)]
pub struct WatchVolatility {
    rx: watch::Receiver<Option<f64>>,
}

impl WatchVolatility {
    pub fn channel() -> (watch::Sender<Option<f64>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

impl VolatilityFeed for WatchVolatility {
    fn vix_at(&self, _at: DateTime<Utc>) -> Option<f64> {
        *self.rx.borrow()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpenInterestHistory;

impl OpenInterestHistory for NoOpenInterestHistory {
    fn prior_day(&self, _symbol: &str, _date: NaiveDate) -> Option<PriorOpenInterest> {
        None
    }
}

/// Open interest history preloaded by the caller.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOpenInterest {
    by_symbol: HashMap<String, BTreeMap<NaiveDate, PriorOpenInterest>>,
}

impl InMemoryOpenInterest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, oi: PriorOpenInterest) {
        self.by_symbol
            .entry(symbol.into())
            .or_default()
            .insert(oi.date, oi);
    }
}

impl OpenInterestHistory for InMemoryOpenInterest {
    fn prior_day(&self, symbol: &str, date: NaiveDate) -> Option<PriorOpenInterest> {
        self.by_symbol
            .get(symbol)?
            .range(..date)
            .next_back()
            .map(|(_, oi)| oi.clone())
    }
}
