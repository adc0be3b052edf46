//! `MarketBook` — lock-free snapshot of one `(venue, symbol)` pair. Keeps
//! the latest top-of-book behind an `ArcSwap` so readers never block
//! writers (spec.md §5: "copy-on-update / atomic swap").

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketBookSnapshot {
    pub symbol: String,
    pub best_bid: Option<BookLevel>,
    pub best_ask: Option<BookLevel>,
    pub last_trade: Option<f64>,
    pub depth: Vec<BookLevel>,
    pub last_update_ts: DateTime<Utc>,
    /// True when this snapshot is older than the configured staleness
    /// threshold or was served during an upstream disconnect.
    #[serde(default)]
    pub stale: bool,
}

impl MarketBookSnapshot {
    pub fn empty(symbol: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            best_bid: None,
            best_ask: None,
            last_trade: None,
            depth: Vec::new(),
            last_update_ts: now,
            stale: true,
        }
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        }
    }

    /// Freshness is a *strict* inequality against the threshold (spec.md §8:
    /// "exactly at the staleness threshold is considered stale").
    pub fn is_fresh(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        if self.stale {
            return false;
        }
        now.signed_duration_since(self.last_update_ts) < threshold
    }
}

/// One upstream market book. Writers publish whole-snapshot replacements;
/// readers take a cheap `Arc` clone that never blocks on a writer.
pub struct MarketBook {
    symbol: String,
    latest: ArcSwap<MarketBookSnapshot>,
}

impl MarketBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let empty = MarketBookSnapshot::empty(symbol.clone(), Utc::now());
        Self {
            symbol,
            latest: ArcSwap::from_pointee(empty),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn publish(&self, snapshot: MarketBookSnapshot) {
        // Monotonic non-decreasing last_update_ts guarantee (spec.md §4.A).
        let current = self.latest.load();
        if snapshot.last_update_ts < current.last_update_ts {
            return;
        }
        self.latest.store(Arc::new(snapshot));
    }

    pub fn mark_stale(&self) {
        let current = self.latest.load_full();
        let mut stale = (*current).clone();
        stale.stale = true;
        self.latest.store(Arc::new(stale));
    }

    pub fn latest(&self) -> Arc<MarketBookSnapshot> {
        self.latest.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_rejects_out_of_order_snapshots() {
        let book = MarketBook::new("BTC-USD");
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);

        book.publish(MarketBookSnapshot {
            last_update_ts: t1,
            stale: false,
            ..MarketBookSnapshot::empty("BTC-USD", t1)
        });
        book.publish(MarketBookSnapshot {
            last_update_ts: t0,
            stale: false,
            ..MarketBookSnapshot::empty("BTC-USD", t0)
        });

        assert_eq!(book.latest().last_update_ts, t1);
    }

    #[test]
    fn freshness_is_strict_at_threshold() {
        let now = Utc::now();
        let snap = MarketBookSnapshot {
            last_update_ts: now - chrono::Duration::seconds(5),
            stale: false,
            ..MarketBookSnapshot::empty("BTC-USD", now)
        };
        assert!(!snap.is_fresh(now, chrono::Duration::seconds(5)));
        assert!(snap.is_fresh(now, chrono::Duration::seconds(6)));
    }
}
