//! Market Data Hub (spec.md §4.A) — folds N strategies' subscriptions into
//! one upstream subscription per `(symbol, channel)`.

use super::book::{MarketBook, MarketBookSnapshot};
use crate::connector::Channel;
use crate::models::StrategyId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChannelKey {
    symbol: String,
    channel: Channel,
}

struct RefCount {
    count: u64,
    pending_unsubscribe: Option<Instant>,
}

/// An event the hub fans out to subscribers, independent of book snapshots.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Upstream reconnected; consumers must treat open-order assumptions as
    /// potentially stale (spec.md §4.A).
    Resync { symbol: String },
}

pub struct Subscription {
    pub strategy_id: StrategyId,
    pub symbol: String,
    pub channel: Channel,
}

pub struct MarketDataHub {
    books: RwLock<HashMap<String, Arc<MarketBook>>>,
    refcounts: RwLock<HashMap<ChannelKey, RefCount>>,
    linger: Duration,
    events: broadcast::Sender<HubEvent>,
    upstream_opens: AtomicU64,
}

impl MarketDataHub {
    pub fn new(linger: Duration) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new(Self {
            books: RwLock::new(HashMap::new()),
            refcounts: RwLock::new(HashMap::new()),
            linger,
            events: tx,
            upstream_opens: AtomicU64::new(0),
        })
    }

    pub fn events(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Refcounts the `(symbol, channel)` pair; opens the upstream stream via
    /// the connector only for the first subscriber.
    pub fn subscribe(
        &self,
        strategy_id: StrategyId,
        symbol: &str,
        channel: Channel,
    ) -> Subscription {
        let key = ChannelKey {
            symbol: symbol.to_string(),
            channel,
        };

        self.books
            .write()
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(MarketBook::new(symbol)));

        let mut refcounts = self.refcounts.write();
        let entry = refcounts.entry(key.clone()).or_insert(RefCount {
            count: 0,
            pending_unsubscribe: None,
        });
        entry.pending_unsubscribe = None;
        let was_zero = entry.count == 0;
        entry.count += 1;
        drop(refcounts);

        if was_zero {
            self.upstream_opens.fetch_add(1, Ordering::Relaxed);
            info!(symbol, channel = ?channel, "opening upstream subscription");
        }

        Subscription {
            strategy_id,
            symbol: symbol.to_string(),
            channel,
        }
    }

    /// Decrements the refcount; schedules the upstream close after the
    /// linger window so short-lived churn doesn't thrash the connector.
    pub fn unsubscribe(self: &Arc<Self>, sub: Subscription) {
        let key = ChannelKey {
            symbol: sub.symbol.clone(),
            channel: sub.channel,
        };

        let should_schedule = {
            let mut refcounts = self.refcounts.write();
            if let Some(entry) = refcounts.get_mut(&key) {
                entry.count = entry.count.saturating_sub(1);
                if entry.count == 0 {
                    entry.pending_unsubscribe = Some(Instant::now());
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };

        if should_schedule {
            let hub = Arc::clone(self);
            let linger = self.linger;
            tokio::spawn(async move {
                tokio::time::sleep(linger).await;
                hub.finalize_unsubscribe(key);
            });
        }
    }

    fn finalize_unsubscribe(&self, key: ChannelKey) {
        let mut refcounts = self.refcounts.write();
        if let Some(entry) = refcounts.get(&key) {
            let still_zero = entry.count == 0 && entry.pending_unsubscribe.is_some();
            if still_zero {
                refcounts.remove(&key);
                debug!(symbol = %key.symbol, channel = ?key.channel, "closed upstream subscription after linger");
            }
        }
    }

    /// Non-blocking read of the most recent consistent snapshot.
    pub fn latest(&self, symbol: &str) -> Option<Arc<MarketBookSnapshot>> {
        self.books.read().get(symbol).map(|b| b.latest())
    }

    pub fn publish(&self, symbol: &str, snapshot: MarketBookSnapshot) {
        if let Some(book) = self.books.read().get(symbol) {
            book.publish(snapshot);
        }
    }

    /// Called by the connector on reconnect: marks every book stale and
    /// emits a resync event before further updates.
    pub fn on_reconnect(&self) {
        let books = self.books.read();
        for (symbol, book) in books.iter() {
            book.mark_stale();
            let _ = self.events.send(HubEvent::Resync {
                symbol: symbol.clone(),
            });
        }
    }

    pub fn has_subscribers(&self, symbol: &str, channel: Channel) -> bool {
        let key = ChannelKey {
            symbol: symbol.to_string(),
            channel,
        };
        self.refcounts
            .read()
            .get(&key)
            .map(|e| e.count > 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn duplicate_subscriptions_share_one_upstream_open() {
        let hub = MarketDataHub::new(Duration::from_millis(10));
        let sid = Uuid::new_v4();
        let _a = hub.subscribe(sid, "BTC-USD", Channel::L2Book);
        let _b = hub.subscribe(sid, "BTC-USD", Channel::L2Book);
        assert_eq!(hub.upstream_opens.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unsubscribe_closes_after_linger_when_refcount_hits_zero() {
        let hub = MarketDataHub::new(Duration::from_millis(20));
        let sid = Uuid::new_v4();
        let sub = hub.subscribe(sid, "BTC-USD", Channel::Trades);
        assert!(hub.has_subscribers("BTC-USD", Channel::Trades));

        hub.unsubscribe(sub);
        assert!(hub.has_subscribers("BTC-USD", Channel::Trades));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!hub.has_subscribers("BTC-USD", Channel::Trades));
    }
}
