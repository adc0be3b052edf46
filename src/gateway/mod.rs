//! Order Gateway (spec.md §4.C): the single chokepoint between strategies
//! and the connector. Fair round-robin dequeue across strategies, global
//! and per-strategy quotas, and cancels always win over creates.
//!
//! Per-strategy queue, one worker draining it against a shared rate budget.

use crate::connector::{ConnectorErrorKind, ExchangeConnector, OrderAck, PlaceOrderRequest};
use crate::models::StrategyId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A unit of work submitted by a strategy (spec.md §4.C).
#[derive(Debug, Clone)]
pub enum Intent {
    Create(PlaceOrderRequest),
    Cancel {
        symbol: String,
        client_order_id: String,
    },
    CancelAllFor {
        symbol: String,
    },
}

impl Intent {
    fn is_cancel(&self) -> bool {
        !matches!(self, Intent::Create(_))
    }

    fn client_order_id(&self) -> Option<&str> {
        match self {
            Intent::Create(req) => Some(&req.client_order_id),
            Intent::Cancel { client_order_id, .. } => Some(client_order_id),
            Intent::CancelAllFor { .. } => None,
        }
    }
}

struct StrategyQueue {
    items: VecDeque<(StrategyId, Intent)>,
    cap: usize,
}

impl StrategyQueue {
    fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::new(),
            cap,
        }
    }

    /// Enqueues an intent. Cancels are never shed; when a Create would
    /// overflow the cap, the oldest queued Create is dropped to make room
    /// (spec.md §4.C: "sheds oldest Creates only, never Cancels").
    fn push(&mut self, strategy_id: StrategyId, intent: Intent) {
        if !intent.is_cancel() && self.items.len() >= self.cap {
            if let Some(pos) = self.items.iter().position(|(_, i)| !i.is_cancel()) {
                self.items.remove(pos);
                warn!(%strategy_id, "gateway queue full, shedding oldest create");
            }
        }
        self.items.push_back((strategy_id, intent));
    }

    fn pop(&mut self) -> Option<(StrategyId, Intent)> {
        self.items.pop_front()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

struct Quota {
    capacity: u64,
    tokens: AtomicU64,
}

impl Quota {
    fn new(capacity: u64) -> Self {
        Self {
            capacity,
            tokens: AtomicU64::new(capacity),
        }
    }

    fn try_take(&self) -> bool {
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn refill(&self) {
        self.tokens.store(self.capacity, Ordering::Release);
    }
}

const RETRY_DELAY: Duration = Duration::from_millis(250);
const MAX_RETRIES: u32 = 1;

/// Fair round-robin order gateway shared by every strategy in the hive.
pub struct OrderGateway {
    queues: Mutex<HashMap<StrategyId, StrategyQueue>>,
    order: Mutex<VecDeque<StrategyId>>,
    per_strategy_cap: usize,
    global_quota: Quota,
}

impl OrderGateway {
    pub fn new(global_orders_per_sec: u64, per_strategy_queue_cap: usize) -> Arc<Self> {
        Arc::new(Self {
            queues: Mutex::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
            per_strategy_cap: per_strategy_queue_cap,
            global_quota: Quota::new(global_orders_per_sec),
        })
    }

    /// Resets the global token budget; the scheduler calls this once per
    /// second.
    pub fn refill_quota(&self) {
        self.global_quota.refill();
    }

    pub fn submit(&self, strategy_id: StrategyId, intent: Intent) {
        let mut queues = self.queues.lock();
        let queue = queues
            .entry(strategy_id)
            .or_insert_with(|| StrategyQueue::new(self.per_strategy_cap));
        let was_empty = queue.is_empty();
        queue.push(strategy_id, intent);
        if was_empty {
            self.order.lock().push_back(strategy_id);
        }
    }

    /// Drains one intent per registered strategy in round-robin order,
    /// dispatching cancels ahead of creates within each strategy's own
    /// queue (`StrategyQueue::push` preserves FIFO order, but a cancel for
    /// the same `client_order_id` as a still-queued create short-circuits
    /// that create here).
    pub async fn run_once(&self, connector: &ExchangeConnector) {
        let next_strategy = {
            let mut order = self.order.lock();
            order.pop_front()
        };
        let Some(strategy_id) = next_strategy else {
            return;
        };

        let intent = {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(&strategy_id) else {
                return;
            };
            let popped = queue.pop();
            if !queue.is_empty() {
                self.order.lock().push_back(strategy_id);
            }
            popped
        };

        let Some((strategy_id, intent)) = intent else {
            return;
        };

        if !intent.is_cancel() && !self.global_quota.try_take() {
            // Requeue at the back; cancels always bypass the quota.
            self.submit(strategy_id, intent);
            return;
        }

        self.dispatch(strategy_id, intent, connector).await;
    }

    async fn dispatch(
        &self,
        strategy_id: StrategyId,
        intent: Intent,
        connector: &ExchangeConnector,
    ) {
        let mut attempt = 0;
        loop {
            let result: Result<(), ConnectorErrorKind> = match &intent {
                Intent::Create(req) => connector.rest().place_order(req.clone()).await.map(|_: OrderAck| ()),
                Intent::Cancel {
                    symbol,
                    client_order_id,
                } => connector.rest().cancel_order(symbol, client_order_id).await,
                Intent::CancelAllFor { symbol } => connector.rest().cancel_all(symbol).await,
            };

            match result {
                Ok(()) => {
                    debug!(%strategy_id, client_order_id = ?intent.client_order_id(), "gateway dispatched intent");
                    return;
                }
                Err(ConnectorErrorKind::Transient(reason)) if attempt < MAX_RETRIES => {
                    warn!(%strategy_id, reason, "transient rejection, retrying once");
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(ConnectorErrorKind::Transient(reason)) => {
                    warn!(%strategy_id, reason, "transient rejection exhausted retry budget");
                    return;
                }
                Err(ConnectorErrorKind::Business(reason)) => {
                    warn!(%strategy_id, reason, "business rejection, not retrying");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn queue_sheds_oldest_create_not_cancels() {
        let mut queue = StrategyQueue::new(2);
        let sid = Uuid::new_v4();
        let make_create = |id: &str| {
            Intent::Create(PlaceOrderRequest {
                symbol: "BTC-USD".into(),
                side: crate::models::OrderSide::Buy,
                order_type: crate::connector::OrderType::Limit,
                price: 100.0,
                size: 1.0,
                tif: crate::connector::TimeInForce::Gtc,
                reduce_only: false,
                client_order_id: id.into(),
            })
        };

        queue.push(sid, make_create("a"));
        queue.push(sid, make_create("b"));
        queue.push(
            sid,
            Intent::Cancel {
                symbol: "BTC-USD".into(),
                client_order_id: "a".into(),
            },
        );
        queue.push(sid, make_create("c"));

        // "a" (the oldest create) was shed to make room for "c"; the cancel
        // for "a" and "b"'s create survive.
        let remaining: Vec<_> = queue
            .items
            .iter()
            .map(|(_, i)| i.client_order_id().map(String::from))
            .collect();
        assert_eq!(
            remaining,
            vec![Some("b".to_string()), Some("a".to_string()), Some("c".to_string())]
        );
    }

    #[test]
    fn quota_refills_after_exhaustion() {
        let quota = Quota::new(1);
        assert!(quota.try_take());
        assert!(!quota.try_take());
        quota.refill();
        assert!(quota.try_take());
    }
}
