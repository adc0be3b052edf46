//! Close Protocol (spec.md §4.H): cancel → flatten → snapshot → stop,
//! idempotent and with at most one close in flight per strategy.

use crate::connector::{ExchangeConnector, OrderType, PlaceOrderRequest, TimeInForce};
use crate::error::HiveError;
use crate::gateway::{Intent, OrderGateway};
use crate::models::{ActivityKind, ActivityRecord, OrderSide, StrategyId, StrategyStatus};
use crate::registry::StrategyRegistry;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MAX_FLATTEN_RETRIES: u32 = 3;

pub struct CloseProtocol {
    registry: Arc<StrategyRegistry>,
    gateway: Arc<OrderGateway>,
    in_flight: Mutex<HashSet<StrategyId>>,
    cancel_deadline: Duration,
}

impl CloseProtocol {
    pub fn new(registry: Arc<StrategyRegistry>, gateway: Arc<OrderGateway>, cancel_deadline: Duration) -> Arc<Self> {
        Arc::new(Self {
            registry,
            gateway,
            in_flight: Mutex::new(HashSet::new()),
            cancel_deadline,
        })
    }

    /// Runs the close sequence for `strategy_id`. Idempotent: a second call
    /// while one is already running for the same strategy is a no-op, and a
    /// second call after the strategy has already reached a terminal status
    /// just reports that final state back as success rather than erroring.
    ///
    /// `cancel_orders` and `close_positions` gate steps 2 and 3 of the
    /// sequence independently (spec.md §4.H): a caller may ask to cancel the
    /// open ladder without flattening, or vice versa.
    pub async fn close(
        &self,
        strategy_id: StrategyId,
        connector: &ExchangeConnector,
        cancel_orders: bool,
        close_positions: bool,
    ) -> Result<(), HiveError> {
        match self.registry.status(strategy_id) {
            None => return Err(HiveError::NotFound),
            Some(status) if status.is_terminal() => {
                info!(%strategy_id, ?status, "close requested for an already-stopped strategy, reporting final state");
                return Ok(());
            }
            _ => {}
        }

        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(strategy_id) {
                info!(%strategy_id, "close already in flight, ignoring duplicate request");
                return Ok(());
            }
        }

        let result = self
            .run_sequence(strategy_id, connector, cancel_orders, close_positions)
            .await;

        self.in_flight.lock().remove(&strategy_id);
        result
    }

    async fn run_sequence(
        &self,
        strategy_id: StrategyId,
        connector: &ExchangeConnector,
        cancel_orders: bool,
        close_positions: bool,
    ) -> Result<(), HiveError> {
        let config = self
            .registry
            .get_config(strategy_id)
            .ok_or(HiveError::NotFound)?;

        // Refuses new Creates from here on; cancels still flow (enforced by
        // the scheduler checking `status == active` before ticking).
        self.registry.mark_status(strategy_id, StrategyStatus::Closing)?;

        if cancel_orders {
            self.gateway.submit(
                strategy_id,
                Intent::CancelAllFor {
                    symbol: config.trading_pair.clone(),
                },
            );
            self.wait_for_empty_queue(strategy_id).await;
        }

        let mut flatten_error = None;
        if close_positions {
            let position_size = self
                .registry
                .with_runtime(strategy_id, |rt| rt.position.size)
                .unwrap_or(0.0);

            if position_size.abs() > 1e-9 {
                flatten_error = self
                    .flatten(strategy_id, &config.trading_pair, position_size, connector)
                    .await
                    .err();
            }

            self.registry.append_activity(ActivityRecord {
                timestamp: Utc::now(),
                strategy_id,
                kind: ActivityKind::Flatten,
                success: flatten_error.is_none(),
                order_id: None,
                price: None,
                size: Some(position_size.abs()),
                trading_pair: config.trading_pair.clone(),
            });
        }

        if let Some(reason) = &flatten_error {
            self.registry
                .with_runtime_mut(strategy_id, |rt| {
                    rt.error_state = Some("flatten_failed".to_string())
                });
            warn!(%strategy_id, reason, "flatten failed after retry budget, stopping anyway");
        }

        // Stop regardless of flatten outcome: a strategy stuck in `closing`
        // forever is worse than one that stops with a recorded fault.
        self.registry.mark_status(strategy_id, StrategyStatus::Stopped)?;

        if let Some(reason) = flatten_error {
            return Err(HiveError::CloseFailed {
                strategy_id: strategy_id.to_string(),
                reason,
            });
        }
        Ok(())
    }

    async fn wait_for_empty_queue(&self, strategy_id: StrategyId) {
        let deadline = tokio::time::Instant::now() + self.cancel_deadline;
        loop {
            let open_orders = self
                .registry
                .with_runtime(strategy_id, |rt| {
                    rt.live_orders.values().filter(|o| !o.state.is_terminal()).count()
                })
                .unwrap_or(0);

            if open_orders == 0 || tokio::time::Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn flatten(
        &self,
        strategy_id: StrategyId,
        symbol: &str,
        position_size: f64,
        connector: &ExchangeConnector,
    ) -> Result<(), String> {
        let side = if position_size > 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };

        for attempt in 0..MAX_FLATTEN_RETRIES {
            let req = PlaceOrderRequest {
                symbol: symbol.to_string(),
                side,
                order_type: OrderType::Market,
                price: 0.0,
                size: position_size.abs(),
                tif: TimeInForce::Ioc,
                reduce_only: true,
                client_order_id: format!("{strategy_id}-flatten-{attempt}"),
            };
            match connector.rest().place_order(req).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(%strategy_id, attempt, "flatten attempt failed, retrying");
                    let _ = e;
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
        }
        Err(format!("flatten exhausted {MAX_FLATTEN_RETRIES} retries"))
    }
}
