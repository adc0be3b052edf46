//! Strategy Host (spec.md §4.E): runs each active strategy's pure decision
//! function against the latest book and live-order snapshot, diffs the
//! result against the current ladder, and hands the delta to the gateway.
//! One synchronous decision function per tick; side-effects go through the
//! gateway's queue rather than being made inline.

pub mod directional;
pub mod mm_v2;
pub mod pmm;

use crate::connector::{ExchangeConnector, OrderType, PlaceOrderRequest, TimeInForce};
use crate::error::HiveError;
use crate::gateway::{Intent, OrderGateway};
use crate::market_data::{MarketBookSnapshot, MarketDataHub};
use crate::models::{OrderSide, OrderState, StrategyConfig, StrategyId, StrategyParameters};
use crate::registry::StrategyRegistry;
use crate::risk::AccountHealthGate;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// One rung of a strategy's desired quote ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesiredOrder {
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

/// Everything a strategy's decision function needs, and nothing it can
/// mutate directly — all side effects flow back as `DesiredOrder`s.
pub struct TickContext<'a> {
    pub config: &'a StrategyConfig,
    pub book: &'a MarketBookSnapshot,
    pub position_size: f64,
    pub entry_vwap: f64,
}

/// Risk gates applied to every desired ladder before it reaches the
/// gateway (spec.md §4.E): notional cap, leverage cap, margin floor.
pub struct RiskLimits {
    pub max_position_notional: f64,
    pub max_leverage: u32,
    pub min_available_margin: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_notional: 1_000_000.0,
            max_leverage: 20,
            min_available_margin: 0.0,
        }
    }
}

/// Clamps a desired ladder so that filling every rung could not push the
/// position notional past the configured cap. Orders beyond the cap are
/// dropped outright rather than resized, so a strategy's own sizing
/// decisions are never silently altered.
pub fn apply_risk_gates(
    orders: Vec<DesiredOrder>,
    limits: &RiskLimits,
    position_size: f64,
    mid: f64,
) -> Vec<DesiredOrder> {
    if mid <= 0.0 {
        return orders;
    }
    let mut running = position_size;
    let mut kept = Vec::with_capacity(orders.len());
    for order in orders {
        let signed_size = match order.side {
            OrderSide::Buy => order.size,
            OrderSide::Sell => -order.size,
        };
        let projected_notional = (running + signed_size).abs() * mid;
        if projected_notional > limits.max_position_notional {
            continue;
        }
        running += signed_size;
        kept.push(order);
    }
    kept
}

/// Diffs a desired ladder against live orders, yielding cancels for rungs
/// no longer wanted and creates for rungs not already live. A live order
/// within `price_tolerance` of a desired rung on the same side is left
/// untouched (spec.md §4.E: "diff, don't reprint").
pub fn diff_ladder(
    desired: &[DesiredOrder],
    live: &[(String, OrderSide, f64)],
    price_tolerance: f64,
) -> (Vec<String>, Vec<DesiredOrder>) {
    let mut matched_live = vec![false; live.len()];
    let mut to_create = Vec::new();

    for d in desired {
        let existing = live.iter().enumerate().position(|(i, (_, side, price))| {
            !matched_live[i] && *side == d.side && (price - d.price).abs() <= price_tolerance
        });
        match existing {
            Some(idx) => matched_live[idx] = true,
            None => to_create.push(*d),
        }
    }

    let to_cancel = live
        .iter()
        .zip(matched_live.iter())
        .filter(|(_, matched)| !**matched)
        .map(|((id, _, _), _)| id.clone())
        .collect();

    (to_cancel, to_create)
}

pub struct StrategyHost {
    registry: Arc<StrategyRegistry>,
    hub: Arc<MarketDataHub>,
    gateway: Arc<OrderGateway>,
    risk_limits: RiskLimits,
    health_gate: AccountHealthGate,
    connector: Arc<AsyncMutex<ExchangeConnector>>,
    book_staleness_threshold: chrono::Duration,
    price_tolerance: f64,
}

impl StrategyHost {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        hub: Arc<MarketDataHub>,
        gateway: Arc<OrderGateway>,
        risk_limits: RiskLimits,
        health_gate: AccountHealthGate,
        connector: Arc<AsyncMutex<ExchangeConnector>>,
        book_staleness_threshold: chrono::Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            hub,
            gateway,
            risk_limits,
            health_gate,
            connector,
            book_staleness_threshold,
            price_tolerance: 1e-6,
        })
    }

    /// Runs one strategy's tick: loads its config/book/position snapshot,
    /// computes the desired ladder for its variant, risk-gates it, diffs it
    /// against live orders, and submits the delta to the gateway.
    pub async fn on_tick(&self, strategy_id: StrategyId) -> Result<(), HiveError> {
        let config = self
            .registry
            .get_config(strategy_id)
            .ok_or(HiveError::NotFound)?;

        let book = self
            .hub
            .latest(&config.trading_pair)
            .ok_or_else(|| HiveError::StrategyFault {
                strategy_id: strategy_id.to_string(),
                reason: "no book available".into(),
            })?;

        if !book.is_fresh(Utc::now(), self.book_staleness_threshold) {
            debug!(%strategy_id, "book stale, skipping tick");
            return Ok(());
        }

        let Some(mid) = book.mid() else {
            return Ok(());
        };

        let (live, position_size, entry_vwap) = self
            .registry
            .with_runtime(strategy_id, |rt| {
                let live: Vec<(String, OrderSide, f64)> = rt
                    .live_orders
                    .values()
                    .filter(|o| !o.state.is_terminal())
                    .map(|o| (o.client_order_id.clone(), o.side, o.price))
                    .collect();
                (live, rt.position.size, rt.position.entry_vwap)
            })
            .ok_or(HiveError::NotFound)?;

        let ctx = TickContext {
            config: &config,
            book: &book,
            position_size,
            entry_vwap,
        };

        let desired = match &config.parameters {
            StrategyParameters::PureMarketMaking(params) => pmm::decide(&ctx, params),
            StrategyParameters::DirectionalTrading(params) => directional::decide(&ctx, params),
            StrategyParameters::MarketMakingV2(params) => mm_v2::decide(&ctx, params),
            StrategyParameters::Arbitrage(_) => {
                return Err(HiveError::StrategyFault {
                    strategy_id: strategy_id.to_string(),
                    reason: "arbitrage strategies are not executable".into(),
                });
            }
        };

        let gated = apply_risk_gates(desired, &self.risk_limits, position_size, mid);
        let (to_cancel, mut to_create) = diff_ladder(&gated, &live, self.price_tolerance);

        // Account-health check gates new Creates; cancels still flow so an
        // unhealthy account can still shrink its exposure.
        let balances = {
            let connector = self.connector.lock().await;
            connector.rest().balances().await
        };
        match balances {
            Ok(balances) => {
                if let Err(reason) = self.health_gate.check(&balances, config.leverage) {
                    debug!(%strategy_id, reason, "account health gate suspended new orders this tick");
                    to_create.clear();
                }
            }
            Err(e) => {
                warn!(%strategy_id, error = ?e, "failed to fetch balances, suspending new orders this tick");
                to_create.clear();
            }
        }

        for client_order_id in to_cancel {
            self.gateway.submit(
                strategy_id,
                Intent::Cancel {
                    symbol: config.trading_pair.clone(),
                    client_order_id,
                },
            );
        }

        for order in to_create {
            let client_order_id = self
                .registry
                .with_runtime_mut(strategy_id, |rt| {
                    let client_order_id = rt.next_client_order_id(strategy_id);
                    rt.live_orders.insert(
                        client_order_id.clone(),
                        crate::models::OrderRecord {
                            client_order_id: client_order_id.clone(),
                            exchange_order_id: None,
                            side: order.side,
                            price: order.price,
                            size: order.size,
                            filled_size: 0.0,
                            state: OrderState::PendingNew,
                            created_at: Utc::now(),
                            strategy_id,
                        },
                    );
                    client_order_id
                })
                .ok_or(HiveError::NotFound)?;

            self.gateway.submit(
                strategy_id,
                Intent::Create(PlaceOrderRequest {
                    symbol: config.trading_pair.clone(),
                    side: order.side,
                    order_type: OrderType::Limit,
                    price: order.price,
                    size: order.size,
                    tif: TimeInForce::Gtc,
                    reduce_only: false,
                    client_order_id,
                }),
            );
        }

        self.registry
            .touch_tick(strategy_id, Utc::now(), Utc::now());
        Ok(())
    }

    pub async fn close(&self, strategy_id: StrategyId) {
        if let Some(config) = self.registry.get_config(strategy_id) {
            self.gateway.submit(
                strategy_id,
                Intent::CancelAllFor {
                    symbol: config.trading_pair,
                },
            );
        } else {
            warn!(%strategy_id, "close requested for unknown strategy");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_ladder_reuses_orders_within_tolerance() {
        let desired = vec![
            DesiredOrder {
                side: OrderSide::Buy,
                price: 100.0,
                size: 1.0,
            },
            DesiredOrder {
                side: OrderSide::Sell,
                price: 101.0,
                size: 1.0,
            },
        ];
        let live = vec![("a".to_string(), OrderSide::Buy, 100.0)];

        let (to_cancel, to_create) = diff_ladder(&desired, &live, 1e-6);
        assert!(to_cancel.is_empty());
        assert_eq!(to_create.len(), 1);
        assert_eq!(to_create[0].side, OrderSide::Sell);
    }

    #[test]
    fn diff_ladder_cancels_orders_no_longer_desired() {
        let desired = vec![DesiredOrder {
            side: OrderSide::Buy,
            price: 100.0,
            size: 1.0,
        }];
        let live = vec![
            ("a".to_string(), OrderSide::Buy, 100.0),
            ("b".to_string(), OrderSide::Sell, 105.0),
        ];

        let (to_cancel, to_create) = diff_ladder(&desired, &live, 1e-6);
        assert_eq!(to_cancel, vec!["b".to_string()]);
        assert!(to_create.is_empty());
    }

    #[test]
    fn risk_gate_drops_orders_past_notional_cap() {
        let orders = vec![
            DesiredOrder {
                side: OrderSide::Buy,
                price: 100.0,
                size: 5.0,
            },
            DesiredOrder {
                side: OrderSide::Buy,
                price: 100.0,
                size: 5.0,
            },
        ];
        let limits = RiskLimits {
            max_position_notional: 600.0,
            ..RiskLimits::default()
        };
        let kept = apply_risk_gates(orders, &limits, 0.0, 100.0);
        assert_eq!(kept.len(), 1);
    }
}
