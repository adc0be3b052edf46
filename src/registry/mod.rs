//! Strategy Registry & Store (spec.md §4.F): the single owner of every
//! `StrategyConfig`/`StrategyRuntime` pair, enforcing the lifecycle DFA and
//! write-through persistence.

pub mod bots;
pub mod store;

pub use bots::{BotRegistry, BotView};
pub use store::Store;

use crate::connector::OrderEvent;
use crate::error::{FieldError, HiveError};
use crate::models::{
    strategy_id_from_client_order_id, ActivityKind, ActivityRecord, OrderState, StrategyConfig,
    StrategyId, StrategyParameters, StrategyRuntime, StrategyStatus, StrategyType,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_LEVERAGE: u32 = 20;
const PCT_SUM_TOLERANCE: f64 = 0.01;

/// Parameter bounds shared by every strategy variant (spec.md §3/§8).
fn validate_parameters(fields: &mut Vec<FieldError>, config: &StrategyConfig) {
    match &config.parameters {
        StrategyParameters::PureMarketMaking(p) => {
            validate_spread(fields, "bid_spread", p.bid_spread);
            validate_spread(fields, "ask_spread", p.ask_spread);
            validate_refresh_time(fields, "order_refresh_time", p.order_refresh_time);
        }
        StrategyParameters::DirectionalTrading(p) => {
            if p.bb_length < 2 {
                fields.push(FieldError::error("bb_length", "must be at least 2"));
            }
        }
        StrategyParameters::MarketMakingV2(p) => {
            for spread in p.buy_spreads.iter().chain(p.sell_spreads.iter()) {
                validate_spread(fields, "buy_spreads/sell_spreads", *spread);
            }
            validate_refresh_time(fields, "executor_refresh_time", p.executor_refresh_time);
            validate_pct_sum(fields, "buy_amounts_pct", &p.buy_amounts_pct);
            validate_pct_sum(fields, "sell_amounts_pct", &p.sell_amounts_pct);
        }
        StrategyParameters::Arbitrage(_) => {}
    }
}

fn validate_spread(fields: &mut Vec<FieldError>, field: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        fields.push(FieldError::error(field, "spread must be within [0, 1]"));
    }
}

fn validate_refresh_time(fields: &mut Vec<FieldError>, field: &str, value: f64) {
    if !value.is_finite() || value < 0.0 {
        fields.push(FieldError::error(
            field,
            "refresh interval must be a finite, non-negative number",
        ));
    }
}

fn validate_pct_sum(fields: &mut Vec<FieldError>, field: &str, amounts_pct: &[f64]) {
    let sum: f64 = amounts_pct.iter().sum();
    if (sum - 100.0).abs() > PCT_SUM_TOLERANCE {
        fields.push(FieldError::error(
            field,
            format!("must sum to 100 (got {sum:.4})"),
        ));
    }
}

struct Entry {
    config: StrategyConfig,
    runtime: StrategyRuntime,
}

pub struct StrategyRegistry {
    entries: RwLock<HashMap<StrategyId, Entry>>,
    /// Stable registration order for the scheduler's round-robin iteration.
    order: RwLock<Vec<StrategyId>>,
    store: Arc<Store>,
}

impl StrategyRegistry {
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            store,
        })
    }

    /// Validates and registers a new strategy. Rejects duplicate names and
    /// the unsupported `arbitrage` variant (spec.md Open Question).
    pub fn register(&self, config: StrategyConfig) -> Result<StrategyId, HiveError> {
        let mut fields = Vec::new();

        if config.strategy_type == StrategyType::Arbitrage {
            fields.push(FieldError::error(
                "strategy_type",
                "arbitrage strategies are not supported by this orchestrator",
            ));
        }
        if config.name.trim().is_empty() {
            fields.push(FieldError::error("name", "name must not be empty"));
        }
        if config.total_amount_quote <= 0.0 {
            fields.push(FieldError::error(
                "total_amount_quote",
                "must be positive",
            ));
        }
        if config.leverage == 0 {
            fields.push(FieldError::error("leverage", "must be at least 1"));
        } else if config.leverage > MAX_LEVERAGE {
            fields.push(FieldError::error(
                "leverage",
                format!("must be at most {MAX_LEVERAGE}"),
            ));
        }
        validate_parameters(&mut fields, &config);

        if !fields.is_empty() {
            return Err(HiveError::config_invalid(fields));
        }

        if self.store.name_exists(&config.name).unwrap_or(false)
            || self.entries.read().values().any(|e| e.config.name == config.name)
        {
            return Err(HiveError::DuplicateName(config.name));
        }

        let id = config.id;
        let runtime = StrategyRuntime::new(Utc::now());

        self.store
            .insert_strategy(&config, runtime.status)
            .map_err(|e| HiveError::ConfigInvalid {
                fields: vec![FieldError::error("store", e.to_string())],
            })?;

        self.entries.write().insert(id, Entry { config, runtime });
        self.order.write().push(id);
        info!(%id, "strategy registered");
        Ok(id)
    }

    pub fn get_config(&self, id: StrategyId) -> Option<StrategyConfig> {
        self.entries.read().get(&id).map(|e| e.config.clone())
    }

    /// Resolves a strategy's registered name back to its id, used by
    /// name-addressed control-plane endpoints (spec.md §4.G's close route).
    pub fn find_id_by_name(&self, name: &str) -> Option<StrategyId> {
        self.entries
            .read()
            .iter()
            .find(|(_, e)| e.config.name == name)
            .map(|(id, _)| *id)
    }

    pub fn list_ids(&self) -> Vec<StrategyId> {
        self.order.read().clone()
    }

    pub fn status(&self, id: StrategyId) -> Option<StrategyStatus> {
        self.entries.read().get(&id).map(|e| e.runtime.status)
    }

    /// Transitions `id` to `next` if the DFA allows it; no-op on success'
    /// write-through if it's the same state twice (idempotent close/stop).
    pub fn mark_status(&self, id: StrategyId, next: StrategyStatus) -> Result<(), HiveError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id).ok_or(HiveError::NotFound)?;

        if entry.runtime.status == next {
            return Ok(());
        }
        if !entry.runtime.status.can_transition_to(next) {
            return Err(HiveError::StrategyFault {
                strategy_id: id.to_string(),
                reason: format!("cannot transition {:?} -> {:?}", entry.runtime.status, next),
            });
        }
        entry.runtime.status = next;
        let _ = self.store.update_status(id, next);
        Ok(())
    }

    pub fn append_activity(&self, record: ActivityRecord) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&record.strategy_id) {
            entry.runtime.counters.total_actions += 1;
            match record.kind {
                ActivityKind::Fill if record.success => entry.runtime.counters.successful_orders += 1,
                ActivityKind::Reject => entry.runtime.counters.failed_orders += 1,
                _ => {}
            }
            entry.runtime.recent_actions.push(record.clone());
        }
        let _ = self.store.append_activity(&record);
    }

    pub fn record_tick_overrun(&self, id: StrategyId) {
        if let Some(entry) = self.entries.write().get_mut(&id) {
            entry.runtime.counters.tick_overruns += 1;
        }
    }

    pub fn touch_tick(&self, id: StrategyId, now: DateTime<Utc>, next_eligible_at: DateTime<Utc>) {
        if let Some(entry) = self.entries.write().get_mut(&id) {
            entry.runtime.last_tick_at = Some(now);
            entry.runtime.next_eligible_at = next_eligible_at;
        }
    }

    /// `status == active ∧ book fresh ∧ next_eligible_at <= now`, in stable
    /// registration order (spec.md §4.D). Freshness is checked by the
    /// caller (the scheduler has the market data hub); this only applies
    /// the status/cadence half of the predicate.
    pub fn eligible_strategies(&self, now: DateTime<Utc>) -> Vec<StrategyId> {
        let entries = self.entries.read();
        self.order
            .read()
            .iter()
            .filter(|id| {
                entries.get(id).is_some_and(|e| {
                    e.runtime.status == StrategyStatus::Active && e.runtime.next_eligible_at <= now
                })
            })
            .copied()
            .collect()
    }

    pub fn with_runtime<R>(&self, id: StrategyId, f: impl FnOnce(&StrategyRuntime) -> R) -> Option<R> {
        self.entries.read().get(&id).map(|e| f(&e.runtime))
    }

    pub fn with_runtime_mut<R>(
        &self,
        id: StrategyId,
        f: impl FnOnce(&mut StrategyRuntime) -> R,
    ) -> Option<R> {
        self.entries.write().get_mut(&id).map(|e| f(&mut e.runtime))
    }

    /// Routes a connector `OrderEvent` back to its owning strategy (decoded
    /// from the `client_order_id` prefix) and folds it into that
    /// strategy's order/position state.
    pub fn apply_order_event(&self, event: OrderEvent) {
        let client_order_id = match &event {
            OrderEvent::Ack(ack) => ack.client_order_id.clone(),
            OrderEvent::Fill { client_order_id, .. }
            | OrderEvent::Cancelled { client_order_id }
            | OrderEvent::Rejected { client_order_id, .. } => client_order_id.clone(),
        };

        let Some(strategy_id) = strategy_id_from_client_order_id(&client_order_id) else {
            warn!(client_order_id, "order event references unroutable client_order_id");
            return;
        };

        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&strategy_id) else {
            return;
        };

        match event {
            OrderEvent::Ack(ack) => {
                if let Some(order) = entry.runtime.live_orders.get_mut(&ack.client_order_id) {
                    order.exchange_order_id = Some(ack.exchange_order_id);
                    order.transition(OrderState::Open);
                }
            }
            OrderEvent::Fill {
                client_order_id,
                price,
                size,
            } => {
                if let Some(order) = entry.runtime.live_orders.get_mut(&client_order_id) {
                    order.filled_size += size;
                    let side = order.side;
                    let next_state = if order.filled_size + 1e-9 >= order.size {
                        OrderState::Filled
                    } else {
                        OrderState::PartiallyFilled
                    };
                    order.transition(next_state);
                    entry.runtime.position.apply_fill(side, price, size);
                }
            }
            OrderEvent::Cancelled { client_order_id } => {
                if let Some(order) = entry.runtime.live_orders.get_mut(&client_order_id) {
                    order.transition(OrderState::Cancelled);
                }
            }
            OrderEvent::Rejected { client_order_id, .. } => {
                if let Some(order) = entry.runtime.live_orders.get_mut(&client_order_id) {
                    order.transition(OrderState::Rejected);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PmmParams, PositionMode, StrategyParameters};

    fn sample(name: &str, strategy_type: StrategyType) -> StrategyConfig {
        StrategyConfig {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            strategy_type,
            connector_type: "hyperliquid".into(),
            trading_pair: "BTC-USD".into(),
            parameters: StrategyParameters::PureMarketMaking(PmmParams {
                bid_spread: 0.001,
                ask_spread: 0.001,
                order_amount: 10.0,
                order_levels: 1,
                order_refresh_time: 30.0,
                minimum_spread: 0.0,
                price_ceiling: None,
                price_floor: None,
                ping_pong_enabled: false,
                inventory_skew_enabled: false,
                hanging_orders_enabled: false,
                order_optimization_enabled: false,
                add_transaction_costs: false,
            }),
            leverage: 1,
            position_mode: PositionMode::Oneway,
            total_amount_quote: 1000.0,
            enabled: true,
            owner: "0xabc".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        registry.register(sample("alpha", StrategyType::PureMarketMaking)).unwrap();
        let err = registry
            .register(sample("alpha", StrategyType::PureMarketMaking))
            .unwrap_err();
        assert!(matches!(err, HiveError::DuplicateName(_)));
    }

    #[test]
    fn rejects_arbitrage_strategy_type() {
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        let err = registry
            .register(sample("arb-1", StrategyType::Arbitrage))
            .unwrap_err();
        assert!(matches!(err, HiveError::ConfigInvalid { .. }));
    }

    #[test]
    fn eligible_set_excludes_non_active_and_not_yet_due() {
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        let id = registry.register(sample("beta", StrategyType::PureMarketMaking)).unwrap();
        assert!(registry.eligible_strategies(Utc::now()).is_empty());

        registry.mark_status(id, StrategyStatus::Active).unwrap();
        assert_eq!(registry.eligible_strategies(Utc::now()), vec![id]);
    }

    #[test]
    fn rejects_leverage_above_cap() {
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        let mut config = sample("over-levered", StrategyType::PureMarketMaking);
        config.leverage = 25;
        let err = registry.register(config).unwrap_err();
        assert!(matches!(err, HiveError::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_spread_outside_unit_interval() {
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        let mut config = sample("wide-spread", StrategyType::PureMarketMaking);
        config.parameters = StrategyParameters::PureMarketMaking(PmmParams {
            bid_spread: 1.5,
            ask_spread: 0.001,
            order_amount: 10.0,
            order_levels: 1,
            order_refresh_time: 30.0,
            minimum_spread: 0.0,
            price_ceiling: None,
            price_floor: None,
            ping_pong_enabled: false,
            inventory_skew_enabled: false,
            hanging_orders_enabled: false,
            order_optimization_enabled: false,
            add_transaction_costs: false,
        });
        let err = registry.register(config).unwrap_err();
        assert!(matches!(err, HiveError::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_mm_v2_amounts_not_summing_to_100() {
        use crate::models::MmV2Params;
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        let mut config = sample("mmv2-bad-pct", StrategyType::MarketMakingV2);
        config.parameters = StrategyParameters::MarketMakingV2(MmV2Params {
            buy_spreads: vec![0.01, 0.02],
            sell_spreads: vec![0.01, 0.02],
            buy_amounts_pct: vec![50.0, 40.0],
            sell_amounts_pct: vec![50.0, 50.0],
            executor_refresh_time: 30.0,
            cooldown_time: 0,
        });
        let err = registry.register(config).unwrap_err();
        assert!(matches!(err, HiveError::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_directional_bb_length_below_minimum() {
        use crate::models::{Controller, DirectionalParams};
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        let mut config = sample("directional-short-bb", StrategyType::DirectionalTrading);
        config.parameters = StrategyParameters::DirectionalTrading(DirectionalParams {
            controller_name: Controller::Bollinger,
            candles_connector: "hyperliquid".into(),
            candles_trading_pair: "BTC-USD".into(),
            interval: "1m".into(),
            bb_length: 1,
            bb_std: 2.0,
            bb_long_threshold: 0.0,
            bb_short_threshold: 0.0,
            stop_loss: 0.02,
            take_profit: 0.04,
            time_limit: 3600,
            cooldown_time: 0,
            trailing_stop: None,
            dca_spreads: vec![],
            dca_amounts_pct: vec![1.0],
            max_executors_per_side: 1,
            take_profit_order_type: None,
        });
        let err = registry.register(config).unwrap_err();
        assert!(matches!(err, HiveError::ConfigInvalid { .. }));
    }

    #[test]
    fn find_id_by_name_resolves_registered_strategy() {
        let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
        let id = registry.register(sample("gamma", StrategyType::PureMarketMaking)).unwrap();
        assert_eq!(registry.find_id_by_name("gamma"), Some(id));
        assert_eq!(registry.find_id_by_name("missing"), None);
    }
}
