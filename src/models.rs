//! Core data model (spec.md §3): strategy configs/runtime, order records,
//! activity log, and bot heartbeats. Ownership follows spec.md §3's table —
//! the registry (F) exclusively owns `StrategyConfig`/`StrategyRuntime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

pub type StrategyId = uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    PureMarketMaking,
    DirectionalTrading,
    MarketMakingV2,
    Arbitrage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionMode {
    Oneway,
    Hedge,
}

/// Type-tagged strategy parameters (spec.md §6, per `strategy_type`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy_type", rename_all = "snake_case")]
pub enum StrategyParameters {
    PureMarketMaking(PmmParams),
    DirectionalTrading(DirectionalParams),
    MarketMakingV2(MmV2Params),
    Arbitrage(ArbitrageParams),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmmParams {
    pub bid_spread: f64,
    pub ask_spread: f64,
    pub order_amount: f64,
    pub order_levels: u32,
    pub order_refresh_time: f64,
    #[serde(default)]
    pub minimum_spread: f64,
    #[serde(default)]
    pub price_ceiling: Option<f64>,
    #[serde(default)]
    pub price_floor: Option<f64>,
    #[serde(default)]
    pub ping_pong_enabled: bool,
    #[serde(default)]
    pub inventory_skew_enabled: bool,
    #[serde(default)]
    pub hanging_orders_enabled: bool,
    #[serde(default)]
    pub order_optimization_enabled: bool,
    #[serde(default)]
    pub add_transaction_costs: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    Bollinger,
    MacdBb,
    Supertrend,
    DmanV3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionalParams {
    pub controller_name: Controller,
    pub candles_connector: String,
    pub candles_trading_pair: String,
    pub interval: String,
    pub bb_length: u32,
    pub bb_std: f64,
    pub bb_long_threshold: f64,
    pub bb_short_threshold: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub time_limit: u64,
    #[serde(default)]
    pub cooldown_time: u64,
    #[serde(default)]
    pub trailing_stop: Option<f64>,
    #[serde(default)]
    pub dca_spreads: Vec<f64>,
    #[serde(default)]
    pub dca_amounts_pct: Vec<f64>,
    #[serde(default = "default_max_executors")]
    pub max_executors_per_side: u32,
    #[serde(default)]
    pub take_profit_order_type: Option<String>,
}

fn default_max_executors() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmV2Params {
    pub buy_spreads: Vec<f64>,
    pub sell_spreads: Vec<f64>,
    pub buy_amounts_pct: Vec<f64>,
    pub sell_amounts_pct: Vec<f64>,
    pub executor_refresh_time: f64,
    #[serde(default)]
    pub cooldown_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageParams {
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Immutable-after-registration descriptor (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: StrategyId,
    pub name: String,
    pub strategy_type: StrategyType,
    pub connector_type: String,
    pub trading_pair: String,
    pub parameters: StrategyParameters,
    pub leverage: u32,
    pub position_mode: PositionMode,
    pub total_amount_quote: f64,
    pub enabled: bool,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Pending,
    Active,
    Closing,
    Stopped,
    Error,
}

impl StrategyStatus {
    /// Lifecycle DFA transitions (spec.md §4.F).
    pub fn can_transition_to(self, next: StrategyStatus) -> bool {
        use StrategyStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Error)
                | (Active, Closing)
                | (Active, Error)
                | (Closing, Stopped)
                | (Closing, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StrategyStatus::Stopped | StrategyStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    PendingNew,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }

    /// Monotonic DFA per spec.md §4.3 (implied by §3 invariants).
    pub fn can_transition_to(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (PendingNew, Open)
                | (PendingNew, Rejected)
                | (PendingNew, Cancelled)
                | (Open, PartiallyFilled)
                | (Open, Filled)
                | (Open, Cancelled)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub filled_size: f64,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub strategy_id: StrategyId,
}

impl OrderRecord {
    pub fn transition(&mut self, next: OrderState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    /// Positive = long, negative = short.
    pub size: f64,
    pub entry_vwap: f64,
    pub realized_pnl: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.size.abs() < 1e-9
    }

    /// Fold a fill into the position, updating entry VWAP and realized PnL
    /// when the fill reduces or reverses the existing side.
    pub fn apply_fill(&mut self, side: OrderSide, price: f64, size: f64) {
        let signed = match side {
            OrderSide::Buy => size,
            OrderSide::Sell => -size,
        };

        let same_direction = self.size == 0.0 || self.size.signum() == signed.signum();
        if same_direction {
            let new_size = self.size + signed;
            if new_size != 0.0 {
                self.entry_vwap =
                    (self.entry_vwap * self.size.abs() + price * signed.abs()) / new_size.abs();
            }
            self.size = new_size;
        } else {
            let closing = signed.abs().min(self.size.abs());
            let pnl_per_unit = if self.size > 0.0 {
                price - self.entry_vwap
            } else {
                self.entry_vwap - price
            };
            self.realized_pnl += pnl_per_unit * closing;
            let prior_sign = self.size.signum();
            self.size += signed;
            if self.size != 0.0 && self.size.signum() != prior_sign {
                // Position flipped sides; remaining size re-enters at this fill's price.
                self.entry_vwap = price;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Counters {
    pub total_actions: u64,
    pub successful_orders: u64,
    pub failed_orders: u64,
    pub tick_overruns: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Create,
    Cancel,
    Fill,
    Reject,
    StatusChange,
    Flatten,
    Resync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub timestamp: DateTime<Utc>,
    pub strategy_id: StrategyId,
    pub kind: ActivityKind,
    pub success: bool,
    pub order_id: Option<String>,
    pub price: Option<f64>,
    pub size: Option<f64>,
    pub trading_pair: String,
}

/// Bounded ring buffer of the most recent N items (spec.md §3: "recent_actions").
#[derive(Debug, Clone)]
pub struct Ring<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Mutable execution state per config (spec.md §3).
#[derive(Debug, Clone)]
pub struct StrategyRuntime {
    pub status: StrategyStatus,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub next_eligible_at: DateTime<Utc>,
    pub live_orders: HashMap<String, OrderRecord>,
    pub position: Position,
    pub counters: Counters,
    pub recent_actions: Ring<ActivityRecord>,
    pub error_state: Option<String>,
    pub client_order_seq: u64,
}

impl StrategyRuntime {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: StrategyStatus::Pending,
            last_tick_at: None,
            next_eligible_at: now,
            live_orders: HashMap::new(),
            position: Position::default(),
            counters: Counters::default(),
            recent_actions: Ring::new(32),
            error_state: None,
            client_order_seq: 0,
        }
    }

    /// `{strategy_id in simple form}-{seq}` — the simple (no-hyphen) form
    /// keeps the separator unambiguous so the order-event router can split
    /// on the last `-` to recover the owning strategy.
    pub fn next_client_order_id(&mut self, strategy_id: StrategyId) -> String {
        self.client_order_seq += 1;
        format!("{}-{}", strategy_id.simple(), self.client_order_seq)
    }
}

/// Recovers the strategy id embedded in a client order id produced by
/// `StrategyRuntime::next_client_order_id`.
pub fn strategy_id_from_client_order_id(client_order_id: &str) -> Option<StrategyId> {
    let (simple, _seq) = client_order_id.rsplit_once('-')?;
    uuid::Uuid::parse_str(simple).ok()
}

/// `(bot_id, name, status, strategies[], uptime, counters, api_port, last_activity)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotHeartbeat {
    pub id: String,
    pub name: String,
    pub status: String,
    pub strategies: Vec<StrategyId>,
    pub uptime: u64,
    pub total_strategies: u32,
    pub total_actions: u64,
    pub actions_per_minute: f64,
    pub memory_usage: u64,
    pub cpu_usage: f64,
    pub api_port: u16,
    #[serde(default)]
    pub user_main_address: Option<String>,
    pub last_activity: DateTime<Utc>,
}
