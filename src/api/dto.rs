//! Control-plane request/response bodies (spec.md §4.G).

use crate::error::FieldError;
use crate::models::{StrategyConfig, StrategyId, StrategyStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateStrategyRequest {
    pub name: String,
    pub strategy_type: crate::models::StrategyType,
    pub connector_type: String,
    pub trading_pair: String,
    pub parameters: crate::models::StrategyParameters,
    pub leverage: u32,
    pub position_mode: crate::models::PositionMode,
    pub total_amount_quote: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CreateStrategyResponse {
    pub id: StrategyId,
    pub warnings: Vec<FieldError>,
}

#[derive(Debug, Serialize)]
pub struct StrategyView {
    pub config: StrategyConfig,
    pub status: StrategyStatus,
}

#[derive(Debug, Serialize)]
pub struct StrategyListResponse {
    pub strategies: Vec<StrategyView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseStrategyRequest {
    pub strategy: String,
    #[serde(default = "default_true")]
    pub close_positions: bool,
    #[serde(default = "default_true")]
    pub cancel_orders: bool,
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub strategies: Vec<PortfolioEntry>,
    pub drawdown: crate::risk::DrawdownSnapshot,
}

#[derive(Debug, Serialize)]
pub struct PortfolioEntry {
    pub id: StrategyId,
    pub name: String,
    pub trading_pair: String,
    pub status: StrategyStatus,
    pub position_size: f64,
    pub entry_vwap: f64,
    pub realized_pnl: f64,
}

#[derive(Debug, Deserialize)]
pub struct BotsQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub strategies: usize,
}
