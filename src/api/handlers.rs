//! Control-plane HTTP handlers (spec.md §4.G).

use super::dto::*;
use crate::auth::AuthContext;
use crate::error::HiveError;
use crate::models::{StrategyConfig, StrategyId, StrategyStatus};
use crate::orchestrator::Orchestrator;
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

fn owner_of(auth: &AuthContext) -> String {
    match auth {
        AuthContext::Admin => "admin".to_string(),
        AuthContext::Wallet { address } => address.clone(),
    }
}

pub async fn create_strategy(
    State(orchestrator): State<Arc<Orchestrator>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateStrategyRequest>,
) -> Result<Json<CreateStrategyResponse>, HiveError> {
    let config = StrategyConfig {
        id: uuid::Uuid::new_v4(),
        name: body.name,
        strategy_type: body.strategy_type,
        connector_type: body.connector_type,
        trading_pair: body.trading_pair,
        parameters: body.parameters,
        leverage: body.leverage,
        position_mode: body.position_mode,
        total_amount_quote: body.total_amount_quote,
        enabled: body.enabled,
        owner: owner_of(&auth),
        created_at: Utc::now(),
    };

    let id = orchestrator.registry.register(config)?;
    orchestrator.registry.mark_status(id, StrategyStatus::Active)?;

    Ok(Json(CreateStrategyResponse {
        id,
        warnings: Vec::new(),
    }))
}

pub async fn list_strategies(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Json<StrategyListResponse> {
    let strategies = orchestrator
        .registry
        .list_ids()
        .into_iter()
        .filter_map(|id| {
            let config = orchestrator.registry.get_config(id)?;
            let status = orchestrator.registry.status(id)?;
            Some(StrategyView { config, status })
        })
        .collect();
    Json(StrategyListResponse { strategies })
}

pub async fn get_strategy(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<StrategyId>,
) -> Result<Json<StrategyView>, HiveError> {
    let config = orchestrator.registry.get_config(id).ok_or(HiveError::NotFound)?;
    let status = orchestrator.registry.status(id).ok_or(HiveError::NotFound)?;
    Ok(Json(StrategyView { config, status }))
}

pub async fn delete_strategy(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<StrategyId>,
) -> Result<(), HiveError> {
    let connector = orchestrator.connector.lock().await;
    orchestrator
        .close_protocol
        .close(id, &connector, true, true)
        .await
}

pub async fn close_strategy(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(body): Json<CloseStrategyRequest>,
) -> Result<(), HiveError> {
    let id = orchestrator
        .registry
        .find_id_by_name(&body.strategy)
        .ok_or(HiveError::NotFound)?;
    let connector = orchestrator.connector.lock().await;
    orchestrator
        .close_protocol
        .close(id, &connector, body.cancel_orders, body.close_positions)
        .await
}

pub async fn stop_strategy(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<StrategyId>,
) -> Result<(), HiveError> {
    orchestrator.registry.mark_status(id, StrategyStatus::Stopped)
}

pub async fn portfolio(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Json<PortfolioResponse> {
    let mut total_equity = 0.0;
    let strategies: Vec<_> = orchestrator
        .registry
        .list_ids()
        .into_iter()
        .filter_map(|id| {
            let config = orchestrator.registry.get_config(id)?;
            let status = orchestrator.registry.status(id)?;
            let (position_size, entry_vwap, realized_pnl) = orchestrator
                .registry
                .with_runtime(id, |rt| (rt.position.size, rt.position.entry_vwap, rt.position.realized_pnl))
                .unwrap_or_default();
            total_equity += realized_pnl;
            Some(PortfolioEntry {
                id,
                name: config.name,
                trading_pair: config.trading_pair,
                status,
                position_size,
                entry_vwap,
                realized_pnl,
            })
        })
        .collect();

    let mut monitor = crate::risk::DrawdownMonitor::new(total_equity.max(1.0));
    monitor.update(total_equity);

    Json(PortfolioResponse {
        strategies,
        drawdown: monitor.snapshot(),
    })
}

pub async fn post_bot_heartbeat(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(body): Json<crate::models::BotHeartbeat>,
) -> Result<Json<serde_json::Value>, HiveError> {
    tracing::info!(bot_id = %body.id, status = %body.status, "received bot heartbeat");
    orchestrator.bots.record_heartbeat(&body, Utc::now())?;
    Ok(Json(serde_json::json!({ "success": true, "bot": body })))
}

pub async fn get_bots(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<BotsQuery>,
) -> Result<Json<serde_json::Value>, HiveError> {
    let ids = orchestrator.registry.list_ids();
    if query.format.as_deref() == Some("metrics") {
        let active = ids
            .iter()
            .filter(|id| orchestrator.registry.status(**id) == Some(StrategyStatus::Active))
            .count();
        return Ok(Json(serde_json::json!({
            "hive_strategies_total": ids.len(),
            "hive_strategies_active": active,
        })));
    }

    let offline_after = chrono::Duration::from_std(orchestrator.runtime_config.bot_offline_after)
        .unwrap_or_else(|_| chrono::Duration::minutes(2));
    let bots = orchestrator.bots.list(Utc::now(), offline_after)?;
    Ok(Json(serde_json::json!({ "bots": bots })))
}

/// Removes a bot's heartbeat record; used to clear an offline instance from
/// the listing once an operator has confirmed it is gone (spec.md §8
/// scenario 6).
pub async fn delete_bot(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, HiveError> {
    orchestrator.bots.remove(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn health(State(orchestrator): State<Arc<Orchestrator>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        strategies: orchestrator.registry.list_ids().len(),
    })
}
