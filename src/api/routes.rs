//! Route table (spec.md §4.G).

use super::handlers;
use crate::auth::{auth_middleware, AuthConfig};
use crate::orchestrator::Orchestrator;
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn router(orchestrator: Arc<Orchestrator>, auth_config: Arc<AuthConfig>) -> Router {
    let protected = Router::new()
        .route("/strategies", post(handlers::create_strategy).get(handlers::list_strategies))
        .route("/strategies/:id", get(handlers::get_strategy).delete(handlers::delete_strategy))
        .route("/strategies/:id/stop", post(handlers::stop_strategy))
        .route("/strategies/close", post(handlers::close_strategy))
        .route("/portfolio", get(handlers::portfolio))
        .route("/bots", post(handlers::post_bot_heartbeat).get(handlers::get_bots))
        .route("/bots/:id", axum::routing::delete(handlers::delete_bot))
        .layer(axum_mw::from_fn_with_state(auth_config, auth_middleware))
        .with_state(orchestrator.clone());

    Router::new()
        .route("/health", get(handlers::health))
        .with_state(orchestrator)
        .merge(protected)
}
