//! Hive orchestrator binary: parses CLI/env configuration, wires an
//! `Orchestrator`, serves the control-plane API, and drains every active
//! strategy through the close protocol on shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use hive_orchestrator::auth::AuthConfig;
use hive_orchestrator::config::{exit_code, CliArgs, RuntimeConfig};
use hive_orchestrator::connector::{DelegatedKey, InstrumentMeta};
use hive_orchestrator::middleware::rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
use hive_orchestrator::orchestrator::{Orchestrator, OrchestratorArgs};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let code = run().await.unwrap_or_else(|err| {
        eprintln!("hive exited with error: {err:?}");
        exit_code::RUNTIME_ERROR
    });
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let _ = dotenv::dotenv();
    init_tracing();

    let args = CliArgs::parse();
    info!(network = ?args.network, port = args.port, "starting hive orchestrator");

    let Some(wallet_address) = args.wallet_address.clone() else {
        warn!("HIVE_WALLET_ADDRESS not set; refusing to start without a delegated signer");
        return Ok(exit_code::CONFIG_ERROR);
    };
    let Some(private_key) = args.private_key.clone() else {
        warn!("HIVE_PRIVATE_KEY not set; refusing to start without a delegated signer");
        return Ok(exit_code::CONFIG_ERROR);
    };

    let delegated_key = DelegatedKey::new(wallet_address, private_key);
    let instrument_meta = InstrumentMeta {
        tick_size: args.tick_size,
        lot_size: args.lot_size,
    };

    let orchestrator = Orchestrator::new(OrchestratorArgs {
        database_path: args.database_path.clone(),
        rest_base_url: args.rest_base_url.clone(),
        ws_url: args.ws_url.clone(),
        delegated_key,
        instrument_meta,
        dashboard_url: args.dashboard_url.clone(),
        bot_id: args.bot_id.clone(),
        api_port: args.port,
        runtime_config: RuntimeConfig::default(),
    })
    .context("failed to construct orchestrator")?;

    orchestrator.spawn_background_tasks();

    let auth_config = Arc::new(AuthConfig {
        admin_token: args.admin_token.clone(),
        timestamp_freshness_window: orchestrator.runtime_config.auth_timestamp_freshness_window,
    });

    let rate_limiter = RateLimitLayer::new(RateLimitConfig {
        max_requests: 120,
        window: Duration::from_secs(60),
        burst: 20,
    });

    let app = hive_orchestrator::api::router(orchestrator.clone(), auth_config)
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(
            hive_orchestrator::middleware::request_logging,
        ));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "control-plane API listening");

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = serve.await {
        warn!(error = %err, "server exited with error");
    }

    orchestrator.shutdown().await;
    info!("hive orchestrator shut down cleanly");
    Ok(exit_code::CLEAN)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hive_orchestrator=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
