//! The explicitly constructed orchestrator object (spec.md §9's redesign
//! note: "global mutable state becomes an explicitly constructed
//! Orchestrator"). Owns every shared component and wires their lifetimes
//! together; `main` only parses config and calls into here.

use crate::close::CloseProtocol;
use crate::config::RuntimeConfig;
use crate::connector::{DelegatedKey, ExchangeConnector, InstrumentMeta};
use crate::gateway::OrderGateway;
use crate::market_data::MarketDataHub;
use crate::observability::HeartbeatEmitter;
use crate::registry::{BotRegistry, Store, StrategyRegistry};
use crate::risk::AccountHealthGate;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::strategy::{RiskLimits, StrategyHost};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct Orchestrator {
    pub registry: Arc<StrategyRegistry>,
    pub bots: Arc<BotRegistry>,
    pub gateway: Arc<OrderGateway>,
    pub hub: Arc<MarketDataHub>,
    pub host: Arc<StrategyHost>,
    pub close_protocol: Arc<CloseProtocol>,
    pub heartbeat: Arc<HeartbeatEmitter>,
    pub health_gate: AccountHealthGate,
    pub connector: Arc<tokio::sync::Mutex<ExchangeConnector>>,
    pub runtime_config: RuntimeConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

pub struct OrchestratorArgs {
    pub database_path: String,
    pub rest_base_url: String,
    pub ws_url: String,
    pub delegated_key: DelegatedKey,
    pub instrument_meta: InstrumentMeta,
    pub dashboard_url: Option<String>,
    pub bot_id: String,
    pub api_port: u16,
    pub runtime_config: RuntimeConfig,
}

impl Orchestrator {
    pub fn new(args: OrchestratorArgs) -> anyhow::Result<Arc<Self>> {
        let store = Arc::new(Store::open(&args.database_path)?);
        let registry = StrategyRegistry::new(Arc::clone(&store));
        let bots = BotRegistry::new(store);

        let gateway = OrderGateway::new(
            args.runtime_config.gateway_global_orders_per_sec as u64,
            256,
        );

        let hub = MarketDataHub::new(args.runtime_config.unsubscribe_linger);

        let connector = ExchangeConnector::connect(
            args.rest_base_url,
            args.ws_url,
            args.delegated_key,
            args.instrument_meta,
            Arc::clone(&hub),
        );
        let connector = Arc::new(tokio::sync::Mutex::new(connector));

        let health_gate = AccountHealthGate {
            max_leverage: 20,
            min_available_margin: 0.0,
        };

        let host = StrategyHost::new(
            Arc::clone(&registry),
            Arc::clone(&hub),
            Arc::clone(&gateway),
            RiskLimits::default(),
            health_gate,
            Arc::clone(&connector),
            chrono::Duration::from_std(args.runtime_config.book_staleness_threshold)
                .unwrap_or(chrono::Duration::seconds(5)),
        );

        let close_protocol = CloseProtocol::new(
            Arc::clone(&registry),
            Arc::clone(&gateway),
            args.runtime_config.close_cancel_deadline,
        );

        let heartbeat = HeartbeatEmitter::new(
            Arc::clone(&registry),
            args.dashboard_url,
            args.bot_id,
            args.api_port,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Arc::new(Self {
            registry,
            bots,
            gateway,
            hub,
            host,
            close_protocol,
            heartbeat,
            health_gate,
            connector,
            runtime_config: args.runtime_config,
            shutdown_tx,
            shutdown_rx,
        }))
    }

    /// Spawns the scheduler, heartbeat emitter, order-gateway drain loop,
    /// and order-event router as background tasks.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let scheduler = Scheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.host),
            Arc::clone(&self.gateway),
            SchedulerConfig {
                tick_cadence: self.runtime_config.tick_cadence,
                tick_soft_budget: self.runtime_config.tick_soft_budget,
            },
        );
        tokio::spawn(scheduler.run(self.shutdown_rx.clone()));

        let heartbeat = Arc::clone(&self.heartbeat);
        let heartbeat_interval = self.runtime_config.heartbeat_interval;
        let shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move { heartbeat.run(heartbeat_interval, shutdown_rx).await });

        let gateway = Arc::clone(&self.gateway);
        let connector = Arc::clone(&self.connector);
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                {
                    let guard = connector.lock().await;
                    gateway.run_once(&guard).await;
                }
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        let registry = Arc::clone(&self.registry);
        let connector = Arc::clone(&self.connector);
        tokio::spawn(async move {
            loop {
                let event = {
                    let mut guard = connector.lock().await;
                    guard.next_order_event().await
                };
                match event {
                    Some(event) => registry.apply_order_event(event),
                    None => return,
                }
            }
        });

        info!("orchestrator background tasks spawned");
    }

    /// Signals every background task to drain, gives them
    /// `shutdown_grace_window` to finish in-flight work, then triggers the
    /// close protocol for every strategy still active.
    pub async fn shutdown(self: &Arc<Self>) {
        let _ = self.shutdown_tx.send(true);
        tokio::time::sleep(self.runtime_config.shutdown_grace_window).await;

        let ids = self.registry.list_ids();
        let connector = self.connector.lock().await;
        for id in ids {
            if self.registry.status(id) == Some(crate::models::StrategyStatus::Active) {
                if let Err(e) = self.close_protocol.close(id, &connector, true, true).await {
                    tracing::warn!(%id, error = %e, "close protocol failed during shutdown");
                }
            }
        }
    }
}
