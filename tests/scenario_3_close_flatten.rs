//! End to end: closing a strategy with an open position runs cancel-all,
//! waits out the cancel deadline, flattens the remaining position with a
//! reduce-only market order, records the flatten outcome, and leaves the
//! strategy `Stopped` regardless of how the flatten went.

mod support;

use chrono::Utc;
use hive_orchestrator::close::CloseProtocol;
use hive_orchestrator::gateway::OrderGateway;
use hive_orchestrator::market_data::MarketDataHub;
use hive_orchestrator::models::{
    ActivityKind, PmmParams, PositionMode, StrategyConfig, StrategyParameters, StrategyStatus,
    StrategyType,
};
use hive_orchestrator::registry::{Store, StrategyRegistry};
use std::sync::Arc;
use std::time::Duration;

fn pmm_config() -> StrategyConfig {
    StrategyConfig {
        id: uuid::Uuid::new_v4(),
        name: "btc-pmm-close".into(),
        strategy_type: StrategyType::PureMarketMaking,
        connector_type: "hyperliquid".into(),
        trading_pair: "BTC-USD".into(),
        parameters: StrategyParameters::PureMarketMaking(PmmParams {
            bid_spread: 0.002,
            ask_spread: 0.002,
            order_amount: 1.0,
            order_levels: 1,
            order_refresh_time: 1.0,
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
        total_amount_quote: 10_000.0,
        enabled: true,
        owner: "0xabc".into(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn close_flattens_open_position_and_stops() {
    let (base_url, venue) = support::spawn_stub_venue().await;
    let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
    let hub = MarketDataHub::new(Duration::from_secs(10));
    let gateway = OrderGateway::new(1_000, 64);
    let connector = support::test_connector(base_url, hub);

    let config = pmm_config();
    let id = registry.register(config).unwrap();
    registry.mark_status(id, StrategyStatus::Active).unwrap();
    registry.with_runtime_mut(id, |rt| {
        rt.position.size = 0.5;
        rt.position.entry_vwap = 100.0;
    });

    let close_protocol = CloseProtocol::new(registry.clone(), gateway.clone(), Duration::from_millis(50));
    close_protocol.close(id, &connector, true, true).await.unwrap();

    // The close sequence only enqueues the cancel-all onto the gateway;
    // nothing but the gateway's own drain loop dispatches it.
    gateway.run_once(&connector).await;

    assert_eq!(registry.status(id), Some(StrategyStatus::Stopped));
    assert_eq!(venue.cancel_alls(), 1);
    assert!(venue.creates() >= 1, "flatten should have placed a reduce-only market order");

    let flatten_recorded = registry
        .with_runtime(id, |rt| {
            rt.recent_actions
                .iter()
                .any(|a| a.kind == ActivityKind::Flatten && a.success)
        })
        .unwrap();
    assert!(flatten_recorded, "expected a successful Flatten activity record");
}

#[tokio::test]
async fn close_is_idempotent_for_a_flat_position() {
    let (base_url, venue) = support::spawn_stub_venue().await;
    let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
    let hub = MarketDataHub::new(Duration::from_secs(10));
    let gateway = OrderGateway::new(1_000, 64);
    let connector = support::test_connector(base_url, hub);

    let config = pmm_config();
    let id = registry.register(config).unwrap();
    registry.mark_status(id, StrategyStatus::Active).unwrap();

    let close_protocol = CloseProtocol::new(registry.clone(), gateway.clone(), Duration::from_millis(50));
    close_protocol.close(id, &connector, true, true).await.unwrap();
    // A flat position never flattens; only cancel-all is dispatched.
    assert_eq!(venue.creates(), 0);
    assert_eq!(registry.status(id), Some(StrategyStatus::Stopped));

    // A second close on an already-stopped strategy reports the final state
    // as success rather than re-running cancel/flatten against it.
    let result = close_protocol.close(id, &connector, true, true).await;
    assert!(result.is_ok());
    assert_eq!(registry.status(id), Some(StrategyStatus::Stopped));
}

#[tokio::test]
async fn close_respects_false_cancel_and_close_position_flags() {
    let (base_url, venue) = support::spawn_stub_venue().await;
    let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
    let hub = MarketDataHub::new(Duration::from_secs(10));
    let gateway = OrderGateway::new(1_000, 64);
    let connector = support::test_connector(base_url, hub);

    let config = pmm_config();
    let id = registry.register(config).unwrap();
    registry.mark_status(id, StrategyStatus::Active).unwrap();
    registry.with_runtime_mut(id, |rt| {
        rt.position.size = 0.5;
        rt.position.entry_vwap = 100.0;
    });

    let close_protocol = CloseProtocol::new(registry.clone(), gateway.clone(), Duration::from_millis(50));
    close_protocol
        .close(id, &connector, false, false)
        .await
        .unwrap();
    gateway.run_once(&connector).await;

    assert_eq!(registry.status(id), Some(StrategyStatus::Stopped));
    assert_eq!(venue.cancel_alls(), 0, "cancelOrders:false must not cancel the ladder");
    assert_eq!(venue.creates(), 0, "closePositions:false must not flatten the position");

    let flatten_recorded = registry
        .with_runtime(id, |rt| {
            rt.recent_actions.iter().any(|a| a.kind == ActivityKind::Flatten)
        })
        .unwrap();
    assert!(!flatten_recorded, "no flatten activity should be recorded when closePositions is false");

    // Position is untouched since it was never flattened.
    let position_size = registry.with_runtime(id, |rt| rt.position.size).unwrap();
    assert!((position_size - 0.5).abs() < 1e-9);
}
