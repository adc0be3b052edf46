//! End to end: a pure market-making strategy quotes a ladder around the
//! book mid, then reprices it once the mid moves past the diff tolerance,
//! cancelling the stale rungs and creating fresh ones rather than
//! reprinting the whole ladder.

mod support;

use chrono::Utc;
use hive_orchestrator::gateway::OrderGateway;
use hive_orchestrator::market_data::{BookLevel, Channel, MarketBookSnapshot, MarketDataHub};
use hive_orchestrator::models::{
    OrderSide, PmmParams, PositionMode, StrategyConfig, StrategyParameters, StrategyStatus,
    StrategyType,
};
use hive_orchestrator::registry::{Store, StrategyRegistry};
use hive_orchestrator::risk::AccountHealthGate;
use hive_orchestrator::strategy::{RiskLimits, StrategyHost};
use std::sync::Arc;
use std::time::Duration;

fn pmm_config() -> StrategyConfig {
    StrategyConfig {
        id: uuid::Uuid::new_v4(),
        name: "btc-pmm".into(),
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

fn book_at(mid: f64) -> MarketBookSnapshot {
    MarketBookSnapshot {
        symbol: "BTC-USD".into(),
        best_bid: Some(BookLevel {
            price: mid - 0.01,
            size: 5.0,
        }),
        best_ask: Some(BookLevel {
            price: mid + 0.01,
            size: 5.0,
        }),
        last_trade: Some(mid),
        depth: vec![],
        last_update_ts: Utc::now(),
        stale: false,
    }
}

#[tokio::test]
async fn ladder_reprices_only_when_mid_moves_past_tolerance() {
    let (base_url, venue) = support::spawn_stub_venue().await;
    let registry = StrategyRegistry::new(Arc::new(Store::in_memory().unwrap()));
    let hub = MarketDataHub::new(Duration::from_secs(10));
    let gateway = OrderGateway::new(1_000, 64);
    let connector = Arc::new(tokio::sync::Mutex::new(support::test_connector(base_url, hub.clone())));
    let health_gate = AccountHealthGate {
        max_leverage: 20,
        min_available_margin: 0.0,
    };
    let host = StrategyHost::new(
        registry.clone(),
        hub.clone(),
        gateway.clone(),
        RiskLimits::default(),
        health_gate,
        connector.clone(),
        chrono::Duration::seconds(30),
    );

    let config = pmm_config();
    let id = registry.register(config).unwrap();
    registry.mark_status(id, StrategyStatus::Active).unwrap();
    let _sub = hub.subscribe(id, "BTC-USD", Channel::L2Book);
    hub.publish("BTC-USD", book_at(100.00));

    host.on_tick(id).await.unwrap();

    let first_tick: Vec<(OrderSide, f64)> = registry
        .with_runtime(id, |rt| {
            let mut orders: Vec<_> = rt.live_orders.values().map(|o| (o.side, o.price)).collect();
            orders.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            orders
        })
        .unwrap();
    assert_eq!(first_tick.len(), 2);
    assert_eq!(first_tick[0].0, OrderSide::Buy);
    assert!((first_tick[0].1 - 99.80).abs() < 1e-6);
    assert_eq!(first_tick[1].0, OrderSide::Sell);
    assert!((first_tick[1].1 - 100.20).abs() < 1e-6);

    for _ in 0..4 {
        let guard = connector.lock().await;
        gateway.run_once(&guard).await;
    }
    assert_eq!(venue.creates(), 2);
    assert_eq!(venue.cancels(), 0);

    hub.publish("BTC-USD", book_at(100.10));
    host.on_tick(id).await.unwrap();

    for _ in 0..8 {
        let guard = connector.lock().await;
        gateway.run_once(&guard).await;
    }
    assert_eq!(venue.cancels(), 2);
    assert_eq!(venue.creates(), 4);

    let live_prices: Vec<f64> = registry
        .with_runtime(id, |rt| {
            rt.live_orders
                .values()
                .filter(|o| !o.state.is_terminal())
                .map(|o| o.price)
                .collect()
        })
        .unwrap();
    assert!(live_prices.iter().any(|p| (p - 99.90).abs() < 1e-6));
    assert!(live_prices.iter().any(|p| (p - 100.30).abs() < 1e-6));
}
