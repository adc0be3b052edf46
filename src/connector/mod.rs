//! Exchange Connector (spec.md §4.B): the one place that talks to the
//! venue, normalizing REST order entry and WS market/user streams behind
//! one interface shared by every strategy instance.

pub mod rate_limit;
pub mod rest;
pub mod types;
pub mod ws;

pub use rate_limit::{BucketConfig, EndpointRateLimiter};
pub use rest::{DelegatedKey, RestClient};
pub use types::{
    Balances, Channel, ConnectorErrorKind, InstrumentMeta, OrderAck, OrderEvent, OrderType,
    PlaceOrderRequest, Position, TimeInForce,
};
pub use ws::WsClient;

use crate::market_data::MarketDataHub;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Owns the REST leg and the long-lived WS task, and is the only handle
/// strategies and the gateway hold to the venue.
pub struct ExchangeConnector {
    rest: RestClient,
    order_events: mpsc::UnboundedReceiver<OrderEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl ExchangeConnector {
    /// Spawns the WS task against `hub` and returns a connector whose
    /// `order_events` channel carries fills/acks/cancels/rejections for the
    /// gateway to dispatch to the owning strategy.
    pub fn connect(
        rest_base_url: impl Into<String>,
        ws_url: impl Into<String>,
        key: DelegatedKey,
        meta: InstrumentMeta,
        hub: Arc<MarketDataHub>,
    ) -> Self {
        let rate_limiter = EndpointRateLimiter::new(
            BucketConfig {
                capacity: 50.0,
                refill_per_sec: 20.0,
            },
            BucketConfig {
                capacity: 10.0,
                refill_per_sec: 5.0,
            },
        );
        let rest = RestClient::new(rest_base_url, key, rate_limiter, meta);

        let (order_tx, order_events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ws_client = WsClient::new(ws_url, hub, order_tx);
        tokio::spawn(ws_client.run(shutdown_rx));

        Self {
            rest,
            order_events,
            shutdown_tx,
        }
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub async fn next_order_event(&mut self) -> Option<OrderEvent> {
        self.order_events.recv().await
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
