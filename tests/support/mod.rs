//! Shared end-to-end scaffolding: an in-process stand-in for the venue's
//! REST surface that accepts any signed request and always answers 200,
//! plus a helper for wiring a real `ExchangeConnector` against it. The WS
//! leg is pointed at an address nothing listens on — `WsClient::run` only
//! retries quietly in the background, so it never blocks these tests.

use axum::extract::State;
use axum::routing::{delete, post};
use axum::Router;
use hive_orchestrator::connector::{DelegatedKey, ExchangeConnector, InstrumentMeta};
use hive_orchestrator::market_data::MarketDataHub;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct StubVenue {
    pub creates: AtomicUsize,
    pub cancels: AtomicUsize,
    pub cancel_alls: AtomicUsize,
    pub client_order_ids: Mutex<Vec<String>>,
}

impl StubVenue {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn cancel_alls(&self) -> usize {
        self.cancel_alls.load(Ordering::SeqCst)
    }

    pub fn client_order_ids(&self) -> Vec<String> {
        self.client_order_ids.lock().unwrap().clone()
    }
}

async fn place_order(State(venue): State<Arc<StubVenue>>, body: String) -> &'static str {
    venue.creates.fetch_add(1, Ordering::SeqCst);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(id) = value.get("clientOrderId").and_then(|v| v.as_str()) {
            venue.client_order_ids.lock().unwrap().push(id.to_string());
        }
    }
    "ok"
}

async fn cancel_order(State(venue): State<Arc<StubVenue>>) -> &'static str {
    venue.cancels.fetch_add(1, Ordering::SeqCst);
    "ok"
}

async fn cancel_all(State(venue): State<Arc<StubVenue>>) -> &'static str {
    venue.cancel_alls.fetch_add(1, Ordering::SeqCst);
    "ok"
}

/// Starts the stub venue on an ephemeral localhost port and returns its
/// base URL alongside the shared counters the caller asserts against.
pub async fn spawn_stub_venue() -> (String, Arc<StubVenue>) {
    let venue = Arc::new(StubVenue::default());
    let app = Router::new()
        .route("/order", post(place_order).delete(cancel_order))
        .route("/orders", delete(cancel_all))
        .with_state(venue.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}"), venue)
}

/// A connector pointed at `rest_base_url` with a WS leg that can never
/// reach anything real; good enough for every test that only drives REST
/// dispatch through the gateway/close protocol.
pub fn test_connector(rest_base_url: String, hub: Arc<MarketDataHub>) -> ExchangeConnector {
    let key = DelegatedKey::new("0xtest-main".into(), "test-agent-secret".into());
    let meta = InstrumentMeta {
        tick_size: 0.01,
        lot_size: 0.001,
    };
    ExchangeConnector::connect(
        rest_base_url,
        "ws://127.0.0.1:1/ws".to_string(),
        key,
        meta,
        hub,
    )
}
