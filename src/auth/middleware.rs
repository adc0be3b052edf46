//! Dual-credential auth middleware (spec.md §4.G): an `x-admin-token`
//! header matching the configured secret, or a wallet-signature triple
//! (`x-wallet-address` / `x-auth-message` / `x-auth-signature`) recovered
//! with `ethers-core`. `x-auth-message` is base64 of a plaintext challenge
//! containing a `Wallet: 0x…` line and a `Timestamp: <ms>` line.

use crate::auth::models::AuthContext;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ethers_core::types::{Address, Signature};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AuthConfig {
    pub admin_token: Option<String>,
    pub timestamp_freshness_window: Option<Duration>,
}

pub async fn auth_middleware(
    State(config): State<Arc<AuthConfig>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let headers = req.headers().clone();

    if let Some(expected) = &config.admin_token {
        if let Some(provided) = headers.get("x-admin-token").and_then(|v| v.to_str().ok()) {
            if provided == expected {
                req.extensions_mut().insert(AuthContext::Admin);
                return Ok(next.run(req).await);
            }
        }
    }

    let address = headers
        .get("x-wallet-address")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;
    let message_b64 = headers
        .get("x-auth-message")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;
    let signature = headers
        .get("x-auth-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredential)?;

    let message_bytes = BASE64
        .decode(message_b64)
        .map_err(|_| AuthError::InvalidSignature)?;
    let message = String::from_utf8(message_bytes).map_err(|_| AuthError::InvalidSignature)?;

    if let Some(window) = config.timestamp_freshness_window {
        check_freshness(&message, window)?;
    }

    let claimed: Address = address.parse().map_err(|_| AuthError::InvalidSignature)?;
    let sig = Signature::from_str(signature.trim_start_matches("0x"))
        .map_err(|_| AuthError::InvalidSignature)?;
    let recovered = sig
        .recover(message.as_str())
        .map_err(|_| AuthError::InvalidSignature)?;

    if recovered != claimed {
        return Err(AuthError::InvalidSignature);
    }

    req.extensions_mut().insert(AuthContext::Wallet {
        address: format!("{:?}", recovered),
    });
    Ok(next.run(req).await)
}

/// The decoded challenge carries a `Timestamp: <unix_millis>` line; reject
/// stale or future-dated challenges outside the configured window.
fn check_freshness(message: &str, window: Duration) -> Result<(), AuthError> {
    let ts_ms: i64 = message
        .lines()
        .find_map(|line| line.strip_prefix("Timestamp:"))
        .and_then(|v| v.trim().parse().ok())
        .ok_or(AuthError::InvalidSignature)?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let delta_ms = (now_ms - ts_ms).abs();
    if delta_ms > window.as_millis() as i64 {
        return Err(AuthError::StaleChallenge);
    }
    Ok(())
}

pub fn extract_auth_context(req: &Request) -> Option<&AuthContext> {
    req.extensions().get::<AuthContext>()
}

#[derive(Debug)]
pub enum AuthError {
    MissingCredential,
    InvalidSignature,
    StaleChallenge,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingCredential => (
                StatusCode::UNAUTHORIZED,
                "missing x-admin-token or wallet-signature headers",
            ),
            AuthError::InvalidSignature => (StatusCode::UNAUTHORIZED, "signature does not recover to the claimed address"),
            AuthError::StaleChallenge => (StatusCode::UNAUTHORIZED, "signed challenge is outside the freshness window"),
        };
        (status, message).into_response()
    }
}
