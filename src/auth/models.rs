//! Auth models (spec.md §4.G): the control plane accepts either a static
//! admin token or a wallet-signature challenge, never a username/password.

use serde::{Deserialize, Serialize};

/// Wallet-signature auth headers, verified via personal-sign recovery.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletAuthHeaders {
    pub address: String,
    pub message: String,
    pub signature: String,
}

/// Which credential authenticated the caller, attached to the request for
/// handlers that need to know (e.g. close protocol ownership checks).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthContext {
    Admin,
    Wallet { address: String },
}
