//! Control-plane authentication (spec.md §4.G): admin token or wallet
//! signature, never usernames/passwords or JWTs.

pub mod middleware;
pub mod models;

pub use middleware::{auth_middleware, extract_auth_context, AuthConfig, AuthError};
pub use models::AuthContext;
