//! Error taxonomy (spec.md §7).
//!
//! Transient venue errors are absorbed near the boundary (the connector
//! retries them internally); everything that reaches a caller here is
//! already a terminal outcome for that call.

use serde::Serialize;

/// Field-level validation failure, surfaced verbatim in HTTP responses.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl FieldError {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    #[error("config invalid")]
    ConfigInvalid { fields: Vec<FieldError> },

    #[error("venue rejected order: {reason}")]
    VenueRejected { reason: String },

    #[error("transient venue error: {reason}")]
    VenueTransient { reason: String },

    #[error("order view desynced from venue: {reason}")]
    VenueDesync { reason: String },

    #[error("strategy fault: {reason}")]
    StrategyFault { strategy_id: String, reason: String },

    #[error("close protocol did not complete: {reason}")]
    CloseFailed { strategy_id: String, reason: String },

    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("not found")]
    NotFound,

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HiveError {
    pub fn config_invalid(fields: Vec<FieldError>) -> Self {
        Self::ConfigInvalid { fields }
    }

    /// Whether a caller may safely retry the underlying request once more.
    pub fn is_retriable(&self) -> bool {
        matches!(self, HiveError::VenueTransient { .. })
    }
}

/// `{error, detail?, fields?}` — the HTTP control-plane's error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

impl HiveError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            HiveError::ConfigInvalid { .. } => StatusCode::BAD_REQUEST,
            HiveError::VenueRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            HiveError::VenueTransient { .. } => StatusCode::BAD_GATEWAY,
            HiveError::VenueDesync { .. } => StatusCode::CONFLICT,
            HiveError::StrategyFault { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            HiveError::CloseFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            HiveError::AuthFailed { .. } => StatusCode::UNAUTHORIZED,
            HiveError::NotFound => StatusCode::NOT_FOUND,
            HiveError::DuplicateName(_) => StatusCode::CONFLICT,
            HiveError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            HiveError::ConfigInvalid { fields } => ErrorBody {
                error: "config_invalid",
                detail: None,
                fields: Some(fields.clone()),
            },
            HiveError::DuplicateName(name) => ErrorBody {
                error: "duplicate_name",
                detail: Some(format!("strategy name '{name}' already registered")),
                fields: None,
            },
            other => ErrorBody {
                error: "error",
                detail: Some(other.to_string()),
                fields: None,
            },
        }
    }
}

impl axum::response::IntoResponse for HiveError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = self.body();
        (status, axum::Json(body)).into_response()
    }
}
