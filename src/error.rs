//! Error types for fedlogin.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Primary error type for all fedlogin operations.
///
/// `NotFound` on a remember-me lookup is the single expected, recoverable
/// error; the middleware degrades it to an anonymous request. Everything else
/// aborts the current request chain.
#[derive(Debug, Error)]
pub enum FedError {
    /// Remote host metadata unreachable or missing required links.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Any OAuth-style exchange failure against a remote host.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Remote profile missing required federation links.
    #[error("Identity rejected: {0}")]
    Identity(String),

    /// Malformed local input; programmer error, fail fast.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Guard failure, stale session, or failed remember-me redemption.
    #[error("Auth error: {0}")]
    Auth(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FedError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Discovery(_) | Self::Handshake(_) | Self::Identity(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<toml::de::Error> for FedError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}

impl IntoResponse for FedError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, FedError>;
