//! Failure taxonomy and the uniform JSON error envelope.
//!
//! Only the fixed `public_message` of each variant ever reaches a client; the
//! variant payloads carry diagnostic detail that is logged and dropped.
use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::{core::token_validator::AuthError, ports::http_client::HttpClientError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches the request")]
    RouteNotFound,

    #[error("rate limit exceeded for client {client}")]
    RateLimitExceeded { client: String },

    #[error("missing or malformed Authorization header")]
    MissingOrMalformedToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::MissingOrMalformedToken | GatewayError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BackendError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound => "Resource not found",
            GatewayError::RateLimitExceeded { .. } => "Rate limit exceeded",
            GatewayError::MissingOrMalformedToken => "Missing or invalid Authorization header",
            GatewayError::InvalidToken(_) => "Invalid or expired token",
            GatewayError::BackendUnavailable(_) => "Service temporarily unavailable",
            GatewayError::BackendError(_) => "Service unavailable",
            GatewayError::Internal(_) => "An error occurred processing your request",
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingOrMalformed => GatewayError::MissingOrMalformedToken,
            AuthError::Invalid(detail) => GatewayError::InvalidToken(detail),
        }
    }
}

impl From<HttpClientError> for GatewayError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::Unavailable(_) | HttpClientError::Timeout(_) => {
                GatewayError::BackendUnavailable(err.to_string())
            }
            HttpClientError::InvalidRequest(_) => GatewayError::Internal(err.to_string()),
            HttpClientError::Transport(_) => GatewayError::BackendError(err.to_string()),
        }
    }
}

/// Body of every gateway-generated error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub path: String,
    pub status: u16,
}

/// Log `err` with the request path and map it to a status and envelope.
pub fn normalize(err: &GatewayError, path: &str) -> (StatusCode, ErrorEnvelope) {
    let status = err.status();

    if status.is_server_error() {
        tracing::error!(path, status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::warn!(path, status = status.as_u16(), error = %err, "Request rejected");
    }

    let envelope = ErrorEnvelope {
        success: false,
        message: err.public_message().to_string(),
        path: path.to_string(),
        status: status.as_u16(),
    };
    (status, envelope)
}

/// Render `err` as a JSON error response for `path`.
pub fn error_response(err: &GatewayError, path: &str) -> Response {
    let (status, envelope) = normalize(err, path);
    (status, Json(envelope)).into_response()
}
