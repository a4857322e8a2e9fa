//! Errors raised by the relay itself, as opposed to error responses returned by the upstream.
//!
//! Upstream error responses are relayed untouched (see [`crate::forward::relay`]); only failures
//! the relay originates are wrapped in an [`ErrorEnvelope`].
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("invalid upstream URI: {0}")]
    InvalidUri(String),
    #[error("upstream request failed: {0}")]
    Transport(#[source] BoxError),
    #[error("failed to read upstream response body: {0}")]
    Body(#[source] axum::Error),
    #[error("upstream returned malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(#[source] serde_json::Error),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Relay error: {}", self);
        }
        (status, Json(ErrorEnvelope::from_error(&self))).into_response()
    }
}

/// The JSON body returned when the relay itself fails to complete a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            stack: None,
        }
    }

    /// Builds an envelope whose `stack` lists the error's source chain, one cause per line.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            error: err.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_lists_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = RelayError::Transport(Box::new(io));
        let envelope = ErrorEnvelope::from_error(&err);

        assert_eq!(envelope.error, "upstream request failed: connection refused");
        assert_eq!(envelope.stack.as_deref(), Some("caused by: connection refused"));
    }

    #[test]
    fn test_envelope_without_source_omits_stack() {
        let err = RelayError::InvalidUri("relative URL without a base".into());
        let envelope = ErrorEnvelope::from_error(&err);
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["error"], "invalid upstream URI: relative URL without a base");
        assert!(json.get("stack").is_none());
    }

    #[test]
    fn test_status_codes() {
        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            RelayError::InvalidBody(bad_json).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::Transport("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
