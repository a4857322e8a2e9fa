//! The single-hop forward: build the upstream request, send it, read the reply, and decide what the
//! caller gets back.
use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, Method, Request, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::de::IgnoredAny;
use tracing::{debug, error};

use crate::client::HttpClient;
use crate::errors::RelayError;
use crate::models::VersionInfo;
use crate::upstream::{Endpoint, Upstream};

const APPLICATION_JSON: &str = "application/json";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Status and fully-read body of an upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamReply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request to `endpoint`. A JSON body is attached for POSTs; no caller headers travel
/// upstream besides the content type.
pub async fn forward<T: HttpClient>(
    client: &T,
    upstream: &Upstream,
    endpoint: Endpoint,
    json_body: Option<Bytes>,
) -> Result<UpstreamReply, RelayError> {
    let uri = upstream.uri(endpoint)?;
    let request = match json_body {
        Some(body) => Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))
            .body(Body::from(body))?,
        None => Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())?,
    };

    debug!("Forwarding {} {}", request.method(), request.uri());
    let response = client
        .request(request)
        .await
        .map_err(RelayError::Transport)?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(RelayError::Body)?;

    Ok(UpstreamReply { status, body })
}

/// Turns an upstream reply into the caller's response.
///
/// Non-success statuses are passed through with the raw upstream text. Successful replies must be
/// JSON and are returned byte-for-byte; anything else counts as a relay failure.
pub fn relay(reply: UpstreamReply) -> Result<Response, RelayError> {
    if !reply.status.is_success() {
        error!(
            "Upstream error {}: {}",
            reply.status,
            String::from_utf8_lossy(&reply.body)
        );
        return Ok((reply.status, [(CONTENT_TYPE, TEXT_PLAIN)], reply.body).into_response());
    }

    serde_json::from_slice::<IgnoredAny>(&reply.body).map_err(RelayError::MalformedJson)?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, APPLICATION_JSON)],
        reply.body,
    )
        .into_response())
}

/// Outcome of asking the upstream for its version.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionCheck {
    Reachable(VersionInfo),
    Rejected { status: StatusCode, body: String },
}

pub async fn check_version<T: HttpClient>(
    client: &T,
    upstream: &Upstream,
) -> Result<VersionCheck, RelayError> {
    let reply = forward(client, upstream, Endpoint::Version, None).await?;
    if !reply.status.is_success() {
        return Ok(VersionCheck::Rejected {
            status: reply.status,
            body: reply.text(),
        });
    }
    let info = serde_json::from_slice(&reply.body).map_err(RelayError::MalformedJson)?;
    Ok(VersionCheck::Reachable(info))
}
