/// Axum handlers for the relay routes
use crate::AppState;
use crate::client::HttpClient;
use crate::errors::RelayError;
use crate::forward::{self, VersionCheck};
use crate::models::{EchoResponse, StatusResponse, UpstreamHealth};
use crate::upstream::Endpoint;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::de::Error as _;
use serde_json::{Map, Value, map::Entry};
use tracing::{debug, error, info, instrument};

const EMPTY_OBJECT: &[u8] = b"{}";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with(FORM_URLENCODED))
}

/// Decodes a form body into a JSON object. Values stay strings; a key repeated in the form
/// becomes an array of its values.
fn form_to_json(body: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        let value = Value::String(value.into_owned());
        match map.entry(key.into_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(mut entry) => match entry.get_mut() {
                Value::Array(values) => values.push(value),
                existing => *existing = Value::Array(vec![existing.take(), value]),
            },
        }
    }
    map
}

/// Parses an inbound body into a JSON object or array. An empty body counts as `{}` and a
/// form-encoded body is decoded with [`form_to_json`]; any other body must be JSON whose top
/// level is an object or an array.
fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, RelayError> {
    if body.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    if is_form(headers) {
        return Ok(Value::Object(form_to_json(body)));
    }
    let value: Value = serde_json::from_slice(body).map_err(RelayError::InvalidBody)?;
    if !(value.is_object() || value.is_array()) {
        return Err(RelayError::InvalidBody(serde_json::Error::custom(
            "top-level value must be an object or an array",
        )));
    }
    Ok(value)
}

/// Forwards a generate request to the upstream. JSON bodies are sent on exactly as received;
/// form bodies are re-encoded as the equivalent JSON object.
#[instrument(skip(state, headers, body))]
pub async fn generate<T: HttpClient>(
    State(state): State<AppState<T>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let payload = parse_body(&headers, &body)?;
    let model = payload.get("model").and_then(Value::as_str).unwrap_or("");
    info!("Received generate request for model: {}", model);

    let body = if body.is_empty() {
        Bytes::from_static(EMPTY_OBJECT)
    } else if is_form(&headers) {
        Bytes::from(serde_json::to_vec(&payload).map_err(RelayError::InvalidBody)?)
    } else {
        body
    };

    let reply = forward::forward(
        &state.http_client,
        &state.upstream,
        Endpoint::Generate,
        Some(body),
    )
    .await?;
    info!("Upstream generate response status: {}", reply.status);
    forward::relay(reply)
}

#[instrument(skip(state))]
pub async fn tags<T: HttpClient>(State(state): State<AppState<T>>) -> Result<Response, RelayError> {
    info!("Fetching model tags from upstream");
    let reply =
        forward::forward(&state.http_client, &state.upstream, Endpoint::Tags, None).await?;
    info!("Upstream tags response status: {}", reply.status);
    forward::relay(reply)
}

/// Reports whether the upstream answers its version endpoint. Every failure maps to 503.
#[instrument(skip(state))]
pub async fn check_upstream<T: HttpClient>(State(state): State<AppState<T>>) -> Response {
    info!("Checking upstream server status");
    match forward::check_version(&state.http_client, &state.upstream).await {
        Ok(VersionCheck::Reachable(info)) => {
            Json(UpstreamHealth::running(info.version)).into_response()
        }
        Ok(VersionCheck::Rejected { status, body }) => {
            error!("Upstream version check returned {}", status);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(UpstreamHealth::rejected(status.as_u16(), body)),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to connect to upstream: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(UpstreamHealth::unreachable(e.to_string())),
            )
                .into_response()
        }
    }
}

#[instrument(skip(state))]
pub async fn status<T: HttpClient>(State(state): State<AppState<T>>) -> Json<StatusResponse> {
    Json(StatusResponse::now(state.upstream.display_url()))
}

#[instrument(skip(headers, body))]
pub async fn echo(headers: HeaderMap, body: Bytes) -> Result<Json<EchoResponse>, RelayError> {
    let received = parse_body(&headers, &body)?;
    debug!("Echo request received: {}", received);
    Ok(Json(EchoResponse::new(received, &headers)))
}
