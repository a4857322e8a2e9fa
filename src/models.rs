/// Response bodies the relay builds itself. Everything forwarded to or from the upstream stays an
/// opaque JSON payload and never passes through these types.
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of the upstream `/api/version` endpoint. The version is passed on as whatever JSON value
/// the upstream reports.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VersionInfo {
    pub version: Option<Value>,
}

/// Response of `/status`, a local liveness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
    /// RFC 3339 UTC time at which the response was built.
    pub timestamp: String,
    pub upstream_url: String,
}

impl StatusResponse {
    pub fn now(upstream_url: String) -> Self {
        Self {
            status: "ok".into(),
            message: "Ollama proxy server is running".into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            upstream_url,
        }
    }
}

/// Response of `/echo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoResponse {
    pub message: String,
    pub received_data: Value,
    pub headers: Map<String, Value>,
}

impl EchoResponse {
    pub fn new(received_data: Value, headers: &HeaderMap) -> Self {
        Self {
            message: "Echo successful".into(),
            received_data,
            headers: headers_to_json(headers),
        }
    }
}

/// Header names are already lowercase in a [`HeaderMap`]. Repeated headers are joined with `", "`;
/// values that are not visible ASCII are decoded lossily.
pub fn headers_to_json(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_owned(), Value::String(joined));
    }
    map
}

/// Response of `/check-ollama`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UpstreamHealth {
    Ok {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<Value>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl UpstreamHealth {
    pub fn running(version: Option<Value>) -> Self {
        UpstreamHealth::Ok {
            message: "Ollama server is running".into(),
            version,
        }
    }

    pub fn rejected(status: u16, details: String) -> Self {
        UpstreamHealth::Error {
            message: format!("Ollama server returned status {status}"),
            details: Some(details),
            error: None,
        }
    }

    pub fn unreachable(error: String) -> Self {
        UpstreamHealth::Error {
            message: "Cannot connect to Ollama server".into(),
            details: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_health_serialization() {
        assert_eq!(
            serde_json::to_value(UpstreamHealth::running(Some(json!("0.5.7")))).unwrap(),
            json!({"status": "ok", "message": "Ollama server is running", "version": "0.5.7"})
        );
        assert_eq!(
            serde_json::to_value(UpstreamHealth::rejected(500, "boom".into())).unwrap(),
            json!({
                "status": "error",
                "message": "Ollama server returned status 500",
                "details": "boom"
            })
        );
        assert_eq!(
            serde_json::to_value(UpstreamHealth::unreachable("refused".into())).unwrap(),
            json!({
                "status": "error",
                "message": "Cannot connect to Ollama server",
                "error": "refused"
            })
        );
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.insert("x-trace", HeaderValue::from_static("abc"));

        let json = headers_to_json(&headers);
        assert_eq!(json["accept"], "text/html, application/json");
        assert_eq!(json["x-trace"], "abc");
    }

    #[test]
    fn test_status_uses_camel_case() {
        let value = serde_json::to_value(StatusResponse::now("http://127.0.0.1:11434".into()))
            .unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["upstreamUrl"], "http://127.0.0.1:11434");
        assert!(
            chrono::DateTime::parse_from_rfc3339(value["timestamp"].as_str().unwrap()).is_ok()
        );
    }
}
