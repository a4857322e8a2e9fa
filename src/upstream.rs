/// The upstream is the single Ollama server every proxied request is forwarded to. Its base URL is
/// fixed at startup; each relay route maps onto one path beneath it.
use axum::http::Uri;
use url::Url;

use crate::errors::RelayError;

pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:11434";

/// The upstream API paths the relay knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Generate,
    Tags,
    Version,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Generate => "api/generate",
            Endpoint::Tags => "api/tags",
            Endpoint::Version => "api/version",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Upstream {
    base: Url,
}

impl Upstream {
    /// Wraps a base URL. A base with a path prefix (`http://host/ollama`) keeps that prefix when
    /// endpoints are joined onto it.
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base }
    }

    /// The base URL as callers configured it, without the trailing slash we add for joining.
    pub fn display_url(&self) -> String {
        self.base.as_str().trim_end_matches('/').to_string()
    }

    pub fn uri(&self, endpoint: Endpoint) -> Result<Uri, RelayError> {
        let joined = self
            .base
            .join(endpoint.path())
            .map_err(|e| RelayError::InvalidUri(e.to_string()))?;
        Uri::try_from(joined.as_str()).map_err(|e| RelayError::InvalidUri(e.to_string()))
    }
}

impl Default for Upstream {
    fn default() -> Self {
        Self::new(
            DEFAULT_UPSTREAM_URL
                .parse()
                .expect("default upstream URL is valid"),
        )
    }
}
