//! A recording [`HttpClient`] for exercising the relay without a running upstream.
use crate::client::HttpClient;
use crate::errors::BoxError;
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ResponseBuilder = dyn Fn() -> Result<axum::response::Response, BoxError> + Send + Sync;

pub struct MockHttpClient {
    pub requests: Arc<Mutex<Vec<MockRequest>>>,
    response_builder: Arc<ResponseBuilder>,
    delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockHttpClient {
    /// Answers every request with `status` and `body`.
    pub fn new(status: StatusCode, body: &str) -> Self {
        let body = body.to_string();
        Self::from_builder(move || {
            Ok(axum::response::Response::builder()
                .status(status)
                .body(axum::body::Body::from(body.clone()))
                .unwrap())
        })
    }

    /// Fails every request at the transport level, as an unreachable upstream would.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::from_builder(move || Err(message.clone().into()))
    }

    /// Panics while handling every request.
    pub fn panicking(message: &'static str) -> Self {
        Self::from_builder(move || panic!("{}", message))
    }

    /// Holds each response back for `delay` before returning it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn from_builder(
        builder: impl Fn() -> Result<axum::response::Response, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_builder: Arc::new(builder),
            delay: None,
        }
    }

    pub fn get_requests(&self) -> Vec<MockRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("requests", &self.requests)
            .field("response_builder", &"<closure>")
            .field("delay", &self.delay)
            .finish()
    }
}

impl Clone for MockHttpClient {
    fn clone(&self) -> Self {
        Self {
            requests: Arc::clone(&self.requests),
            response_builder: Arc::clone(&self.response_builder),
            delay: self.delay,
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, BoxError> {
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let headers = req
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .map_err(|e| Box::new(e) as BoxError)?
            .to_vec();

        self.requests.lock().unwrap().push(MockRequest {
            method,
            uri,
            headers,
            body,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.response_builder)()
    }
}
