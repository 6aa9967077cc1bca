//! Protocol client boundary
//!
//! Workers only need a status outcome, a latency and whether a body came
//! back. Transport failures are outcomes too: they come back with no status.

use crate::error::ProtocolError;
use crate::workload::{HttpMethod, Operation};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Result of invoking one operation
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutcome {
    /// HTTP status, absent when the request never completed
    pub status: Option<u16>,
    pub duration: Duration,
    pub body_present: bool,
    /// Transport error description when `status` is absent
    pub error: Option<String>,
}

impl InvokeOutcome {
    pub fn response(status: u16, duration: Duration, body_present: bool) -> Self {
        Self {
            status: Some(status),
            duration,
            body_present,
            error: None,
        }
    }

    pub fn transport_error(duration: Duration, error: impl Into<String>) -> Self {
        Self {
            status: None,
            duration,
            body_present: false,
            error: Some(error.into()),
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Executes operations against the target service
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn invoke(&self, operation: &Operation) -> InvokeOutcome;
}

/// HTTP implementation backed by a pooled reqwest client
pub struct HttpProtocolClient {
    client: Client,
    base_url: Url,
}

impl HttpProtocolClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProtocolError> {
        let base_url = Url::parse(base_url).map_err(|source| ProtocolError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Operation paths are appended to the service URL, keeping any prefix
    /// such as `http://host/lms`
    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

#[async_trait]
impl ProtocolClient for HttpProtocolClient {
    async fn invoke(&self, operation: &Operation) -> InvokeOutcome {
        let started = Instant::now();

        let url = match self.endpoint(&operation.path) {
            Ok(url) => url,
            Err(e) => return InvokeOutcome::transport_error(started.elapsed(), e.to_string()),
        };

        let method = match operation.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut request = self.client.request(method, url);
        if let Some(body) = &operation.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return InvokeOutcome::transport_error(started.elapsed(), e.to_string()),
        };

        let status = response.status().as_u16();
        // Latency includes reading the body, as a client would experience it
        match response.bytes().await {
            Ok(body) => InvokeOutcome::response(status, started.elapsed(), !body.is_empty()),
            Err(e) => {
                debug!(operation = %operation.name, error = %e, "Failed to read response body");
                InvokeOutcome::response(status, started.elapsed(), false)
            }
        }
    }
}
