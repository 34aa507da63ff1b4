//! HTTP/HTTPS transport for esrest
//! Sends fully formed requests and buffers the response body in memory

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Request};
use std::time::Duration;

use super::error::Error;
use super::response::Response;

/// Deadline applied to a request when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for a whole request; `Duration::ZERO` disables it
    pub timeout: Duration,
    pub user_agent: String,
    pub gzip: bool,
    pub brotli: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("esrest/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
        }
    }
}

/// Anything able to send a request and hand back a buffered response.
///
/// [`HttpClient`] is the production implementation; tests and callers with
/// their own stack can provide another one through
/// [`RequestBuilder::transport`](super::request::RequestBuilder::transport).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, Error>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: ClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self, Error> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, value);
        } else {
            log::warn!("⚠️ Ignoring invalid user agent: {:?}", config.user_agent);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .gzip(config.gzip)
            .brotli(config.brotli);
        // A zero timeout means no deadline.
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }
        let client = builder.build().map_err(Error::Client)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        log::debug!("🌐 {} request to: {}", request.method(), request.url());

        let response = self.client.execute(request).await.map_err(Error::Transport)?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let url = response.url().clone();

        let body = response.bytes().await.map_err(Error::Transport)?.to_vec();

        log::debug!("✅ Response received: {} bytes, status: {}", body.len(), status);

        Ok(Response::new(status, version, headers, url, body))
    }
}
