//! Network abstraction used for pre-caching and cache misses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Abstraction over the host's network fetch.
///
/// Implementations return non-success statuses as ordinary responses; only
/// transport failures are errors.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request and returns whatever the server answered.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        (**self).fetch(request).await
    }
}

/// Builds a configured HTTP client for asset requests.
fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Network implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Option<Url>,
}

impl HttpNetwork {
    /// Creates a network with a fresh client.
    ///
    /// # Errors
    ///
    /// Returns an error if `origin` is not an absolute URL or the client
    /// cannot be built.
    pub fn new(origin: Option<&str>) -> Result<Self> {
        let origin = origin.map(parse_origin).transpose()?;
        Ok(Self::with_client(build_http_client()?, origin))
    }

    /// Creates a network around an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client, origin: Option<Url>) -> Self {
        Self { client, origin }
    }

    /// Resolves a request URL, joining relative URLs onto the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for relative URLs when no origin is
    /// configured, or when joining fails.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }
        let origin = self.origin.as_ref().ok_or_else(|| Error::InvalidUrl {
            url: url.to_string(),
            reason: "relative URL without a configured origin".to_string(),
        })?;
        origin.join(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

fn parse_origin(origin: &str) -> Result<Url> {
    Url::parse(origin).map_err(|e| Error::InvalidUrl {
        url: origin.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = self.resolve(request.url())?;
        let method = reqwest::Method::from_bytes(request.method().as_bytes())
            .map_err(|_| Error::InvalidMethod(request.method().to_string()))?;

        let mut builder = self.client.request(method, url);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        log::debug!("Network {} {} -> {}", request.method(), request.url(), status.as_u16());

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
