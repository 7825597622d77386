//! The cache agent: pre-caches on install, serves cache-first, purges stale
//! stores on activate.

use std::fmt;

use async_trait::async_trait;
use futures::future;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{Request, Response};
use crate::storage::CacheStorage;

/// Where a fetched response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from a cache store without touching the network.
    Cache,
    /// Forwarded to the network after a cache miss.
    Network,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Result of handling a fetch signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchOutcome {
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Result of a successful activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// The store that was kept.
    pub current: String,
    /// Stale stores removed by this activation.
    pub deleted: Vec<String>,
}

/// The three lifecycle signals a host delivers to an agent.
///
/// Each returned future settles only once the work for that phase is done;
/// the host must await it before treating the phase as complete.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    /// Handles the install signal.
    async fn on_install(&self) -> Result<()>;

    /// Handles the activate signal.
    async fn on_activate(&self) -> Result<ActivationReport>;

    /// Handles an intercepted request.
    async fn on_fetch(&self, request: Request) -> Result<FetchOutcome>;
}

/// Cache-first offline agent over a storage and a network collaborator.
pub struct CacheAgent<S: CacheStorage, N: Network> {
    config: AgentConfig,
    storage: S,
    network: N,
}

impl<S: CacheStorage, N: Network> CacheAgent<S, N> {
    /// Creates an agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn new(config: AgentConfig, storage: S, network: N) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            network,
        })
    }

    /// Returns a reference to the agent configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns a reference to the cache storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns a reference to the network collaborator.
    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    /// Fetches one asset for the bulk add, rejecting non-success statuses.
    async fn fetch_for_cache(&self, request: &Request) -> Result<Response> {
        let response = self.network.fetch(request).await?;
        if !response.is_success() {
            return Err(Error::BadStatus {
                url: request.url().to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Fetches every URL and stores the responses in the named store.
    ///
    /// Fetches run concurrently. Nothing is written unless every fetch
    /// succeeded; the first failure aborts the rest.
    async fn add_all(&self, name: &str, urls: &[String]) -> Result<()> {
        let requests: Vec<Request> = urls.iter().map(Request::get).collect();
        let responses =
            future::try_join_all(requests.iter().map(|r| self.fetch_for_cache(r))).await?;

        let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
        self.storage.put_all(name, &entries).await
    }
}

#[async_trait]
impl<S: CacheStorage, N: Network> LifecycleHandler for CacheAgent<S, N> {
    async fn on_install(&self) -> Result<()> {
        let name = &self.config.cache_name;
        self.storage.open(name).await?;
        log::info!("Opened cache {name}");

        if let Err(e) = self.add_all(name, &self.config.asset_urls).await {
            log::error!("Pre-caching into {name} failed: {e}");
            return Err(e);
        }
        log::info!("Pre-cached {} assets into {name}", self.config.asset_urls.len());
        Ok(())
    }

    async fn on_activate(&self) -> Result<ActivationReport> {
        let current = &self.config.cache_name;
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        // Every deletion is attempted before any failure is reported.
        let results = future::join_all(stale.iter().map(|name| async move {
            (name, self.storage.delete(name).await)
        }))
        .await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in results {
            match result {
                Ok(true) => {
                    log::info!("Deleted stale cache {name}");
                    deleted.push(name.clone());
                }
                Ok(false) => log::debug!("Stale cache {name} was already gone"),
                Err(e) => {
                    log::warn!("Could not delete stale cache {name}: {e}");
                    failed.push(name.clone());
                }
            }
        }

        if !failed.is_empty() {
            return Err(Error::Activation { failed });
        }
        Ok(ActivationReport {
            current: current.clone(),
            deleted,
        })
    }

    async fn on_fetch(&self, request: Request) -> Result<FetchOutcome> {
        if let Some(response) = self.storage.match_request(&request).await? {
            log::debug!("Cache hit: {}", request.key());
            return Ok(FetchOutcome {
                response,
                source: ResponseSource::Cache,
            });
        }

        log::debug!("Cache miss: {}", request.key());
        let response = self.network.fetch(&request).await?;
        Ok(FetchOutcome {
            response,
            source: ResponseSource::Network,
        })
    }
}
