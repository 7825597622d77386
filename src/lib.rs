//! precache - an offline cache agent for a small static site.
//!
//! On install the agent pre-caches a fixed asset list into a named cache
//! store, on fetch it answers from any store before falling back to the
//! network, and on activate it deletes every store left by an older cache
//! name. Storage and network are traits so the agent can run against
//! memory, disk, a real HTTP client, or test doubles.
//!
//! # Example
//!
//! ```no_run
//! use precache::{
//!     AgentConfig, CacheAgent, DiskStorage, HttpNetwork, Registration, Request,
//! };
//!
//! # async fn example() -> precache::Result<()> {
//! let config = AgentConfig::new()
//!     .with_cache_name("v1")
//!     .with_asset_urls(["/", "index.html"])
//!     .with_origin("http://localhost:8000");
//!
//! let network = HttpNetwork::new(config.origin.as_deref())?;
//! let agent = CacheAgent::new(config, DiskStorage::new("/tmp/precache"), network)?;
//!
//! let registration = Registration::new(agent);
//! registration.install().await?;
//! registration.activate().await?;
//!
//! let outcome = registration.fetch(Request::get("index.html")).await?;
//! println!("{} from {}", outcome.response.status, outcome.source);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod agent;
pub mod config;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod network;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// Re-export main types for convenience
pub use agent::{ActivationReport, CacheAgent, FetchOutcome, LifecycleHandler, ResponseSource};
pub use config::{AgentConfig, AppConfig, PathConfig, ServerConfig};
pub use error::{Error, Result};
pub use format::{describe_outcome, describe_store, format_bytes, format_elapsed};
pub use lifecycle::{LifecycleState, Registration};
pub use network::{HttpNetwork, Network};
pub use request::{CacheKey, Request, Response};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage};
