//! Named cache stores, abstracted over where they are persisted.

mod disk;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{CacheKey, Request, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Abstraction over the host's named cache stores.
///
/// Store names are reported in creation order, and [`match_request`]
/// consults stores in that same order.
///
/// [`match_request`]: CacheStorage::match_request
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens the named store, creating it if absent.
    async fn open(&self, name: &str) -> Result<()>;

    /// Inserts or replaces the entry for `request` in the named store.
    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

    /// Writes a batch of entries to the named store.
    async fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
        for (request, response) in entries {
            self.put(name, request, response).await?;
        }
        Ok(())
    }

    /// Returns the first stored response matching `request` across all stores.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>>;

    /// Lists store names in creation order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes the named store. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Lists the request identities held by the named store, sorted.
    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>>;
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    async fn open(&self, name: &str) -> Result<()> {
        (**self).open(name).await
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        (**self).put(name, request, response).await
    }

    async fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
        (**self).put_all(name, entries).await
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        (**self).match_request(request).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        (**self).keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        (**self).delete(name).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        (**self).entries(name).await
    }
}
