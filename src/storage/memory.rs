//! Cache stores held in process memory.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::CacheStorage;
use crate::error::{Error, Result};
use crate::request::{CacheKey, Request, Response};

type Store = BTreeMap<CacheKey, Response>;

/// Cache stores held in process memory.
///
/// Nothing survives the process; useful for tests and for hosts that only
/// need a warm cache for their own lifetime.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Stores in creation order.
    stores: Mutex<Vec<(String, Store)>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, Store)>> {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut stores = self.lock();
        if !stores.iter().any(|(n, _)| n == name) {
            stores.push((name.to_string(), Store::new()));
        }
        Ok(())
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        let mut stores = self.lock();
        let (_, store) = stores
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))?;
        store.insert(request.key(), response.clone());
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
        // Single lock so a batch is never observed half-written.
        let mut stores = self.lock();
        let (_, store) = stores
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))?;
        for (request, response) in entries {
            store.insert(request.key(), response.clone());
        }
        Ok(())
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        let key = request.key();
        let stores = self.lock();
        Ok(stores.iter().find_map(|(_, store)| store.get(&key).cloned()))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut stores = self.lock();
        let before = stores.len();
        stores.retain(|(n, _)| n != name);
        Ok(stores.len() != before)
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        let stores = self.lock();
        stores
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, store)| store.keys().cloned().collect())
            .ok_or_else(|| Error::StoreNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.open("v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn keys_are_in_creation_order() {
        let storage = MemoryStorage::new();
        storage.open("v2").await.unwrap();
        storage.open("v0").await.unwrap();
        storage.open("v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["v2", "v0", "v1"]);
    }

    #[tokio::test]
    async fn put_requires_open_store() {
        let storage = MemoryStorage::new();
        let err = storage
            .put("missing", &Request::get("/"), &Response::ok("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.put("v1", &Request::get("/"), &Response::ok("old")).await.unwrap();
        storage.put("v1", &Request::get("/"), &Response::ok("new")).await.unwrap();

        assert_eq!(storage.entries("v1").await.unwrap().len(), 1);
        let hit = storage.match_request(&Request::get("/")).await.unwrap().unwrap();
        assert_eq!(hit.body, "new");
    }

    #[tokio::test]
    async fn match_prefers_earliest_store() {
        let storage = MemoryStorage::new();
        storage.open("v0").await.unwrap();
        storage.open("v1").await.unwrap();
        storage.put("v1", &Request::get("/"), &Response::ok("newer")).await.unwrap();
        storage.put("v0", &Request::get("/"), &Response::ok("older")).await.unwrap();

        let hit = storage.match_request(&Request::get("/")).await.unwrap().unwrap();
        assert_eq!(hit.body, "older");
    }

    #[tokio::test]
    async fn match_ignores_request_headers() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.put("v1", &Request::get("/app.js"), &Response::ok("js")).await.unwrap();

        let request = Request::get("/app.js").with_header("Accept", "*/*");
        assert!(storage.match_request(&request).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let storage = MemoryStorage::new();
        storage.open("v0").await.unwrap();
        assert!(storage.delete("v0").await.unwrap());
        assert!(!storage.delete("v0").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_of_missing_store_is_error() {
        let storage = MemoryStorage::new();
        assert!(storage.entries("nope").await.is_err());
    }
}
