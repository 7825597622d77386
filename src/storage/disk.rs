//! On-disk cache stores: one directory per store, one JSON file per entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheStorage;
use crate::error::{Error, Result};
use crate::request::{CacheKey, Request, Response};

/// Metadata file written into every store directory.
const STORE_META: &str = "store.toml";

/// Extension of entry files.
const ENTRY_EXT: &str = "json";

/// Longest store directory name written as `store-<base64>`. Longer names
/// are hashed to stay well under the usual 255-byte file name limit.
const MAX_DIR_NAME: usize = 128;

/// Counter making concurrent temp file names unique within the process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StoreMeta {
    name: String,
    created: DateTime<Utc>,
}

/// A response as persisted on disk, body base64-encoded.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    method: String,
    url: String,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: String,
    stored_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(request: &Request, response: &Response) -> Self {
        Self {
            method: request.method().to_string(),
            url: request.url().to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: BASE64.encode(&response.body),
            stored_at: Utc::now(),
        }
    }

    fn key(&self) -> CacheKey {
        CacheKey {
            method: self.method.clone(),
            url: self.url.clone(),
        }
    }

    fn into_response(self) -> Result<Response> {
        let body = BASE64
            .decode(self.body.as_bytes())
            .map_err(|e| Error::CorruptEntry(format!("{} {}: {e}", self.method, self.url)))?;
        Ok(Response {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: body.into(),
        })
    }
}

/// Directory name for a store. Store names are arbitrary strings, so they
/// are encoded rather than used as paths. Names too long to encode are
/// replaced by their SHA-256; `store.toml` still records the real name.
pub(crate) fn store_dir_name(name: &str) -> String {
    let encoded = format!("store-{}", URL_SAFE_NO_PAD.encode(name));
    if encoded.len() <= MAX_DIR_NAME {
        return encoded;
    }
    let digest: String = Sha256::digest(name.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("hashed-{digest}")
}

/// Cache stores persisted under a root directory.
///
/// Layout: `<root>/store-<base64 name>/store.toml` records the store's name
/// and creation time; each entry is `<sha256 of key>.json`. Very long store
/// names use `hashed-<sha256 of name>` as the directory instead.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(store_dir_name(name))
    }

    fn entry_path(&self, name: &str, key: &CacheKey) -> PathBuf {
        self.store_dir(name)
            .join(format!("{}.{ENTRY_EXT}", key.digest()))
    }

    async fn store_exists(&self, name: &str) -> bool {
        tokio::fs::metadata(self.store_dir(name).join(STORE_META))
            .await
            .is_ok()
    }

    /// Reads every store's metadata, oldest first.
    async fn read_metas(&self) -> Result<Vec<StoreMeta>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut metas = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let meta_path = entry.path().join(STORE_META);
            let content = match tokio::fs::read_to_string(&meta_path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match toml::from_str::<StoreMeta>(&content) {
                Ok(meta) => metas.push(meta),
                Err(e) => log::warn!("Ignoring unreadable store {}: {e}", meta_path.display()),
            }
        }

        metas.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        Ok(metas)
    }

    async fn stage_and_commit(
        store: &Path,
        staging: &Path,
        entries: &[(Request, Response)],
    ) -> Result<()> {
        let mut staged = Vec::with_capacity(entries.len());
        for (request, response) in entries {
            let file = format!("{}.{ENTRY_EXT}", request.key().digest());
            let json = serde_json::to_vec_pretty(&StoredEntry::new(request, response))?;
            tokio::fs::write(staging.join(&file), &json).await?;
            staged.push(file);
        }
        for file in staged {
            tokio::fs::rename(staging.join(&file), store.join(&file)).await?;
        }
        Ok(())
    }

    async fn read_entry(path: &Path) -> Result<Option<StoredEntry>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Returns a fresh staging directory path inside `store_dir`.
fn staging_dir(store_dir: &Path) -> PathBuf {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    store_dir.join(format!(".staging-{}-{seq}", std::process::id()))
}

/// Writes `contents` to `path` via a temp file and rename.
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<()> {
        if self.store_exists(name).await {
            return Ok(());
        }
        let dir = self.store_dir(name);
        tokio::fs::create_dir_all(&dir).await?;
        let meta = StoreMeta {
            name: name.to_string(),
            created: Utc::now(),
        };
        write_atomic(&dir.join(STORE_META), toml::to_string(&meta)?.as_bytes()).await?;
        log::debug!("Created cache store {name} at {}", dir.display());
        Ok(())
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        if !self.store_exists(name).await {
            return Err(Error::StoreNotFound(name.to_string()));
        }
        let entry = StoredEntry::new(request, response);
        let json = serde_json::to_vec_pretty(&entry)?;
        write_atomic(&self.entry_path(name, &request.key()), &json).await?;
        Ok(())
    }

    /// Writes every entry into a staging directory first, then renames each
    /// file into the store. A failed write leaves the store untouched; only
    /// a failing rename, after all data is on disk, can leave it partial.
    async fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
        if !self.store_exists(name).await {
            return Err(Error::StoreNotFound(name.to_string()));
        }
        let store = self.store_dir(name);
        let staging = staging_dir(&store);
        tokio::fs::create_dir(&staging).await?;

        let result = Self::stage_and_commit(&store, &staging, entries).await;
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not remove staging directory {}: {e}", staging.display());
            }
        }
        result
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        let key = request.key();
        for meta in self.read_metas().await? {
            let path = self.entry_path(&meta.name, &key);
            if let Some(entry) = Self::read_entry(&path).await? {
                // Digest collisions are not trusted.
                if entry.key() == key {
                    return entry.into_response().map(Some);
                }
            }
        }
        Ok(None)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.read_metas().await?.into_iter().map(|m| m.name).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        if !self.store_exists(name).await {
            return Err(Error::StoreNotFound(name.to_string()));
        }
        let mut dir = tokio::fs::read_dir(self.store_dir(name)).await?;
        let mut keys = Vec::new();
        while let Some(file) = dir.next_entry().await? {
            let path = file.path();
            if path.extension().is_none_or(|ext| ext != ENTRY_EXT) {
                continue;
            }
            if let Some(entry) = Self::read_entry(&path).await? {
                keys.push(entry.key());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (DiskStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = DiskStorage::new(temp_dir.path().join("caches"));
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn keys_on_missing_root_is_empty() {
        let (storage, _dir) = create_test_storage();
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_creates_store_directory_with_meta() {
        let (storage, _dir) = create_test_storage();
        storage.open("west-coast-trip-v1").await.unwrap();

        let meta = storage.store_dir("west-coast-trip-v1").join(STORE_META);
        assert!(meta.exists());
        let content = std::fs::read_to_string(meta).unwrap();
        assert!(content.contains("west-coast-trip-v1"));
        assert_eq!(storage.keys().await.unwrap(), vec!["west-coast-trip-v1"]);
    }

    #[tokio::test]
    async fn open_twice_keeps_creation_time() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        let meta = storage.store_dir("v1").join(STORE_META);
        let first = std::fs::read_to_string(&meta).unwrap();
        storage.open("v1").await.unwrap();
        assert_eq!(std::fs::read_to_string(&meta).unwrap(), first);
    }

    #[tokio::test]
    async fn keys_follow_creation_order() {
        let (storage, _dir) = create_test_storage();
        storage.open("b").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage.open("a").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn store_names_with_slashes_are_contained() {
        let (storage, _dir) = create_test_storage();
        storage.open("../escape/v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["../escape/v1"]);
        assert!(storage.delete("../escape/v1").await.unwrap());
    }

    #[tokio::test]
    async fn put_and_match_preserve_response() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        let response = Response::ok(vec![0u8, 159, 146, 150])
            .with_header("Content-Type", "application/octet-stream");
        storage.put("v1", &Request::get("/blob"), &response).await.unwrap();

        let hit = storage.match_request(&Request::get("/blob")).await.unwrap();
        assert_eq!(hit, Some(response));
    }

    #[tokio::test]
    async fn put_requires_open_store() {
        let (storage, _dir) = create_test_storage();
        let err = storage
            .put("v1", &Request::get("/"), &Response::ok("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[tokio::test]
    async fn put_overwrites_same_key() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        storage.put("v1", &Request::get("/"), &Response::ok("one")).await.unwrap();
        storage.put("v1", &Request::get("/"), &Response::ok("two")).await.unwrap();

        assert_eq!(storage.entries("v1").await.unwrap(), vec![Request::get("/").key()]);
        let hit = storage.match_request(&Request::get("/")).await.unwrap().unwrap();
        assert_eq!(hit.body, "two");
    }

    #[tokio::test]
    async fn match_misses_on_unnormalized_path() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        storage.put("v1", &Request::get("index.html"), &Response::ok("page")).await.unwrap();

        assert!(storage.match_request(&Request::get("/index.html")).await.unwrap().is_none());
        assert!(storage.match_request(&Request::get("index.html")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn match_searches_every_store() {
        let (storage, _dir) = create_test_storage();
        storage.open("v0").await.unwrap();
        storage.open("v1").await.unwrap();
        storage.put("v0", &Request::get("/old.css"), &Response::ok("css")).await.unwrap();

        assert!(storage.match_request(&Request::get("/old.css")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_store_and_entries() {
        let (storage, _dir) = create_test_storage();
        storage.open("v0").await.unwrap();
        storage.put("v0", &Request::get("/"), &Response::ok("x")).await.unwrap();

        assert!(storage.delete("v0").await.unwrap());
        assert!(!storage.delete("v0").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(storage.match_request(&Request::get("/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stray_directories_are_ignored() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        std::fs::create_dir_all(storage.root().join("not-a-store")).unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn corrupt_body_is_reported() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        let key = Request::get("/").key();
        let entry = serde_json::json!({
            "method": "GET",
            "url": "/",
            "status": 200,
            "status_text": "OK",
            "headers": [],
            "body": "***not base64***",
            "stored_at": Utc::now(),
        });
        std::fs::write(storage.entry_path("v1", &key), entry.to_string()).unwrap();

        let err = storage.match_request(&Request::get("/")).await.unwrap_err();
        assert!(matches!(err, Error::CorruptEntry(_)));
    }

    #[tokio::test]
    async fn long_store_names_are_hashed() {
        let (storage, _dir) = create_test_storage();
        let name = "west-coast-trip-".repeat(20);
        storage.open(&name).await.unwrap();
        storage.put(&name, &Request::get("/"), &Response::ok("home")).await.unwrap();

        assert!(store_dir_name(&name).starts_with("hashed-"));
        assert_eq!(storage.keys().await.unwrap(), vec![name.clone()]);
        assert!(storage.match_request(&Request::get("/")).await.unwrap().is_some());
        assert!(storage.delete(&name).await.unwrap());
    }

    #[tokio::test]
    async fn put_all_writes_every_entry_and_cleans_up() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        let entries = vec![
            (Request::get("/"), Response::ok("home")),
            (Request::get("index.html"), Response::ok("index")),
        ];
        storage.put_all("v1", &entries).await.unwrap();

        assert_eq!(storage.entries("v1").await.unwrap().len(), 2);
        let leftovers: Vec<_> = std::fs::read_dir(storage.store_dir("v1"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn put_all_requires_open_store() {
        let (storage, _dir) = create_test_storage();
        let entries = vec![(Request::get("/"), Response::ok("home"))];
        let err = storage.put_all("v1", &entries).await.unwrap_err();
        assert!(matches!(err, Error::StoreNotFound(_)));
    }

    #[tokio::test]
    async fn failed_put_all_removes_staging_directory() {
        let (storage, _dir) = create_test_storage();
        storage.open("v1").await.unwrap();
        // A directory squatting on the entry path makes the commit fail.
        let blocked = Request::get("/blocked");
        std::fs::create_dir_all(storage.entry_path("v1", &blocked.key()).join("x")).unwrap();

        let entries = vec![(blocked, Response::ok("x"))];
        assert!(storage.put_all("v1", &entries).await.is_err());
        let staging: Vec<_> = std::fs::read_dir(storage.store_dir("v1"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(staging.is_empty());
    }

    proptest! {
        #[test]
        fn store_dir_name_is_a_single_safe_component(name in ".*") {
            let dir = store_dir_name(&name);
            prop_assert!(dir.starts_with("store-") || dir.starts_with("hashed-"));
            prop_assert!(dir.len() <= MAX_DIR_NAME);
            prop_assert!(dir.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }
}
