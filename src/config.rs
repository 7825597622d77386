//! Configuration types for the cache agent and its host.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cache name used when none is configured. Bump it to force a refresh.
pub const DEFAULT_CACHE_NAME: &str = "west-coast-trip-v1";

/// Assets pre-cached when no list is configured.
pub const DEFAULT_ASSET_URLS: &[&str] = &[
    "/",
    "index.html",
    "manifest.json",
    "https://cdn.tailwindcss.com",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
    "https://unpkg.com/@phosphor-icons/web",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
    "https://i0.wp.com/vetturinos.com/wp-content/uploads/2024/11/San-Francisco-con-el-Puente-Golden-Gate.jpg?resize=1200%2C500&ssl=1",
    "https://placehold.co/192x192/3b82f6/ffffff?text=🏜️",
    "https://placehold.co/512x512/3b82f6/ffffff?text=🏜️",
];

/// Configuration for a cache agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name of the current cache store. Every other store is stale.
    pub cache_name: String,
    /// Assets fetched and stored on install, in order.
    pub asset_urls: Vec<String>,
    /// Origin that relative asset URLs are resolved against when fetched.
    pub origin: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            asset_urls: DEFAULT_ASSET_URLS.iter().map(ToString::to_string).collect(),
            origin: None,
        }
    }
}

impl AgentConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current cache name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Replaces the asset list.
    #[must_use]
    pub fn with_asset_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the origin used to resolve relative URLs.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Checks the configuration for errors the bulk add would hit later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the cache name is blank, an asset URL is
    /// blank, or the same asset URL appears twice.
    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(Error::Config("cache_name must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for url in &self.asset_urls {
            if url.trim().is_empty() {
                return Err(Error::Config("asset_urls contains an empty URL".to_string()));
            }
            if !seen.insert(url.as_str()) {
                return Err(Error::Config(format!("duplicate asset URL: {url}")));
            }
        }
        Ok(())
    }
}

/// Path configuration for the cache store and config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding one subdirectory per cache store.
    pub cache_dir: PathBuf,
    /// Directory where the configuration file is read from.
    pub config_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            cache_dir: cache_dir.join("precache"),
            config_dir: config_dir.join("precache"),
        }
    }
}

impl PathConfig {
    /// Returns the default configuration file path.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// HTTP front end configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Complete application configuration combining agent, path, and server settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache agent configuration.
    pub agent: AgentConfig,
    /// Path configuration.
    pub paths: PathConfig,
    /// HTTP front end configuration.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the default config file location.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::load_from`].
    pub fn load() -> Result<Self> {
        Self::load_from(&PathConfig::default().config_file())
    }

    /// Loads configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting agent configuration is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => {
                log::info!("Loaded config from {}", path.display());
                toml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.agent.validate()?;
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_agent_config() {
        let config = AgentConfig::default();
        assert_eq!(config.cache_name, "west-coast-trip-v1");
        assert_eq!(config.asset_urls.len(), 11);
        assert_eq!(config.asset_urls[0], "/");
        assert_eq!(config.asset_urls[1], "index.html");
        assert!(config.origin.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn agent_config_builder_pattern() {
        let config = AgentConfig::new()
            .with_cache_name("v2")
            .with_asset_urls(["/", "app.js"])
            .with_origin("http://localhost:8000");

        assert_eq!(config.cache_name, "v2");
        assert_eq!(config.asset_urls, vec!["/".to_string(), "app.js".to_string()]);
        assert_eq!(config.origin.as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn validate_rejects_blank_cache_name() {
        let config = AgentConfig::new().with_cache_name("  ");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_duplicate_urls() {
        let config = AgentConfig::new().with_asset_urls(["/", "index.html", "/"]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate asset URL: /"));
    }

    #[test]
    fn validate_keeps_distinct_spellings_apart() {
        // Keys are exact strings, so these are two different assets.
        let config = AgentConfig::new().with_asset_urls(["index.html", "/index.html"]);
        config.validate().unwrap();
    }

    #[test]
    fn validate_accepts_empty_asset_list() {
        let config = AgentConfig::new().with_asset_urls(Vec::<String>::new());
        config.validate().unwrap();
    }

    #[test]
    fn default_path_config() {
        let config = PathConfig::default();
        assert!(config.cache_dir.to_string_lossy().contains("precache"));
        assert!(config.config_file().ends_with("config.toml"));
    }

    #[test]
    fn default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8787);
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_from_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[agent]\ncache_name = \"v1\"\nasset_urls = [\"/\", \"index.html\"]\n\n[server]\nport = 9000\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.cache_name, "v1");
        assert_eq!(config.agent.asset_urls.len(), 2);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn load_from_rejects_invalid_agent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nasset_urls = [\"a\", \"a\"]\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn load_from_rejects_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.agent = AgentConfig::new()
            .with_cache_name("v3")
            .with_origin("https://example.org");

        config.save(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
