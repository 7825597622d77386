//! Error types for the precache library.

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Errors that can occur while installing, serving, or purging caches.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error from the network collaborator.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network failure reported by a non-HTTP collaborator.
    #[error("Network error for {url}: {message}")]
    Network {
        /// URL that could not be fetched.
        url: String,
        /// Description of the failure.
        message: String,
    },

    /// A pre-cache fetch returned a non-success status.
    #[error("Bad response for {url}: HTTP {status}")]
    BadStatus {
        /// URL that was fetched.
        url: String,
        /// Status code returned.
        status: u16,
    },

    /// I/O error during cache storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored cache entry could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized.
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Configuration is structurally valid but semantically wrong.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A request URL could not be resolved.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A request method was not a valid HTTP token.
    #[error("Invalid request method: {0}")]
    InvalidMethod(String),

    /// The named cache store does not exist.
    #[error("Cache store not found: {0}")]
    StoreNotFound(String),

    /// A cache entry on disk is unreadable.
    #[error("Corrupt cache entry: {0}")]
    CorruptEntry(String),

    /// One or more stale stores could not be deleted during activation.
    #[error("Activation failed, could not delete: {}", .failed.join(", "))]
    Activation {
        /// Names of the stores that are still present.
        failed: Vec<String>,
    },

    /// A lifecycle signal arrived in the wrong state.
    #[error("Invalid lifecycle state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the signal requires.
        expected: LifecycleState,
        /// State the registration was in.
        actual: LifecycleState,
    },

    /// HTTP front end failed to start or stopped unexpectedly.
    #[error("Server error: {0}")]
    Server(String),
}

/// A specialized `Result` type for precache operations.
pub type Result<T> = std::result::Result<T, Error>;
