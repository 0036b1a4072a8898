//! Registry error types.

use thiserror::Error;

/// Errors that can occur while loading, mutating, or persisting the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The descriptor's endpoint is not a usable http(s) URL.
    #[error("invalid endpoint for '{name}': {url} ({reason})")]
    InvalidEndpoint {
        name: String,
        url: String,
        reason: String,
    },

    /// Reading or parsing the registry file failed.
    #[error("failed to load registry from {path}: {reason}")]
    LoadFailed {
        path: String,
        reason: String,
    },

    /// Writing the registry file failed. In-memory state is kept.
    #[error("failed to persist registry to {path}: {reason}")]
    PersistFailed {
        path: String,
        reason: String,
    },

    /// The static tool catalog could not be read or parsed.
    #[error("failed to load tool catalog {path}: {reason}")]
    CatalogFailed {
        path: String,
        reason: String,
    },
}
