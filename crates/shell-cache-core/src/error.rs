//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] shell_cache_storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] shell_cache_fetch::FetchError),

    /// Network failed and nothing was cached to fall back to
    #[error("Network failure with no cached fallback for {url}: {source}")]
    Unavailable {
        url: String,
        #[source]
        source: shell_cache_fetch::FetchError,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}
