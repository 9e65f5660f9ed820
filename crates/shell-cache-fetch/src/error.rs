//! Fetch error types

use thiserror::Error;

/// Transport-level fetch failure.
///
/// An HTTP response with an error status is not a `FetchError`; it is
/// returned as a normal response.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network unreachable: {0}")]
    Unreachable(String),
}
