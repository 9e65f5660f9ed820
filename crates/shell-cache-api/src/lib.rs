//! Shell Cache HTTP Surface
//!
//! This crate exposes the cache worker over HTTP: every request that is
//! not an internal route is offered to the worker for interception.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{INTERNAL_PREFIX, create_router};
pub use state::{AppState, MetricsHandle};
