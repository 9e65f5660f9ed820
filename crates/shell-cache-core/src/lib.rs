//! Shell Cache Core Business Logic
//!
//! This crate provides the request orchestrator: route classification,
//! caching strategies, and the install/activate lifecycle that keeps
//! cache partitions in step with the deployed version.

pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod router;
pub mod worker;

pub use cache::{PartitionKind, Strategy, StrategyExecutor, is_cacheable};
pub use config::{CacheManifest, FaviconService, PartitionNames, PartitionSet, RouteConfig};
pub use error::CoreError;
pub use lifecycle::{ActivateReport, AssetFailure, InstallReport, LifecycleManager};
pub use router::{RouteCategory, RouteClassifier, RouteMatcher, RouteRule, is_interceptable};
pub use worker::{CacheWorker, Interception, WorkerState};

#[cfg(test)]
pub(crate) mod testing;
