//! Strategy and partition selection

use http::StatusCode;
use serde::Serialize;
use std::fmt;

use crate::router::RouteCategory;

/// Which of the worker's partitions a request is cached in
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Core,
    Runtime,
    Cdn,
}

impl PartitionKind {
    /// Own-origin resources go to `runtime`, everything external to `cdn`.
    /// `core` is only written at install time.
    pub fn for_category(category: RouteCategory) -> Self {
        match category {
            RouteCategory::OwnOrigin => PartitionKind::Runtime,
            RouteCategory::VersionedCdnIcon
            | RouteCategory::FaviconService
            | RouteCategory::GenericExternal => PartitionKind::Cdn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Core => "core",
            PartitionKind::Runtime => "runtime",
            PartitionKind::Cdn => "cdn",
        }
    }
}

/// Caching strategy
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from cache; fetch and store only on a miss
    CacheFirst,
    /// Always fetch; cache is only a fallback for network failure
    NetworkFirst,
    /// Own-origin variant of cache-first: serve cache if present, else
    /// fetch and store, falling back to the runtime partition on failure
    CacheFirstWithRefresh,
}

impl Strategy {
    pub fn for_category(category: RouteCategory) -> Self {
        match category {
            RouteCategory::VersionedCdnIcon | RouteCategory::GenericExternal => Strategy::CacheFirst,
            RouteCategory::FaviconService => Strategy::NetworkFirst,
            RouteCategory::OwnOrigin => Strategy::CacheFirstWithRefresh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirstWithRefresh => "cache-first-with-background-refresh",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only complete `200 OK` responses are written to a partition.
/// Partial content, redirects and error statuses are passed to the
/// caller but never stored.
pub fn is_cacheable(status: StatusCode) -> bool {
    status == StatusCode::OK
}
