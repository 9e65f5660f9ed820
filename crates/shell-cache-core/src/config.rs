//! Worker configuration: partition manifest, asset lists and routing hosts

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::cache::PartitionKind;
use crate::error::CoreError;

/// Names of the three partitions owned by one worker version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionNames {
    /// Pre-populated app shell, versioned
    pub core: String,
    /// Same-origin resources cached on demand
    pub runtime: String,
    /// Third-party resources
    pub cdn: String,
}

impl PartitionNames {
    /// Standard naming: only the core partition carries the version, so
    /// runtime and CDN entries survive upgrades.
    pub fn versioned(prefix: &str, version: u32) -> Self {
        Self {
            core: format!("{}-v{}", prefix, version),
            runtime: format!("{}-runtime", prefix),
            cdn: format!("{}-cdn", prefix),
        }
    }

    pub fn name(&self, kind: PartitionKind) -> &str {
        match kind {
            PartitionKind::Core => &self.core,
            PartitionKind::Runtime => &self.runtime,
            PartitionKind::Cdn => &self.cdn,
        }
    }

    /// The set of partitions the current version expects to exist
    pub fn current(&self) -> PartitionSet {
        [&self.core, &self.runtime, &self.cdn]
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for name in [&self.core, &self.runtime, &self.cdn] {
            shell_cache_storage::validate_partition_name(name)
                .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        }

        if self.current().len() != 3 {
            return Err(CoreError::InvalidConfig(format!(
                "Partition names must be distinct: {}, {}, {}",
                self.core, self.runtime, self.cdn
            )));
        }

        Ok(())
    }
}

/// Set of partition names known to a worker version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet(BTreeSet<String>);

impl PartitionSet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for PartitionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// What to pre-populate at install time and which partitions to keep
#[derive(Debug, Clone)]
pub struct CacheManifest {
    pub partitions: PartitionNames,
    /// Logical paths resolved against the page origin (e.g. `./index.html`)
    pub core_assets: Vec<String>,
    /// Absolute third-party URLs warmed opportunistically
    pub cdn_assets: Vec<String>,
}

impl CacheManifest {
    pub fn new(partitions: PartitionNames) -> Self {
        Self {
            partitions,
            core_assets: vec!["./".to_string(), "./index.html".to_string()],
            cdn_assets: Vec::new(),
        }
    }

    pub fn with_core_assets(mut self, assets: Vec<String>) -> Self {
        self.core_assets = assets;
        self
    }

    pub fn with_cdn_assets(mut self, assets: Vec<String>) -> Self {
        self.cdn_assets = assets;
        self
    }

    /// Resolve core asset paths against the page origin
    pub fn resolve_core_assets(&self, origin: &Url) -> Result<Vec<Url>, CoreError> {
        let base = origin_base(origin);
        self.core_assets
            .iter()
            .map(|path| {
                base.join(path)
                    .map_err(|e| CoreError::InvalidUrl(format!("{}: {}", path, e)))
            })
            .collect()
    }

    /// Parse the absolute CDN asset URLs
    pub fn resolve_cdn_assets(&self) -> Result<Vec<Url>, CoreError> {
        self.cdn_assets
            .iter()
            .map(|raw| Url::parse(raw).map_err(|e| CoreError::InvalidUrl(format!("{}: {}", raw, e))))
            .collect()
    }
}

/// The origin as a directory URL, so `./x` resolves to `<origin>/x`
fn origin_base(origin: &Url) -> Url {
    let mut base = origin.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// A third-party favicon service: host plus optional path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaviconService {
    pub host: String,
    pub path_prefix: Option<String>,
}

impl FaviconService {
    pub fn host(host: &str) -> Self {
        Self {
            host: host.to_ascii_lowercase(),
            path_prefix: None,
        }
    }

    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        if !host_matches(host, &self.host) {
            return false;
        }

        match &self.path_prefix {
            Some(prefix) => url.path().starts_with(prefix.as_str()),
            None => true,
        }
    }
}

impl FromStr for FaviconService {
    type Err = CoreError;

    /// Parse `host` or `host/path/prefix`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, prefix) = match s.find('/') {
            Some(idx) => (&s[..idx], Some(s[idx..].to_string())),
            None => (s, None),
        };

        if host.is_empty() {
            return Err(CoreError::InvalidConfig(format!(
                "Favicon service has no host: {}",
                s
            )));
        }

        Ok(Self {
            host: host.to_ascii_lowercase(),
            path_prefix: prefix,
        })
    }
}

impl fmt::Display for FaviconService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path_prefix {
            Some(prefix) => write!(f, "{}{}", self.host, prefix),
            None => write!(f, "{}", self.host),
        }
    }
}

/// Inputs to route classification
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// The page's own origin
    pub origin: Url,
    /// Hosts serving versioned icon packages
    pub icon_cdn_hosts: Vec<String>,
    /// Path segment identifying the icon library on those hosts
    pub icon_path_marker: String,
    /// Favicon-fetching services
    pub favicon_services: Vec<FaviconService>,
}

impl RouteConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            icon_cdn_hosts: vec!["cdn.jsdelivr.net".to_string()],
            icon_path_marker: "simple-icons".to_string(),
            favicon_services: vec![
                FaviconService::host("icon.horse"),
                FaviconService {
                    host: "www.google.com".to_string(),
                    path_prefix: Some("/s2/favicons".to_string()),
                },
                FaviconService::host("favicons.githubusercontent.com"),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self.origin.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CoreError::InvalidConfig(format!(
                    "Origin must be http or https, got {}",
                    other
                )));
            }
        }

        if self.origin.host_str().is_none() {
            return Err(CoreError::InvalidConfig(format!(
                "Origin has no host: {}",
                self.origin
            )));
        }

        if self.icon_path_marker.is_empty() || self.icon_path_marker.contains('/') {
            return Err(CoreError::InvalidConfig(format!(
                "Icon path marker must be a single path segment: {:?}",
                self.icon_path_marker
            )));
        }

        Ok(())
    }
}

/// Exact or subdomain host match, case-insensitive
pub(crate) fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    host == pattern || host.ends_with(&format!(".{}", pattern))
}
