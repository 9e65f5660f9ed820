//! Configuration loading and management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use shell_cache_core::{CacheManifest, FaviconService, PartitionNames, RouteConfig};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use tracing::info;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Worker version, origin and asset lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// The page origin this worker controls
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Prefix for partition names
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
    /// Bump to roll the core partition over on the next activation
    #[serde(default = "default_version")]
    pub version: u32,
    /// Paths the shell needs offline, relative to the origin
    #[serde(default = "default_core_assets")]
    pub core_assets: Vec<String>,
    /// Third-party URLs to warm at install time
    #[serde(default)]
    pub cdn_assets: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            version: default_version(),
            core_assets: default_core_assets(),
            cdn_assets: Vec::new(),
        }
    }
}

/// Hosts that select the icon and favicon policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    #[serde(default = "default_icon_cdn_hosts")]
    pub icon_cdn_hosts: Vec<String>,
    #[serde(default = "default_icon_path_marker")]
    pub icon_path_marker: String,
    /// `host` or `host/path-prefix`
    #[serde(default = "default_favicon_services")]
    pub favicon_services: Vec<String>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            icon_cdn_hosts: default_icon_cdn_hosts(),
            icon_path_marker: default_icon_path_marker(),
            favicon_services: default_favicon_services(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "local" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_local_path(),
        }
    }
}

/// Network client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub skip_tls_verify: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_cache_prefix() -> String {
    "shell-cache".to_string()
}

fn default_version() -> u32 {
    1
}

fn default_core_assets() -> Vec<String> {
    vec!["./".to_string(), "./index.html".to_string()]
}

fn default_icon_cdn_hosts() -> Vec<String> {
    vec!["cdn.jsdelivr.net".to_string()]
}

fn default_icon_path_marker() -> String {
    "simple-icons".to_string()
}

fn default_favicon_services() -> Vec<String> {
    vec![
        "icon.horse".to_string(),
        "www.google.com/s2/favicons".to_string(),
        "favicons.githubusercontent.com".to_string(),
    ]
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_local_path() -> String {
    "./data/cache".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Save configuration to a file atomically
    ///
    /// Writes to a temp file in the target directory, then renames it over
    /// the destination.
    pub fn save(&self, path: &str) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize configuration")?;

        let path_obj = Path::new(path);
        let parent = match path_obj.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
        temp_file
            .write_all(content.as_bytes())
            .with_context(|| "Failed to write configuration")?;
        temp_file
            .as_file()
            .sync_all()
            .with_context(|| "Failed to sync configuration")?;
        temp_file
            .persist(path_obj)
            .with_context(|| format!("Failed to persist configuration to {}", path))?;

        info!("Saved configuration to {}", path);
        Ok(())
    }

    /// Partition names and asset lists for the worker
    pub fn manifest(&self) -> CacheManifest {
        CacheManifest::new(PartitionNames::versioned(
            &self.worker.cache_prefix,
            self.worker.version,
        ))
        .with_core_assets(self.worker.core_assets.clone())
        .with_cdn_assets(self.worker.cdn_assets.clone())
    }

    /// Refuse an origin that is this server's own listen address.
    ///
    /// Fetching such an origin would send every cache miss back into this
    /// server.
    pub fn ensure_origin_is_not_self(&self, bind_address: &str, port: u16) -> Result<()> {
        let origin = Url::parse(&self.worker.origin)
            .with_context(|| format!("Invalid worker origin: {}", self.worker.origin))?;

        if origin.port_or_known_default() != Some(port) {
            return Ok(());
        }

        let host = origin
            .host_str()
            .unwrap_or_default()
            .trim_start_matches('[')
            .trim_end_matches(']');

        let same_host = host.eq_ignore_ascii_case(bind_address)
            || (is_loopback(host) && (is_loopback(bind_address) || is_unspecified(bind_address)));

        if same_host {
            bail!(
                "Worker origin {} is this server's own address {}:{}; point it at the site being cached",
                self.worker.origin,
                bind_address,
                port
            );
        }

        Ok(())
    }

    /// Routing inputs for the worker
    pub fn route_config(&self) -> Result<RouteConfig> {
        let origin = Url::parse(&self.worker.origin)
            .with_context(|| format!("Invalid worker origin: {}", self.worker.origin))?;

        let favicon_services = self
            .routes
            .favicon_services
            .iter()
            .map(|s| s.parse::<FaviconService>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RouteConfig {
            origin,
            icon_cdn_hosts: self.routes.icon_cdn_hosts.clone(),
            icon_path_marker: self.routes.icon_path_marker.clone(),
            favicon_services,
        })
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

fn is_unspecified(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_unspecified())
}
