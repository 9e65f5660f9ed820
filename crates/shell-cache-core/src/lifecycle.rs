//! Install and activate lifecycle
//!
//! Install pre-populates the core and CDN partitions; activate removes
//! partitions left behind by earlier versions.

use futures::future::join_all;
use serde::Serialize;
use shell_cache_fetch::{FetchRequest, Fetcher};
use shell_cache_storage::{CacheStorage, RequestKey};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{is_cacheable, to_snapshot};
use crate::config::{PartitionNames, PartitionSet};
use crate::error::CoreError;

/// An asset that could not be pre-populated
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssetFailure {
    pub url: String,
    pub reason: String,
}

/// Per-asset outcome of an install
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub core_stored: Vec<String>,
    pub core_failed: Vec<AssetFailure>,
    pub cdn_stored: Vec<String>,
    pub cdn_failed: Vec<AssetFailure>,
}

impl InstallReport {
    /// Every listed asset was stored
    pub fn is_complete(&self) -> bool {
        self.core_failed.is_empty() && self.cdn_failed.is_empty()
    }
}

/// Outcome of an activation cleanup
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    pub failed: Vec<String>,
}

/// Creates partitions at install time and garbage collects them at
/// activation time
pub struct LifecycleManager {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl LifecycleManager {
    pub fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { storage, fetcher }
    }

    /// Pre-populate the core partition with `core_assets`, then warm the
    /// CDN partition with `cdn_assets`.
    ///
    /// Individual asset failures are recorded and logged; they never abort
    /// the other assets or the install itself. Only a failure to open a
    /// partition is an error.
    pub async fn install(
        &self,
        partitions: &PartitionNames,
        core_assets: &[Url],
        cdn_assets: &[Url],
    ) -> Result<InstallReport, CoreError> {
        info!(
            "Installing: {} core assets into {}, {} CDN assets into {}",
            core_assets.len(),
            partitions.core,
            cdn_assets.len(),
            partitions.cdn
        );

        let mut report = InstallReport::default();

        self.storage.open(&partitions.core).await?;
        let (stored, failed) = self.populate(&partitions.core, core_assets).await;
        report.core_stored = stored;
        report.core_failed = failed;

        if !report.core_failed.is_empty() {
            warn!(
                "{} of {} core assets failed to cache, continuing",
                report.core_failed.len(),
                core_assets.len()
            );
        }

        self.storage.open(&partitions.cdn).await?;
        let (stored, failed) = self.populate(&partitions.cdn, cdn_assets).await;
        report.cdn_stored = stored;
        report.cdn_failed = failed;

        if !report.cdn_failed.is_empty() {
            warn!(
                "{} of {} CDN assets failed to pre-cache, continuing",
                report.cdn_failed.len(),
                cdn_assets.len()
            );
        }

        info!(
            "Install complete: {} core, {} CDN assets cached",
            report.core_stored.len(),
            report.cdn_stored.len()
        );

        Ok(report)
    }

    /// Fetch and store each asset independently and concurrently
    async fn populate(&self, partition: &str, assets: &[Url]) -> (Vec<String>, Vec<AssetFailure>) {
        let results = join_all(assets.iter().map(|url| self.populate_one(partition, url))).await;

        let mut stored = Vec::new();
        let mut failed = Vec::new();
        for (url, result) in assets.iter().zip(results) {
            match result {
                Ok(()) => stored.push(url.to_string()),
                Err(reason) => {
                    warn!("Failed to pre-cache {} into {}: {}", url, partition, reason);
                    failed.push(AssetFailure {
                        url: url.to_string(),
                        reason,
                    });
                }
            }
        }

        (stored, failed)
    }

    async fn populate_one(&self, partition: &str, url: &Url) -> Result<(), String> {
        let request = FetchRequest::get(url.clone());
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| e.to_string())?;

        if !is_cacheable(response.status) {
            return Err(format!("unexpected status {}", response.status));
        }

        self.storage
            .put(partition, &RequestKey::get(url), to_snapshot(&response))
            .await
            .map_err(|e| e.to_string())?;

        debug!("Pre-cached {} into {}", url, partition);
        Ok(())
    }

    /// Delete every partition not in `keep`.
    ///
    /// Cleanup is best-effort: a partition that fails to delete is logged
    /// and reported, and the remaining partitions are still processed.
    pub async fn activate(&self, keep: &PartitionSet) -> Result<ActivateReport, CoreError> {
        let existing = self.storage.list_partitions().await?;
        let mut report = ActivateReport::default();

        for name in existing {
            if keep.contains(&name) {
                report.kept.push(name);
                continue;
            }

            info!("Deleting stale partition: {}", name);
            match self.storage.delete_partition(&name).await {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!("Failed to delete stale partition {}: {}", name, e);
                    report.failed.push(name);
                }
            }
        }

        info!(
            "Activation cleanup: {} deleted, {} kept, {} failed",
            report.deleted.len(),
            report.kept.len(),
            report.failed.len()
        );

        Ok(report)
    }
}
