//! Cache worker: the single entry point for install, activate and fetch

use parking_lot::RwLock;
use serde::Serialize;
use shell_cache_fetch::{FetchRequest, FetchResponse, Fetcher};
use shell_cache_storage::CacheStorage;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{PartitionKind, Strategy, StrategyExecutor};
use crate::config::{CacheManifest, RouteConfig};
use crate::error::CoreError;
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleManager};
use crate::router::{RouteCategory, RouteClassifier, is_interceptable};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Constructed, not yet installed
    Parsed,
    Installing,
    /// Installed and ready to take over immediately
    Installed,
    Activating,
    /// Controlling clients; requests are intercepted
    Activated,
    /// Install failed; this worker will never control clients
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of offering a request to the worker
#[derive(Debug)]
pub enum Interception {
    /// The worker produced the response
    Respond(FetchResponse),
    /// Not intercepted; the caller should go straight to the network
    Passthrough,
}

/// Wires route classification to strategy execution and owns the
/// install/activate lifecycle for one cache version.
pub struct CacheWorker {
    manifest: CacheManifest,
    origin: Url,
    core_assets: Vec<Url>,
    cdn_assets: Vec<Url>,
    classifier: RouteClassifier,
    lifecycle: LifecycleManager,
    executor: StrategyExecutor,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<WorkerState>,
}

impl CacheWorker {
    /// Create a worker, validating the manifest and routing configuration
    pub fn new(
        manifest: CacheManifest,
        routes: RouteConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CoreError> {
        manifest.partitions.validate()?;
        routes.validate()?;

        let core_assets = manifest
            .resolve_core_assets(&routes.origin)
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        let cdn_assets = manifest
            .resolve_cdn_assets()
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;

        info!(
            "Cache worker for {} (core: {}, runtime: {}, cdn: {})",
            routes.origin, manifest.partitions.core, manifest.partitions.runtime, manifest.partitions.cdn
        );

        Ok(Self {
            classifier: RouteClassifier::new(&routes),
            lifecycle: LifecycleManager::new(Arc::clone(&storage), Arc::clone(&fetcher)),
            executor: StrategyExecutor::new(Arc::clone(&storage), Arc::clone(&fetcher)),
            origin: routes.origin,
            manifest,
            core_assets,
            cdn_assets,
            storage,
            fetcher,
            state: RwLock::new(WorkerState::Parsed),
        })
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }

    /// Install event: pre-populate partitions, then skip waiting so this
    /// worker can replace a previously active one without waiting for its
    /// clients to close.
    pub async fn install(&self) -> Result<InstallReport, CoreError> {
        {
            let mut state = self.state.write();
            if matches!(*state, WorkerState::Installing | WorkerState::Activating) {
                return Err(CoreError::Lifecycle(format!(
                    "Cannot install while {}",
                    *state
                )));
            }
            *state = WorkerState::Installing;
        }

        match self
            .lifecycle
            .install(&self.manifest.partitions, &self.core_assets, &self.cdn_assets)
            .await
        {
            Ok(report) => {
                *self.state.write() = WorkerState::Installed;
                info!("Worker installed, skipping wait for existing clients");
                Ok(report)
            }
            Err(e) => {
                warn!("Worker install failed: {}", e);
                *self.state.write() = WorkerState::Redundant;
                Err(e)
            }
        }
    }

    /// Activate event: drop partitions from other versions, then claim all
    /// clients so interception starts without a reload
    pub async fn activate(&self) -> Result<ActivateReport, CoreError> {
        {
            let mut state = self.state.write();
            if !matches!(*state, WorkerState::Installed | WorkerState::Activated) {
                return Err(CoreError::Lifecycle(format!(
                    "Cannot activate while {}",
                    *state
                )));
            }
            *state = WorkerState::Activating;
        }

        match self.lifecycle.activate(&self.manifest.partitions.current()).await {
            Ok(report) => {
                *self.state.write() = WorkerState::Activated;
                info!("Worker activated, clients claimed");
                Ok(report)
            }
            Err(e) => {
                warn!("Worker activation failed: {}", e);
                *self.state.write() = WorkerState::Installed;
                Err(e)
            }
        }
    }

    /// Fetch event: decide how to answer one request.
    ///
    /// Non-GET, non-http(s) and pre-activation requests are passed through
    /// without touching any partition.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<Interception, CoreError> {
        if !is_interceptable(&request.method, &request.url) {
            debug!("Passing through {} {}", request.method, request.url);
            return Ok(Interception::Passthrough);
        }

        if self.state() != WorkerState::Activated {
            debug!(
                "Worker {}, not controlling {}",
                self.state(),
                request.url
            );
            return Ok(Interception::Passthrough);
        }

        let category = self.classifier.classify(&request.url);
        let strategy = Strategy::for_category(category);
        let partitions = &self.manifest.partitions;
        let partition = partitions.name(PartitionKind::for_category(category));
        // Own-origin requests may be part of the pre-populated shell
        let shell = (category == RouteCategory::OwnOrigin).then_some(partitions.core.as_str());

        debug!("{} classified as {}", request.url, category);

        self.executor
            .execute_with_shell(strategy, request, partition, shell)
            .await
            .map(Interception::Respond)
    }

    /// Forward a request straight to the network
    pub async fn passthrough(&self, request: &FetchRequest) -> Result<FetchResponse, CoreError> {
        Ok(self.fetcher.fetch(request).await?)
    }

    /// Existing partitions with their entry counts
    pub async fn partitions(&self) -> Result<Vec<(String, usize)>, CoreError> {
        let mut result = Vec::new();
        for name in self.storage.list_partitions().await? {
            let count = self.storage.keys(&name).await?.len();
            result.push((name, count));
        }
        Ok(result)
    }

    /// Wait for detached cache writes to complete
    pub async fn flush(&self) {
        self.executor.flush().await;
    }
}
