//! Strategy executor

use shell_cache_fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};
use shell_cache_storage::{CacheStorage, RequestKey};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::snapshot::{from_snapshot, to_snapshot};
use super::strategy::{Strategy, is_cacheable};
use crate::error::CoreError;

/// Runs caching strategies against a store and the network.
///
/// Cache writes are detached: the response is returned as soon as it is
/// available and the write completes in a tracked background task whose
/// failure is only logged.
pub struct StrategyExecutor {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    writes: TaskTracker,
}

impl StrategyExecutor {
    pub fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            storage,
            fetcher,
            writes: TaskTracker::new(),
        }
    }

    /// Run `strategy` for `request` against `partition`
    pub async fn execute(
        &self,
        strategy: Strategy,
        request: &FetchRequest,
        partition: &str,
    ) -> Result<FetchResponse, CoreError> {
        self.execute_with_shell(strategy, request, partition, None)
            .await
    }

    /// Run `strategy` for `request` against `partition`, with cache-first
    /// lookups also reading the pre-populated `shell` partition.
    ///
    /// The shell partition is read-only here: hits are served from it
    /// and never copied into `partition`, and it is not part of the
    /// fallback after a network failure.
    pub async fn execute_with_shell(
        &self,
        strategy: Strategy,
        request: &FetchRequest,
        partition: &str,
        shell: Option<&str>,
    ) -> Result<FetchResponse, CoreError> {
        let key = RequestKey::new(request.method.clone(), &request.url);
        debug!("{} {} via {} in {}", request.method, request.url, strategy, partition);

        match strategy {
            Strategy::CacheFirst | Strategy::CacheFirstWithRefresh => {
                self.cache_first(strategy, request, &key, partition, shell)
                    .await
            }
            Strategy::NetworkFirst => self.network_first(strategy, request, &key, partition).await,
        }
    }

    async fn cache_first(
        &self,
        strategy: Strategy,
        request: &FetchRequest,
        key: &RequestKey,
        partition: &str,
        shell: Option<&str>,
    ) -> Result<FetchResponse, CoreError> {
        for tier in shell.into_iter().chain([partition]) {
            if let Some(cached) = self.lookup(tier, key, &request.url).await {
                debug!("Cache hit for {} in {}", key, tier);
                record("shell_cache_hits_total", strategy, tier);
                return Ok(cached);
            }
        }

        record("shell_cache_misses_total", strategy, partition);

        match self.fetch_and_store(strategy, request, key, partition).await {
            Ok(response) => Ok(response),
            Err(e) => self.fallback(strategy, request, key, partition, e).await,
        }
    }

    async fn network_first(
        &self,
        strategy: Strategy,
        request: &FetchRequest,
        key: &RequestKey,
        partition: &str,
    ) -> Result<FetchResponse, CoreError> {
        match self.fetch_and_store(strategy, request, key, partition).await {
            Ok(response) => Ok(response),
            Err(e) => self.fallback(strategy, request, key, partition, e).await,
        }
    }

    /// Fetch from the network and schedule a cache write for a cacheable
    /// response. Any HTTP status is returned to the caller; only transport
    /// failures are errors.
    async fn fetch_and_store(
        &self,
        strategy: Strategy,
        request: &FetchRequest,
        key: &RequestKey,
        partition: &str,
    ) -> Result<FetchResponse, FetchError> {
        let response = self.fetcher.fetch(request).await.inspect_err(|e| {
            debug!("Network failure for {}: {}", request.url, e);
            record("shell_cache_network_failures_total", strategy, partition);
        })?;

        if is_cacheable(response.status) {
            self.store_detached(partition, key, &response);
        } else {
            debug!(
                "Not caching {} with status {}",
                request.url, response.status
            );
        }

        Ok(response)
    }

    /// Last resort after a transport failure: serve whatever the partition
    /// holds for this request, or report exhaustion
    async fn fallback(
        &self,
        strategy: Strategy,
        request: &FetchRequest,
        key: &RequestKey,
        partition: &str,
        error: FetchError,
    ) -> Result<FetchResponse, CoreError> {
        if let Some(stale) = self.lookup(partition, key, &request.url).await {
            debug!("Serving stale {} from {} after network failure", key, partition);
            record("shell_cache_fallbacks_total", strategy, partition);
            return Ok(stale);
        }

        warn!(
            "No cached fallback for {} in {} after network failure: {}",
            request.url, partition, error
        );
        Err(CoreError::Unavailable {
            url: request.url.to_string(),
            source: error,
        })
    }

    /// Read an entry; a storage failure counts as a miss
    async fn lookup(
        &self,
        partition: &str,
        key: &RequestKey,
        request_url: &url::Url,
    ) -> Option<FetchResponse> {
        match self.storage.get(partition, key).await {
            Ok(Some(snapshot)) => from_snapshot(snapshot, request_url),
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {} in {}: {}", key, partition, e);
                None
            }
        }
    }

    /// Write a copy of the response in the background. The caller keeps
    /// the original with its body intact.
    fn store_detached(&self, partition: &str, key: &RequestKey, response: &FetchResponse) {
        let storage = Arc::clone(&self.storage);
        let partition = partition.to_string();
        let key = key.clone();
        let snapshot = to_snapshot(response);

        self.writes.spawn(async move {
            match storage.put(&partition, &key, snapshot).await {
                Ok(()) => {
                    debug!("Cached {} in {}", key, partition);
                    metrics::counter!("shell_cache_writes_total", "partition" => partition)
                        .increment(1);
                }
                Err(e) => {
                    warn!("Cache write failed for {} in {}: {}", key, partition, e);
                    metrics::counter!("shell_cache_write_failures_total", "partition" => partition)
                        .increment(1);
                }
            }
        });
    }

    /// Number of cache writes still in flight
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Wait for all in-flight cache writes to finish
    pub async fn flush(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }
}

fn record(name: &'static str, strategy: Strategy, partition: &str) {
    metrics::counter!(
        name,
        "strategy" => strategy.as_str(),
        "partition" => partition.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use bytes::Bytes;
    use shell_cache_storage::{CachedResponse, MemoryStorage};
    use url::Url;

    const ICON: &str = "https://cdn.jsdelivr.net/npm/simple-icons@v9/icons/github.svg";
    const FAVICON: &str = "https://icon.horse/icon/github.com";
    const PAGE: &str = "https://nav.example.com/chat.html";

    fn setup() -> (Arc<MemoryStorage>, Arc<ScriptedFetcher>, StrategyExecutor) {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = Arc::new(ScriptedFetcher::new());
        let executor = StrategyExecutor::new(storage.clone(), fetcher.clone());
        (storage, fetcher, executor)
    }

    fn request(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    fn key(url: &str) -> RequestKey {
        RequestKey::get(&Url::parse(url).unwrap())
    }

    async fn seed(storage: &MemoryStorage, partition: &str, url: &str, body: &'static str) {
        storage
            .put(
                partition,
                &key(url),
                CachedResponse::new(url, 200, vec![], Bytes::from_static(body.as_bytes())),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cache_first_populates_then_serves_from_cache() {
        let (storage, fetcher, executor) = setup();
        fetcher.respond(ICON, 200, "<svg/>");

        let first = executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await
            .unwrap();
        assert_eq!(first.body, Bytes::from_static(b"<svg/>"));
        executor.flush().await;
        assert_eq!(storage.len("cdn"), 1);

        let second = executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await
            .unwrap();
        assert_eq!(second.body, Bytes::from_static(b"<svg/>"));
        assert_eq!(fetcher.calls_for(ICON), 1);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_error_status() {
        let (storage, fetcher, executor) = setup();
        fetcher.respond(ICON, 404, "missing");

        let response = executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await
            .unwrap();
        assert_eq!(response.status, http::StatusCode::NOT_FOUND);
        executor.flush().await;
        assert_eq!(storage.len("cdn"), 0);

        // Next request goes to the network again
        executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await
            .unwrap();
        assert_eq!(fetcher.calls_for(ICON), 2);
    }

    #[tokio::test]
    async fn test_cache_first_exhaustion_fails() {
        let (storage, fetcher, executor) = setup();
        fetcher.fail(ICON);

        let result = executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await;
        assert!(matches!(result, Err(CoreError::Unavailable { .. })));
        assert_eq!(storage.len("cdn"), 0);
    }

    #[tokio::test]
    async fn test_network_first_overwrites_stale_entry() {
        let (storage, fetcher, executor) = setup();
        seed(&storage, "cdn", FAVICON, "stale").await;
        fetcher.respond(FAVICON, 200, "fresh");

        let response = executor
            .execute(Strategy::NetworkFirst, &request(FAVICON), "cdn")
            .await
            .unwrap();
        assert_eq!(response.body, Bytes::from_static(b"fresh"));

        executor.flush().await;
        let stored = storage.get("cdn", &key(FAVICON)).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"fresh"));
    }

    #[tokio::test]
    async fn test_network_first_falls_back_on_failure() {
        let (storage, fetcher, executor) = setup();
        seed(&storage, "cdn", FAVICON, "stale").await;
        fetcher.fail(FAVICON);

        let response = executor
            .execute(Strategy::NetworkFirst, &request(FAVICON), "cdn")
            .await
            .unwrap();
        assert_eq!(response.body, Bytes::from_static(b"stale"));
    }

    #[tokio::test]
    async fn test_network_first_returns_error_status_without_fallback() {
        let (storage, fetcher, executor) = setup();
        seed(&storage, "cdn", FAVICON, "stale").await;
        fetcher.respond(FAVICON, 500, "oops");

        let response = executor
            .execute(Strategy::NetworkFirst, &request(FAVICON), "cdn")
            .await
            .unwrap();
        assert_eq!(response.status, http::StatusCode::INTERNAL_SERVER_ERROR);

        executor.flush().await;
        let stored = storage.get("cdn", &key(FAVICON)).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"stale"));
    }

    #[tokio::test]
    async fn test_network_first_exhaustion_fails() {
        let (_storage, fetcher, executor) = setup();
        fetcher.fail(FAVICON);

        let result = executor
            .execute(Strategy::NetworkFirst, &request(FAVICON), "cdn")
            .await;
        assert!(matches!(result, Err(CoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_own_origin_serves_cached_without_network() {
        let (storage, fetcher, executor) = setup();
        seed(&storage, "runtime", PAGE, "cached page").await;
        fetcher.fail(PAGE);

        let response = executor
            .execute(Strategy::CacheFirstWithRefresh, &request(PAGE), "runtime")
            .await
            .unwrap();
        assert_eq!(response.body, Bytes::from_static(b"cached page"));
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_own_origin_only_consults_its_partition() {
        let (storage, fetcher, executor) = setup();
        seed(&storage, "cdn", PAGE, "wrong partition").await;
        fetcher.fail(PAGE);

        let result = executor
            .execute(Strategy::CacheFirstWithRefresh, &request(PAGE), "runtime")
            .await;
        assert!(matches!(result, Err(CoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_fragment_shares_entry() {
        let (storage, fetcher, executor) = setup();
        fetcher.respond(PAGE, 200, "page");

        executor
            .execute(Strategy::CacheFirstWithRefresh, &request(PAGE), "runtime")
            .await
            .unwrap();
        executor.flush().await;

        let with_fragment = format!("{}#section", PAGE);
        executor
            .execute(
                Strategy::CacheFirstWithRefresh,
                &request(&with_fragment),
                "runtime",
            )
            .await
            .unwrap();

        assert_eq!(storage.len("runtime"), 1);
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_flush_waits_for_pending_writes() {
        let (storage, fetcher, executor) = setup();
        fetcher.respond(ICON, 200, "<svg/>");

        executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await
            .unwrap();
        executor.flush().await;

        assert_eq!(executor.pending_writes(), 0);
        assert_eq!(storage.len("cdn"), 1);

        // Tracker accepts new writes after a flush
        fetcher.respond(FAVICON, 200, "icon");
        executor
            .execute(Strategy::NetworkFirst, &request(FAVICON), "cdn")
            .await
            .unwrap();
        executor.flush().await;
        assert_eq!(storage.len("cdn"), 2);
    }

    #[tokio::test]
    async fn test_storage_failures_degrade_to_network() {
        let storage: Arc<dyn CacheStorage> = Arc::new(crate::testing::BrokenStorage);
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.respond(ICON, 200, "<svg/>");
        let executor = StrategyExecutor::new(storage, fetcher.clone());

        // Read failure is a miss, write failure is only logged
        let response = executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await
            .unwrap();
        assert_eq!(response.body, Bytes::from_static(b"<svg/>"));
        executor.flush().await;

        // With the network down too, the request is exhausted
        fetcher.fail(ICON);
        let result = executor
            .execute(Strategy::CacheFirst, &request(ICON), "cdn")
            .await;
        assert!(matches!(result, Err(CoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_shell_partition_is_read_only_tier() {
        let (storage, fetcher, executor) = setup();
        seed(&storage, "core", PAGE, "shell copy").await;

        let response = executor
            .execute_with_shell(
                Strategy::CacheFirstWithRefresh,
                &request(PAGE),
                "runtime",
                Some("core"),
            )
            .await
            .unwrap();
        assert_eq!(response.body, Bytes::from_static(b"shell copy"));
        executor.flush().await;

        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(storage.len("runtime"), 0);
    }
}
