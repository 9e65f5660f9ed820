//! Network client

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, header};
use reqwest::Client;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::types::{FetchRequest, FetchResponse};

/// Pseudonym this host adds to `Via` on every outgoing request
pub const VIA_PSEUDONYM: &str = "shell-cache";

/// Whether a `Via` header shows the request already passed through this
/// host. Serving such a request would fetch from ourselves again.
pub fn already_forwarded(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::VIA)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|hop| hop.split_whitespace().nth(1))
        .any(|received_by| received_by.eq_ignore_ascii_case(VIA_PSEUDONYM))
}

/// Request headers plus our own `Via` entry
fn outgoing_headers(headers: &HeaderMap) -> HeaderMap {
    let mut outgoing = headers.clone();
    outgoing.append(header::VIA, HeaderValue::from_static("1.1 shell-cache"));
    outgoing
}

/// Performs network fetches on behalf of the orchestrator
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a request from the network.
    ///
    /// Any HTTP status is `Ok`; only transport failures are `Err`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// HTTP client configuration
#[derive(Clone, Debug)]
pub struct HttpFetcherConfig {
    /// User agent sent when the page did not set one
    pub user_agent: Option<String>,
    /// Skip TLS certificate verification
    pub skip_tls_verify: bool,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(format!("shell-cache/{}", env!("CARGO_PKG_VERSION"))),
            skip_tls_verify: false,
        }
    }
}

/// reqwest-backed fetcher
///
/// No request timeout is configured here; the host that issued the
/// request owns that policy. Request headers, including credentials,
/// are forwarded untouched.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new HTTP fetcher
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder();

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;

        info!("Created HTTP fetcher");

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(FetchError::InvalidRequest(format!(
                    "Unsupported scheme: {}",
                    other
                )));
            }
        }

        debug!("Fetching {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(outgoing_headers(&request.headers));

        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!("Fetched {} -> {} ({} bytes)", request.url, status, body.len());

        Ok(FetchResponse {
            url,
            status,
            headers,
            body,
        })
    }
}
