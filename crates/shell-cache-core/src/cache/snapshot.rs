//! Conversion between network responses and stored snapshots

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use shell_cache_fetch::FetchResponse;
use shell_cache_storage::CachedResponse;
use tracing::warn;
use url::Url;

/// Snapshot a response for storage. The body is shared, not copied.
pub fn to_snapshot(response: &FetchResponse) -> CachedResponse {
    let headers = response
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                encode_header_value(value),
            )
        })
        .collect();

    CachedResponse::new(
        response.url.as_str(),
        response.status.as_u16(),
        headers,
        response.body.clone(),
    )
}

/// Rebuild a response from a stored snapshot.
///
/// `request_url` is used when the stored URL no longer parses. Returns
/// `None` for a snapshot with an impossible status code.
pub fn from_snapshot(snapshot: CachedResponse, request_url: &Url) -> Option<FetchResponse> {
    let Ok(status) = StatusCode::from_u16(snapshot.status) else {
        warn!(
            "Ignoring cached entry for {} with invalid status {}",
            request_url, snapshot.status
        );
        return None;
    };

    let url = Url::parse(&snapshot.url).unwrap_or_else(|_| request_url.clone());

    let mut headers = HeaderMap::with_capacity(snapshot.headers.len());
    for (name, value) in &snapshot.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            decode_header_value(value),
        ) {
            (Ok(name), Some(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Dropping unparseable cached header {:?} for {}", name, url),
        }
    }

    Some(FetchResponse {
        url,
        status,
        headers,
        body: snapshot.body,
    })
}

/// Header values may carry obs-text bytes (0x80..=0xFF), so each byte is
/// kept as the char with the same code point
fn encode_header_value(value: &HeaderValue) -> String {
    value.as_bytes().iter().map(|&b| char::from(b)).collect()
}

fn decode_header_value(value: &str) -> Option<HeaderValue> {
    let bytes = value
        .chars()
        .map(|c| u8::try_from(c).ok())
        .collect::<Option<Vec<u8>>>()?;
    HeaderValue::from_bytes(&bytes).ok()
}
