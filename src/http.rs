//! HTTP client construction. Grounded on `common::http::HttpClient` (default
//! user agent, fixed timeout) and `configs::sources`'s header merging.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (HLS fetchd)";

/// Default connect+read timeout for every request, per spec §5. Feeds
/// `TaskDefaults::timeout_secs`, which stays overridable via `config.toml` /
/// `HLS_FETCHD_TIMEOUT_SECS`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Merges caller-supplied headers over the built-in default User-Agent
/// (spec §3: `headers` "merged over a built-in User-Agent default").
pub fn merged_headers(overrides: &HashMap<String, String>) -> reqwest::header::HeaderMap {
    let mut map = reqwest::header::HeaderMap::new();
    map.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static(DEFAULT_USER_AGENT),
    );
    for (k, v) in overrides {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(k.as_bytes()),
            reqwest::header::HeaderValue::from_str(v),
        ) {
            map.insert(name, value);
        }
    }
    map
}
