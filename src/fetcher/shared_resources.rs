//! Shared HTTP client for all fetcher instances
//!
//! One reqwest client per process so connection pooling works across every
//! concurrent transfer and metadata request.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP read timeout (seconds) - maximum gap between received chunks
const HTTP_READ_TIMEOUT_SECS: u64 = 60;
/// HTTP request timeout (seconds) - overall cap, long enough for large videos
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 600;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("likes-archiver/", env!("CARGO_PKG_VERSION"));

static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .read_timeout(Duration::from_secs(HTTP_READ_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build configured HTTP client, using defaults");
            Client::new()
        });
    Arc::new(client)
});

/// Get the global HTTP client
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}
