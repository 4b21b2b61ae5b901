//! Shared HTTP client.
//!
//! Building a `reqwest::Client` sets up a connection pool and TLS config, so
//! one client is created per process and reused by every API call.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::time::Duration;

static HTTP_CLIENT: OnceCell<reqwest::Client> = OnceCell::new();

/// Get the process-wide HTTP client, creating it on first use.
///
/// The timeout of the first call wins; later calls reuse that client.
pub fn get_http_client(timeout_secs: u64) -> Result<&'static reqwest::Client> {
    HTTP_CLIENT.get_or_try_init(|| build_http_client(timeout_secs))
}

/// Build a fresh client with the given per-request timeout.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}
