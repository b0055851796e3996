//! Shared HTTP client wrapper
//!
//! Thin wrapper around `reqwest::blocking::Client` that centralizes
//! USER_AGENT, timeout and cache configuration for asset requests.

use std::time::Duration;

use reqwest::header::CACHE_CONTROL;

use crate::config::network::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT};
use crate::error::Result;

/// Asset requests always bypass intermediate caches
const NO_CACHE: &str = "no-cache";

/// Shared HTTP client with standard configuration
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::blocking::Client,
}

impl HttpClient {
    /// Create a client with the default read timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let inner = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { inner })
    }

    /// HEAD a URL; `Ok(true)` when the server answers with a success status
    pub fn head_ok(&self, url: &str) -> Result<bool> {
        let resp = self.inner.head(url).header(CACHE_CONTROL, NO_CACHE).send()?;
        Ok(resp.status().is_success())
    }

    /// GET a URL and return the whole body
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .inner
            .get(url)
            .header(CACHE_CONTROL, NO_CACHE)
            .send()?
            .error_for_status()?;
        Ok(resp.bytes()?.to_vec())
    }

    /// Access the underlying reqwest client
    pub fn inner(&self) -> &reqwest::blocking::Client {
        &self.inner
    }
}
