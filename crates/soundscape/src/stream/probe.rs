//! Asset availability probe
//!
//! Answers "is this URL worth loading?" once per URL and remembers the
//! answer for the lifetime of the probe. Failures count as unavailable and
//! are never retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::config::network::PROBE_TIMEOUT_SECS;
use crate::error::Result;

use super::http::HttpClient;

/// A single reachability check for a URL
pub trait AssetCheck: Send + Sync {
    fn check(&self, url: &str) -> Result<bool>;
}

/// `HEAD` request with caching disabled
pub struct HttpAssetCheck {
    client: HttpClient,
    timeout: Duration,
}

impl HttpAssetCheck {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
    }

    /// Check whose request gives up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: HttpClient::with_timeout(timeout)?,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl AssetCheck for HttpAssetCheck {
    fn check(&self, url: &str) -> Result<bool> {
        self.client.head_ok(url)
    }
}

/// Memoizing wrapper around an `AssetCheck`
pub struct AvailabilityProbe {
    check: Arc<dyn AssetCheck>,
    cache: Mutex<HashMap<String, bool>>,
}

impl AvailabilityProbe {
    pub fn new(check: Arc<dyn AssetCheck>) -> Self {
        Self {
            check,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Probe backed by real HTTP requests
    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(HttpAssetCheck::new()?)))
    }

    /// Whether `url` is reachable, checking at most once per URL
    pub fn is_available(&self, url: &str) -> bool {
        if let Some(known) = self.cached(url) {
            return known;
        }

        let available = match self.check.check(url) {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Availability check failed for {}: {}", url, e);
                false
            }
        };
        debug!("Asset {} available: {}", url, available);

        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_insert(available);
        available
    }

    /// Cached answer for `url`, if it has been checked
    pub fn cached(&self, url: &str) -> Option<bool> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
    }

    /// Number of URLs checked so far
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
