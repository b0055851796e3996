//! Remote asset loading under a deadline
//!
//! `RemoteStreamLoader` runs a `StreamLoader` on an `asset-load` thread and
//! waits for it with `recv_timeout`. A result that arrives after the deadline
//! is dropped with the channel.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{debug, info};

use crate::config::network::READ_TIMEOUT_SECS;
use crate::error::{Result, SoundscapeError};

use super::decoder::{decode_all, extension_hint, RemoteTrack};
use super::http::HttpClient;

/// Fetches and fully decodes one asset
pub trait StreamLoader: Send + Sync {
    fn fetch(&self, url: &str) -> Result<RemoteTrack>;
}

/// HTTP GET followed by a whole-file decode
pub struct HttpStreamLoader {
    client: HttpClient,
}

impl HttpStreamLoader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: HttpClient::with_timeout(Duration::from_secs(READ_TIMEOUT_SECS))?,
        })
    }
}

impl StreamLoader for HttpStreamLoader {
    fn fetch(&self, url: &str) -> Result<RemoteTrack> {
        let bytes = self.client.get_bytes(url)?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        decode_all(bytes, extension_hint(url))
    }
}

/// Bounds a `StreamLoader` by a timeout
#[derive(Clone)]
pub struct RemoteStreamLoader {
    inner: Arc<dyn StreamLoader>,
    timeout: Duration,
}

impl RemoteStreamLoader {
    pub fn new(inner: Arc<dyn StreamLoader>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Load `url` until it can play without interruption, or fail
    pub fn load(&self, url: &str) -> Result<RemoteTrack> {
        let (tx, rx) = bounded::<Result<RemoteTrack>>(1);
        let inner = self.inner.clone();
        let target = url.to_string();
        let started = Instant::now();

        thread::Builder::new()
            .name("asset-load".to_string())
            .spawn(move || {
                let result = inner.fetch(&target);
                if tx.send(result).is_err() {
                    debug!("Discarding late load of {}", target);
                }
            })
            .map_err(|e| {
                SoundscapeError::AssetUnavailable(format!("Failed to spawn load thread: {}", e))
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(track)) => {
                info!(
                    "Loaded {} in {} ms ({:.1}s of audio)",
                    url,
                    started.elapsed().as_millis(),
                    track.duration().as_secs_f32()
                );
                Ok(track)
            }
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Err(SoundscapeError::Timeout(format!(
                "Loading {} took longer than {} ms",
                url,
                self.timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(SoundscapeError::AssetUnavailable(
                format!("Load thread for {} exited without a result", url),
            )),
        }
    }
}
