//! Configuration for the soundscape engine
//!
//! Compile-time constants live in the nested modules; per-host settings
//! (where assets are hosted, how long to wait for them) live in
//! [`EngineConfig`], which can be loaded from a JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::types::SoundType;
use crate::error::{Result, SoundscapeError};

/// Audio-related configuration
pub mod audio {
    /// FFT window size of the analyser node
    pub const FFT_SIZE: usize = 256;

    /// Number of bins in the frequency buffer (half the FFT size)
    pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;

    /// Per-bin magnitude smoothing between analyser reads (0.0-1.0)
    pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

    /// Magnitude mapped to byte value 0
    pub const MIN_DECIBELS: f32 = -100.0;

    /// Magnitude mapped to byte value 255
    pub const MAX_DECIBELS: f32 = -30.0;

    /// Sample rate used for synthesized buffers when none is configured
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

    /// Length of synthesized loop buffers in seconds
    pub const DEFAULT_SAMPLE_DURATION_SECS: f32 = 8.0;

    /// Longest synthesized loop accepted, in seconds
    pub const MAX_SAMPLE_DURATION_SECS: f32 = 60.0;

    /// Highest sample rate accepted for synthesized buffers
    pub const MAX_SAMPLE_RATE: u32 = 192_000;

    /// Initial volume of a fresh engine
    pub const DEFAULT_VOLUME: f32 = 0.5;
}

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("Soundscape/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 5;

    /// Read timeout in seconds for full asset downloads
    pub const READ_TIMEOUT_SECS: u64 = 30;

    /// Overall timeout for an availability check in seconds
    pub const PROBE_TIMEOUT_SECS: u64 = 5;

    /// File extension of hosted ambience assets
    pub const ASSET_EXTENSION: &str = "mp3";
}

/// Timeout configuration
pub mod timeouts {
    /// Default bound on a remote asset load, in milliseconds
    pub const LOAD_TIMEOUT_MS: u64 = 5_000;
}

/// Frequency sampler configuration
pub mod sampler {
    /// Interval between frequency buffer refreshes (one display frame)
    pub const TICK_INTERVAL_MS: u64 = 16;
}

/// Host-provided engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL that per-ambience asset URLs are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_base_url: Option<String>,

    /// Explicit per-ambience URLs, taking priority over `asset_base_url`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub asset_urls: BTreeMap<SoundType, String>,

    /// Bound on a remote asset load before falling back to synthesis
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Length of synthesized loop buffers
    #[serde(default = "default_sample_duration")]
    pub sample_duration_seconds: f32,

    /// Sample rate of synthesized loop buffers
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_load_timeout_ms() -> u64 {
    timeouts::LOAD_TIMEOUT_MS
}

fn default_sample_duration() -> f32 {
    audio::DEFAULT_SAMPLE_DURATION_SECS
}

fn default_sample_rate() -> u32 {
    audio::DEFAULT_SAMPLE_RATE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_base_url: None,
            asset_urls: BTreeMap::new(),
            load_timeout_ms: default_load_timeout_ms(),
            sample_duration_seconds: default_sample_duration(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl EngineConfig {
    /// Config that resolves every ambience against `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            asset_base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(SoundscapeError::Config(format!(
                    "Failed to read {:?}: {}",
                    path, e
                )))
            }
        };
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if let Some(ref base) = self.asset_base_url {
            check_url(base)?;
        }
        for (sound, url) in &self.asset_urls {
            if *sound == SoundType::None {
                return Err(SoundscapeError::Config(
                    "\"none\" cannot have an asset URL".to_string(),
                ));
            }
            check_url(url)?;
        }
        if !(self.sample_duration_seconds.is_finite() && self.sample_duration_seconds > 0.0) {
            return Err(SoundscapeError::Config(format!(
                "sample_duration_seconds must be positive, got {}",
                self.sample_duration_seconds
            )));
        }
        if self.sample_duration_seconds > audio::MAX_SAMPLE_DURATION_SECS {
            return Err(SoundscapeError::Config(format!(
                "sample_duration_seconds must be at most {}, got {}",
                audio::MAX_SAMPLE_DURATION_SECS,
                self.sample_duration_seconds
            )));
        }
        if self.sample_rate == 0 {
            return Err(SoundscapeError::Config(
                "sample_rate must be non-zero".to_string(),
            ));
        }
        if self.sample_rate > audio::MAX_SAMPLE_RATE {
            return Err(SoundscapeError::Config(format!(
                "sample_rate must be at most {}, got {}",
                audio::MAX_SAMPLE_RATE,
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Load timeout as a `Duration`
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Bound on an availability check; never longer than the load itself
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(network::PROBE_TIMEOUT_SECS).min(self.load_timeout())
    }

    /// The canonical asset URL for an ambience, if one is configured
    pub fn asset_url(&self, sound: SoundType) -> Option<String> {
        let name = sound.asset_name()?;
        if let Some(url) = self.asset_urls.get(&sound) {
            return Some(url.clone());
        }
        let base = self.asset_base_url.as_deref()?.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(format!("{}/{}.{}", base, name, network::ASSET_EXTENSION))
    }
}

fn check_url(url: &str) -> Result<()> {
    let lower = url.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(SoundscapeError::Config(format!(
            "Asset URL must be http(s): {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Defaults ---

    #[test]
    fn defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.load_timeout_ms, 5_000);
        assert_eq!(config.load_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.sample_rate, 44_100);
        assert!(config.asset_base_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn frequency_bins_are_half_fft() {
        assert_eq!(audio::FREQUENCY_BIN_COUNT, 128);
    }

    #[test]
    fn probe_timeout_is_capped_by_load_timeout() {
        let short = EngineConfig {
            load_timeout_ms: 800,
            ..EngineConfig::default()
        };
        assert_eq!(short.probe_timeout(), Duration::from_millis(800));

        let long = EngineConfig {
            load_timeout_ms: 60_000,
            ..EngineConfig::default()
        };
        assert_eq!(
            long.probe_timeout(),
            Duration::from_secs(network::PROBE_TIMEOUT_SECS)
        );
    }

    // --- URL resolution ---

    #[test]
    fn no_base_url_means_no_asset() {
        let config = EngineConfig::default();
        assert_eq!(config.asset_url(SoundType::Rain), None);
    }

    #[test]
    fn base_url_resolves_per_sound() {
        let config = EngineConfig::with_base_url("https://cdn.example.com/ambience/");
        assert_eq!(
            config.asset_url(SoundType::WhiteNoise).as_deref(),
            Some("https://cdn.example.com/ambience/white-noise.mp3")
        );
        assert_eq!(
            config.asset_url(SoundType::Ocean).as_deref(),
            Some("https://cdn.example.com/ambience/ocean.mp3")
        );
    }

    #[test]
    fn none_never_has_an_asset() {
        let config = EngineConfig::with_base_url("https://cdn.example.com");
        assert_eq!(config.asset_url(SoundType::None), None);
    }

    #[test]
    fn override_wins_over_base() {
        let mut config = EngineConfig::with_base_url("https://cdn.example.com");
        config
            .asset_urls
            .insert(SoundType::Cafe, "https://other.example.com/cafe.ogg".into());
        assert_eq!(
            config.asset_url(SoundType::Cafe).as_deref(),
            Some("https://other.example.com/cafe.ogg")
        );
        assert_eq!(
            config.asset_url(SoundType::Rain).as_deref(),
            Some("https://cdn.example.com/rain.mp3")
        );
    }

    // --- Validation ---

    #[test]
    fn rejects_non_http_base() {
        let config = EngineConfig::with_base_url("ftp://example.com");
        assert!(matches!(
            config.validate(),
            Err(SoundscapeError::Config(_))
        ));
    }

    #[test]
    fn rejects_zero_duration() {
        let config = EngineConfig {
            sample_duration_seconds: 0.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversized_loops() {
        let long = EngineConfig {
            sample_duration_seconds: 1e7,
            ..EngineConfig::default()
        };
        assert!(matches!(long.validate(), Err(SoundscapeError::Config(_))));

        let fast = EngineConfig {
            sample_rate: audio::MAX_SAMPLE_RATE + 1,
            ..EngineConfig::default()
        };
        assert!(matches!(fast.validate(), Err(SoundscapeError::Config(_))));

        let edge = EngineConfig {
            sample_duration_seconds: audio::MAX_SAMPLE_DURATION_SECS,
            sample_rate: audio::MAX_SAMPLE_RATE,
            ..EngineConfig::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn rejects_url_for_none() {
        let mut config = EngineConfig::default();
        config
            .asset_urls
            .insert(SoundType::None, "https://example.com/none.mp3".into());
        assert!(config.validate().is_err());
    }

    // --- Persistence ---

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soundscape.json");
        fs::write(
            &path,
            r#"{ "asset_base_url": "https://cdn.example.com", "asset_urls": { "white-noise": "https://x.example.com/wn.mp3" } }"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.load_timeout_ms, 5_000);
        assert_eq!(
            config.asset_url(SoundType::WhiteNoise).as_deref(),
            Some("https://x.example.com/wn.mp3")
        );
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soundscape.json");
        let mut config = EngineConfig::with_base_url("https://cdn.example.com");
        config.load_timeout_ms = 1_500;
        config.sample_duration_seconds = 4.0;
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(SoundscapeError::Json(_))
        ));
    }
}
