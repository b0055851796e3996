//! Shared audio types
//!
//! Pure data types used across the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::audio::DEFAULT_VOLUME;
use crate::error::SoundscapeError;

/// One of the fixed ambiences, or `None` for silence
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum SoundType {
    Rain,
    Forest,
    Cafe,
    WhiteNoise,
    Ocean,
    Space,
    #[default]
    None,
}

impl SoundType {
    /// Every playable ambience, in menu order
    pub const AMBIENCES: [SoundType; 6] = [
        SoundType::Rain,
        SoundType::Forest,
        SoundType::Cafe,
        SoundType::WhiteNoise,
        SoundType::Ocean,
        SoundType::Space,
    ];

    /// Canonical kebab-case name
    pub fn name(self) -> &'static str {
        match self {
            SoundType::Rain => "rain",
            SoundType::Forest => "forest",
            SoundType::Cafe => "cafe",
            SoundType::WhiteNoise => "white-noise",
            SoundType::Ocean => "ocean",
            SoundType::Space => "space",
            SoundType::None => "none",
        }
    }

    /// Asset file stem, `None` for silence
    pub fn asset_name(self) -> Option<&'static str> {
        match self {
            SoundType::None => None,
            other => Some(other.name()),
        }
    }

    pub fn is_none(self) -> bool {
        self == SoundType::None
    }
}

impl fmt::Display for SoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SoundType {
    type Err = SoundscapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "rain" => Ok(SoundType::Rain),
            "forest" => Ok(SoundType::Forest),
            "cafe" => Ok(SoundType::Cafe),
            "white-noise" | "whitenoise" => Ok(SoundType::WhiteNoise),
            "ocean" => Ok(SoundType::Ocean),
            "space" => Ok(SoundType::Space),
            "none" | "" => Ok(SoundType::None),
            _ => Err(SoundscapeError::Config(format!("Unknown ambience: {s}"))),
        }
    }
}

impl TryFrom<String> for SoundType {
    type Error = SoundscapeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SoundType> for String {
    fn from(sound: SoundType) -> Self {
        sound.name().to_string()
    }
}

/// Where the currently connected audio comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Streamed from a hosted asset
    Remote,
    /// Generated in-process
    Synthetic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Remote => write!(f, "Remote"),
            SourceKind::Synthetic => write!(f, "Synthetic"),
        }
    }
}

/// Controller lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    #[default]
    Idle,
    /// Resolving availability or loading; nothing connected yet
    Starting,
    /// Exactly one source connected and running
    Playing,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnginePhase::Idle => write!(f, "Idle"),
            EnginePhase::Starting => write!(f, "Starting"),
            EnginePhase::Playing => write!(f, "Playing"),
        }
    }
}

/// Observable playback state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub current_sound: SoundType,
    pub is_playing: bool,
    /// Last explicit volume, kept while muted
    pub volume: f32,
    pub is_muted: bool,
    pub phase: EnginePhase,
    /// Kind of the connected source, if any
    pub source: Option<SourceKind>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_sound: SoundType::None,
            is_playing: false,
            volume: DEFAULT_VOLUME,
            is_muted: false,
            phase: EnginePhase::Idle,
            source: None,
        }
    }
}

impl PlaybackState {
    /// Gain actually applied to the output
    pub fn effective_gain(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            self.volume
        }
    }

    /// Drop back to idle, keeping volume and mute
    pub(crate) fn reset_to_idle(&mut self) {
        self.current_sound = SoundType::None;
        self.is_playing = false;
        self.phase = EnginePhase::Idle;
        self.source = None;
    }
}

/// How a `play_sound` request settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A hosted asset is playing
    Remote,
    /// A synthesized loop is playing
    Synthetic,
    /// The request was `SoundType::None`
    Stopped,
    /// A newer request or a stop replaced this one before it connected
    Superseded,
    /// Synthesis failed; nothing is playing
    Failed(String),
}

impl From<SourceKind> for PlayOutcome {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Remote => PlayOutcome::Remote,
            SourceKind::Synthetic => PlayOutcome::Synthetic,
        }
    }
}
