//! Soundscape: ambient soundscape engine
//!
//! Plays one named ambience at a time, streaming a hosted asset when it is
//! reachable and falling back to a procedurally synthesized loop otherwise.
//!
//! ## Quick start
//!
//! ```no_run
//! use soundscape::audio::{AmbienceEngine, SoundType};
//! use soundscape::config::EngineConfig;
//!
//! let engine = AmbienceEngine::new(EngineConfig::with_base_url("https://cdn.example/ambience"))?;
//! let request = engine.play_sound(SoundType::Rain)?;
//! println!("{:?}", request.wait());
//! let spectrum = engine.frequency_buffer().snapshot();
//! # let _ = spectrum;
//! # Ok::<(), soundscape::error::SoundscapeError>(())
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod stream;
pub mod synth;
