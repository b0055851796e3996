//! Procedural ambience synthesis
//!
//! Produces finite, seamlessly loopable mono buffers for every ambience so
//! the engine always has something to play when no hosted asset is reachable.

pub mod ambiences;
pub mod dsp;

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::types::SoundType;
use crate::config::audio::{
    DEFAULT_SAMPLE_DURATION_SECS, DEFAULT_SAMPLE_RATE, MAX_SAMPLE_DURATION_SECS, MAX_SAMPLE_RATE,
};
use crate::error::{Result, SoundscapeError};

use ambiences::SynthContext;

/// Overlap folded back over the head of each buffer to hide the loop point
const SEAM_FADE_SECS: f32 = 0.05;

/// Peak ceiling applied after synthesis
const PEAK_CEILING: f32 = 0.95;

/// A finished mono loop buffer
#[derive(Debug, Clone)]
pub struct SynthBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SynthBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample data
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        1
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        (self.samples.iter().map(|s| s * s).sum::<f32>() / self.samples.len() as f32).sqrt()
    }
}

/// Synthesize one loop buffer for `sound`.
///
/// `SoundType::None` has nothing to synthesize and is rejected, as are a zero
/// sample rate, a non-positive duration and anything above the configured
/// maximums.
pub fn generate<R: Rng + ?Sized>(
    sound: SoundType,
    sample_rate: u32,
    duration_secs: f32,
    rng: &mut R,
) -> Result<SynthBuffer> {
    if sample_rate == 0 {
        return Err(SoundscapeError::Synthesis(
            "sample rate must be non-zero".to_string(),
        ));
    }
    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(SoundscapeError::Synthesis(format!(
            "invalid loop duration: {duration_secs}"
        )));
    }
    if sample_rate > MAX_SAMPLE_RATE {
        return Err(SoundscapeError::Synthesis(format!(
            "sample rate {sample_rate} exceeds {MAX_SAMPLE_RATE} Hz"
        )));
    }
    if duration_secs > MAX_SAMPLE_DURATION_SECS {
        return Err(SoundscapeError::Synthesis(format!(
            "loop duration {duration_secs}s exceeds {MAX_SAMPLE_DURATION_SECS}s"
        )));
    }

    let len = (duration_secs * sample_rate as f32).round() as usize;
    if len == 0 {
        return Err(SoundscapeError::Synthesis(format!(
            "{duration_secs}s at {sample_rate} Hz yields no samples"
        )));
    }
    let fade = ((SEAM_FADE_SECS * sample_rate as f32) as usize).min(len / 4);
    let ctx = SynthContext {
        sample_rate: sample_rate as f32,
        duration: duration_secs,
        total: len + fade,
    };

    let mut samples = match sound {
        SoundType::Rain => ambiences::rain(&ctx, rng),
        SoundType::Forest => ambiences::forest(&ctx, rng),
        SoundType::Cafe => ambiences::cafe(&ctx, rng),
        SoundType::WhiteNoise => ambiences::white_noise(&ctx, rng),
        SoundType::Ocean => ambiences::ocean(&ctx, rng),
        SoundType::Space => ambiences::space(&ctx, rng),
        SoundType::None => {
            return Err(SoundscapeError::Synthesis(
                "\"none\" has no ambience to synthesize".to_string(),
            ))
        }
    };

    dsp::seal_loop(&mut samples, fade);
    dsp::limit_peak(&mut samples, PEAK_CEILING);

    Ok(SynthBuffer::new(samples, sample_rate))
}

/// Generator bound to a fixed sample rate and loop length
#[derive(Debug, Clone)]
pub struct ProceduralGenerator {
    sample_rate: u32,
    duration_secs: f32,
    seed: Option<u64>,
}

impl Default for ProceduralGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_SAMPLE_DURATION_SECS)
    }
}

impl ProceduralGenerator {
    pub fn new(sample_rate: u32, duration_secs: f32) -> Self {
        Self {
            sample_rate,
            duration_secs,
            seed: None,
        }
    }

    /// Fix the random seed so every call yields identical buffers
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration_secs
    }

    pub fn generate(&self, sound: SoundType) -> Result<SynthBuffer> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        generate(sound, self.sample_rate, self.duration_secs, &mut rng)
    }
}
