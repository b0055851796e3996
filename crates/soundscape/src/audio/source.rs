//! Looping playback sources
//!
//! Both synthetic buffers and decoded remote tracks play as a
//! `LoopingSource`: a shared interleaved sample slice that wraps around
//! forever until its connection is closed.

use std::num::NonZero;
use std::sync::Arc;
use std::time::Duration;

use rodio::Source;

use crate::error::{Result, SoundscapeError};
use crate::stream::decoder::RemoteTrack;
use crate::synth::SynthBuffer;

/// Endless source over a shared sample buffer
#[derive(Clone)]
pub struct LoopingSource {
    samples: Arc<[f32]>,
    pos: usize,
    channels: NonZero<u16>,
    sample_rate: NonZero<u32>,
}

impl LoopingSource {
    pub fn new(samples: Arc<[f32]>, channels: u16, sample_rate: u32) -> Result<Self> {
        let channels = NonZero::new(channels)
            .ok_or_else(|| SoundscapeError::Graph("source has zero channels".to_string()))?;
        let sample_rate = NonZero::new(sample_rate)
            .ok_or_else(|| SoundscapeError::Graph("source has zero sample rate".to_string()))?;
        if samples.is_empty() {
            return Err(SoundscapeError::Graph("cannot loop an empty buffer".to_string()));
        }
        if samples.len() % channels.get() as usize != 0 {
            return Err(SoundscapeError::Graph(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            pos: 0,
            channels,
            sample_rate,
        })
    }

    pub fn from_buffer(buffer: &SynthBuffer) -> Result<Self> {
        Self::new(
            buffer.shared_samples(),
            buffer.channels(),
            buffer.sample_rate(),
        )
    }

    pub fn from_track(track: &RemoteTrack) -> Result<Self> {
        Self::new(track.shared_samples(), track.channels(), track.sample_rate())
    }

    /// Length of one pass through the buffer
    pub fn loop_duration(&self) -> Duration {
        let frames = self.samples.len() / self.channels.get() as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate.get() as f64)
    }
}

impl Iterator for LoopingSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.samples[self.pos];
        self.pos += 1;
        if self.pos == self.samples.len() {
            self.pos = 0;
        }
        Some(sample)
    }
}

impl Source for LoopingSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> NonZero<u16> {
        self.channels
    }

    fn sample_rate(&self) -> NonZero<u32> {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
