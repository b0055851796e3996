//! Frequency analysis
//!
//! `Analyser` keeps the most recent `FFT_SIZE` output samples and turns them
//! into byte frequency data on request: Blackman window, FFT, per-bin
//! magnitude smoothing, then decibels mapped onto 0..=255.
//!
//! `AnalyzingSource` wraps any `rodio::Source` and feeds a downmixed copy of
//! everything it yields into an `Analyser`.

use std::f32::consts::PI;
use std::num::NonZero;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::Source;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::audio::{
    FFT_SIZE, FREQUENCY_BIN_COUNT, MAX_DECIBELS, MIN_DECIBELS, SMOOTHING_TIME_CONSTANT,
};

/// Frames collected locally before taking the analyser lock
const PUSH_CHUNK_FRAMES: usize = 64;

struct AnalyserState {
    ring: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    samples_seen: u64,
}

/// Shared analyser node
pub struct Analyser {
    state: Mutex<AnalyserState>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyser {
    pub fn new() -> Self {
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = i as f32 / FFT_SIZE as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();
        Self {
            state: Mutex::new(AnalyserState {
                ring: vec![0.0; FFT_SIZE],
                write_pos: 0,
                smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
                samples_seen: 0,
            }),
            fft: FftPlanner::new().plan_fft_forward(FFT_SIZE),
            window,
        }
    }

    pub fn fft_size(&self) -> usize {
        FFT_SIZE
    }

    pub fn frequency_bin_count(&self) -> usize {
        FREQUENCY_BIN_COUNT
    }

    /// Append mono samples to the analysis window
    pub fn push(&self, samples: &[f32]) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for &s in samples {
            let pos = state.write_pos;
            state.ring[pos] = s;
            state.write_pos = (pos + 1) % FFT_SIZE;
        }
        state.samples_seen += samples.len() as u64;
    }

    /// Total mono samples observed since creation or the last reset
    pub fn samples_seen(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .samples_seen
    }

    /// Forget the window contents and smoothing history
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.ring.fill(0.0);
        state.smoothed.fill(0.0);
        state.write_pos = 0;
        state.samples_seen = 0;
    }

    /// Write the current spectrum into `out`, one byte per bin.
    ///
    /// Writes `min(out.len(), FREQUENCY_BIN_COUNT)` bytes; the rest of `out`
    /// is left untouched.
    pub fn get_byte_frequency_data(&self, out: &mut [u8]) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // Oldest sample first
        let start = state.write_pos;
        let mut spectrum: Vec<Complex<f32>> = (0..FFT_SIZE)
            .map(|i| {
                let s = state.ring[(start + i) % FFT_SIZE];
                Complex::new(s * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut spectrum);

        let norm = 1.0 / FFT_SIZE as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (k, bin) in spectrum.iter().take(FREQUENCY_BIN_COUNT).enumerate() {
            let mag = bin.norm() * norm;
            let smoothed = SMOOTHING_TIME_CONSTANT * state.smoothed[k]
                + (1.0 - SMOOTHING_TIME_CONSTANT) * mag;
            state.smoothed[k] = smoothed;

            if let Some(slot) = out.get_mut(k) {
                *slot = if smoothed > 0.0 {
                    let db = 20.0 * smoothed.log10();
                    (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }
    }
}

/// Wrapper source that copies everything it plays into an `Analyser`
pub struct AnalyzingSource<S> {
    inner: S,
    analyser: Arc<Analyser>,
    chunk: Vec<f32>,
    frame_sum: f32,
    frame_pos: u16,
    channels: NonZero<u16>,
    sample_rate: NonZero<u32>,
}

impl<S> AnalyzingSource<S>
where
    S: Source,
{
    pub fn new(source: S, analyser: Arc<Analyser>) -> Self {
        let channels = source.channels();
        let sample_rate = source.sample_rate();
        Self {
            inner: source,
            analyser,
            chunk: Vec::with_capacity(PUSH_CHUNK_FRAMES),
            frame_sum: 0.0,
            frame_pos: 0,
            channels,
            sample_rate,
        }
    }

    fn flush(&mut self) {
        if !self.chunk.is_empty() {
            self.analyser.push(&self.chunk);
            self.chunk.clear();
        }
    }
}

impl<S> Iterator for AnalyzingSource<S>
where
    S: Source,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = match self.inner.next() {
            Some(s) => s,
            None => {
                self.flush();
                return None;
            }
        };

        self.frame_sum += sample;
        self.frame_pos += 1;
        if self.frame_pos >= self.channels.get() {
            self.chunk.push(self.frame_sum / self.channels.get() as f32);
            self.frame_sum = 0.0;
            self.frame_pos = 0;
            if self.chunk.len() >= PUSH_CHUNK_FRAMES {
                self.flush();
            }
        }

        Some(sample)
    }
}

impl<S> Source for AnalyzingSource<S>
where
    S: Source,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> NonZero<u16> {
        self.channels
    }

    fn sample_rate(&self) -> NonZero<u32> {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
