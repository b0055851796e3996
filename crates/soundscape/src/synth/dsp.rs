//! Small DSP building blocks shared by the ambience generators

use std::f32::consts::TAU;

use rand::Rng;

/// One-pole low-pass: `y[n] = α·x[n] + (1−α)·y[n−1]`
#[derive(Debug, Clone)]
pub struct OnePole {
    alpha: f32,
    state: f32,
}

impl OnePole {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.state = self.alpha * input + (1.0 - self.alpha) * self.state;
        self.state
    }
}

/// Boxcar average over the last `len` samples
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: Vec<f32>,
    pos: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(len: usize) -> Self {
        Self {
            window: vec![0.0; len.max(1)],
            pos: 0,
            sum: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        self.sum += input - self.window[self.pos];
        self.window[self.pos] = input;
        self.pos = (self.pos + 1) % self.window.len();
        self.sum / self.window.len() as f32
    }
}

/// Attack/decay shape used by every transient: `exp(−k·t)·(1 − exp(−m·t))`
#[inline]
pub fn burst_envelope(t: f32, decay: f32, attack: f32) -> f32 {
    if t < 0.0 {
        return 0.0;
    }
    (-decay * t).exp() * (1.0 - (-attack * t).exp())
}

/// Uniform white noise in [−1, 1)
#[inline]
pub fn white<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen_range(-1.0f32..1.0)
}

/// Sine oscillator with a running phase, for frequencies that change per sample
#[derive(Debug, Clone, Default)]
pub struct Oscillator {
    phase: f32,
}

impl Oscillator {
    #[inline]
    pub fn next(&mut self, freq_hz: f32, sample_rate: f32) -> f32 {
        let out = self.phase.sin();
        self.phase = (self.phase + TAU * freq_hz / sample_rate) % TAU;
        out
    }
}

/// Fold the `fade` extra samples at the end of `samples` back over its head.
///
/// The tail is the natural continuation of the last kept sample, so after the
/// blend the wrap from the final sample to the first carries no discontinuity.
pub fn seal_loop(samples: &mut Vec<f32>, fade: usize) {
    if fade == 0 || samples.len() <= fade * 2 {
        return;
    }
    let body = samples.len() - fade;
    for i in 0..fade {
        let w = i as f32 / fade as f32;
        samples[i] = samples[i] * w + samples[body + i] * (1.0 - w);
    }
    samples.truncate(body);
}

/// Scale the buffer down if its peak exceeds `ceiling`
pub fn limit_peak(samples: &mut [f32], ceiling: f32) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > ceiling && peak > 0.0 {
        let gain = ceiling / peak;
        for s in samples.iter_mut() {
            *s *= gain;
        }
    }
}

/// Frequency that completes a whole number of cycles over `duration`,
/// as close as possible to `target_hz`
pub fn loop_aligned_hz(target_hz: f32, duration_secs: f32) -> f32 {
    let cycles = (target_hz * duration_secs).round().max(1.0);
    cycles / duration_secs
}
