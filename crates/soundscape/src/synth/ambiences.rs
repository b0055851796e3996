//! Per-ambience synthesis routines
//!
//! Each routine fills `ctx.total` mono samples. They share one recipe:
//! a filtered noise floor, sparse transient or tonal events, and one-pole
//! smoothing somewhere in the chain.

use std::f32::consts::TAU;

use rand::Rng;

use super::dsp::{
    burst_envelope, loop_aligned_hz, white, MovingAverage, OnePole, Oscillator,
};

/// Shared parameters for one synthesis run
#[derive(Debug, Clone, Copy)]
pub struct SynthContext {
    pub sample_rate: f32,
    /// Loop length in seconds (without the seam overlap)
    pub duration: f32,
    /// Samples to produce, including the seam overlap
    pub total: usize,
}

impl SynthContext {
    #[inline]
    fn time(&self, i: usize) -> f32 {
        i as f32 / self.sample_rate
    }

    /// Per-sample probability for an event that fires `rate_hz` times a second
    #[inline]
    fn chance(&self, rate_hz: f32) -> f32 {
        rate_hz / self.sample_rate
    }

    /// Step closest to `nominal` such that whole `phases`-step cycles fill
    /// the loop exactly
    fn aligned_step(&self, nominal: f32, phases: usize) -> f32 {
        let cycle = nominal * phases as f32;
        let cycles = (self.duration / cycle).round().max(1.0);
        self.duration / (cycles * phases as f32)
    }
}

// =============================================================================
// Rain
// =============================================================================

const RAIN_BED_ALPHA: f32 = 0.35;
const RAIN_BED_LEVEL: f32 = 0.35;
const DROPLET_RATE_HZ: f32 = 18.0;
const DROPLET_LEN_SECS: f32 = 0.06;
const DROPLET_LEVEL: f32 = 0.22;

struct Droplet {
    start: usize,
    freq: f32,
    level: f32,
}

pub fn rain<R: Rng + ?Sized>(ctx: &SynthContext, rng: &mut R) -> Vec<f32> {
    let mut bed = OnePole::new(RAIN_BED_ALPHA);
    let mut drops: Vec<Droplet> = Vec::new();
    let drop_len = (DROPLET_LEN_SECS * ctx.sample_rate) as usize;
    let mut out = Vec::with_capacity(ctx.total);

    for i in 0..ctx.total {
        if rng.gen::<f32>() < ctx.chance(DROPLET_RATE_HZ) {
            drops.push(Droplet {
                start: i,
                freq: rng.gen_range(800.0..2000.0),
                level: rng.gen_range(0.5..1.0),
            });
        }
        drops.retain(|d| i - d.start < drop_len);

        let mut transient = 0.0;
        for d in &drops {
            let t = ctx.time(i - d.start);
            transient += (TAU * d.freq * t).sin() * burst_envelope(t, 60.0, 800.0) * d.level;
        }

        out.push(bed.process(white(rng)) * RAIN_BED_LEVEL + transient * DROPLET_LEVEL);
    }
    out
}

// =============================================================================
// Forest
// =============================================================================

const FOREST_BED_ALPHA: f32 = 0.05;
const FOREST_BED_LEVEL: f32 = 0.08;
const CHIRP_PITCHES: [f32; 4] = [2200.0, 2800.0, 3400.0, 4100.0];
const CHIRP_RATE_HZ: f32 = 1.6;
const CHIRP_LEN_SECS: f32 = 0.14;
const CHIRP_LEVEL: f32 = 0.2;
const VIBRATO_HZ: f32 = 5.0;
const VIBRATO_DEPTH: f32 = 0.04;
/// Nominal length of one gate phase; four phases make a cycle
const GATE_PHASE_SECS: f32 = 2.0;
const GATE_WEIGHTS: [f32; 4] = [1.0, 0.35, 1.4, 0.0];

struct Chirp {
    start: usize,
    base: f32,
    osc: Oscillator,
}

pub fn forest<R: Rng + ?Sized>(ctx: &SynthContext, rng: &mut R) -> Vec<f32> {
    let mut bed = OnePole::new(FOREST_BED_ALPHA);
    let mut chirps: Vec<Chirp> = Vec::new();
    let chirp_len = (CHIRP_LEN_SECS * ctx.sample_rate) as usize;
    let gate_step = ctx.aligned_step(GATE_PHASE_SECS, GATE_WEIGHTS.len());
    let mut next_pitch = 0usize;
    let mut out = Vec::with_capacity(ctx.total);

    for i in 0..ctx.total {
        let t = ctx.time(i);
        let gate = GATE_WEIGHTS[(t / gate_step) as usize % GATE_WEIGHTS.len()];

        if gate > 0.0 && rng.gen::<f32>() < ctx.chance(CHIRP_RATE_HZ * gate) {
            chirps.push(Chirp {
                start: i,
                base: CHIRP_PITCHES[next_pitch],
                osc: Oscillator::default(),
            });
            next_pitch = (next_pitch + 1) % CHIRP_PITCHES.len();
        }
        chirps.retain(|c| i - c.start < chirp_len);

        let mut song = 0.0;
        for c in chirps.iter_mut() {
            let local = ctx.time(i - c.start);
            let freq = c.base * (1.0 + VIBRATO_DEPTH * (TAU * VIBRATO_HZ * local).sin());
            song += c.osc.next(freq, ctx.sample_rate) * burst_envelope(local, 25.0, 300.0);
        }

        out.push(bed.process(white(rng)) * FOREST_BED_LEVEL + song * CHIRP_LEVEL);
    }
    out
}

// =============================================================================
// Cafe
// =============================================================================

const CAFE_BED_ALPHA: f32 = 0.08;
const CAFE_BED_LEVEL: f32 = 0.25;
const CHORD_SECS: f32 = 2.0;
const CHORD_DECAY: f32 = 1.2;
const CHORD_LEVEL: f32 = 0.07;
const ROOM_TONE_WINDOW: usize = 8;
/// C, Am, F, G
const CHORDS: [&[f32]; 4] = [
    &[261.63, 329.63, 392.00],
    &[220.00, 261.63, 329.63],
    &[174.61, 220.00],
    &[196.00, 246.94, 293.66],
];

pub fn cafe<R: Rng + ?Sized>(ctx: &SynthContext, rng: &mut R) -> Vec<f32> {
    let mut bed = OnePole::new(CAFE_BED_ALPHA);
    let mut room = MovingAverage::new(ROOM_TONE_WINDOW);
    let chord_step = ctx.aligned_step(CHORD_SECS, CHORDS.len());
    let mut out = Vec::with_capacity(ctx.total);

    for i in 0..ctx.total {
        let t = ctx.time(i);
        let chord = CHORDS[(t / chord_step) as usize % CHORDS.len()];
        let local = t % chord_step;
        let decay = (-CHORD_DECAY * local).exp();

        let harmony: f32 = chord.iter().map(|f| (TAU * f * t).sin()).sum::<f32>()
            * decay
            * CHORD_LEVEL;
        let chatter = bed.process(white(rng)) * CAFE_BED_LEVEL;

        out.push(room.process(chatter + harmony));
    }
    out
}

// =============================================================================
// White noise
// =============================================================================

pub const WHITE_NOISE_LEVEL: f32 = 0.25;

pub fn white_noise<R: Rng + ?Sized>(ctx: &SynthContext, rng: &mut R) -> Vec<f32> {
    (0..ctx.total)
        .map(|_| white(rng) * WHITE_NOISE_LEVEL)
        .collect()
}

// =============================================================================
// Ocean
// =============================================================================

const WAVE_PERIOD_SECS: f32 = 8.0;
const BUILD_END: f32 = 0.6;
const CRASH_END: f32 = 0.75;
const SURF_ALPHA: f32 = 0.2;
const OUTPUT_ALPHA: f32 = 0.5;
const SPLASH_PITCHES: [f32; 2] = [2800.0, 3600.0];

pub fn ocean<R: Rng + ?Sized>(ctx: &SynthContext, rng: &mut R) -> Vec<f32> {
    let waves = (ctx.duration / WAVE_PERIOD_SECS).round().max(1.0);
    let period = ctx.duration / waves;
    let mut surf = OnePole::new(SURF_ALPHA);
    let mut output = OnePole::new(OUTPUT_ALPHA);
    let mut out = Vec::with_capacity(ctx.total);

    for i in 0..ctx.total {
        let t = ctx.time(i);
        let p = (t % period) / period;
        let filtered = surf.process(white(rng));

        let s = if p < BUILD_END {
            let progress = p / BUILD_END;
            (TAU * 60.0 * t).sin() * 0.15 * progress + filtered * 0.35 * progress
        } else if p < CRASH_END {
            let c = (p - BUILD_END) / (CRASH_END - BUILD_END);
            let env = burst_envelope(c, 4.0, 40.0);
            let splash: f32 = SPLASH_PITCHES.iter().map(|f| (TAU * f * t).sin()).sum();
            white(rng) * 0.8 * env + splash * 0.04 * env
        } else {
            let r = (p - CRASH_END) / (1.0 - CRASH_END);
            let decay = (-3.0 * r).exp();
            filtered * 0.4 * decay + (TAU * 45.0 * t).sin() * 0.1 * decay
        };

        out.push(output.process(s));
    }
    out
}

// =============================================================================
// Space
// =============================================================================

const SPACE_FUNDAMENTAL_HZ: f32 = 55.0;
/// (multiple of the fundamental, level)
const SPACE_PARTIALS: [(f32, f32); 4] = [(1.0, 0.10), (1.5, 0.05), (2.0, 0.07), (3.0, 0.04)];
const SPACE_LFO_HZ: f32 = 0.1;
const SPACE_FLOOR_ALPHA: f32 = 0.02;
const SPACE_FLOOR_LEVEL: f32 = 0.05;
const PING_RATE_HZ: f32 = 0.15;
const PING_LEN_SECS: f32 = 1.5;
const PING_SWEEP: f32 = 1.5;
const PING_LEVEL: f32 = 0.12;

struct Ping {
    start: usize,
    base: f32,
    osc: Oscillator,
}

pub fn space<R: Rng + ?Sized>(ctx: &SynthContext, rng: &mut R) -> Vec<f32> {
    let lfo_hz = loop_aligned_hz(SPACE_LFO_HZ, ctx.duration);
    let mut floor = OnePole::new(SPACE_FLOOR_ALPHA);
    let mut pings: Vec<Ping> = Vec::new();
    let ping_len = (PING_LEN_SECS * ctx.sample_rate) as usize;
    let mut out = Vec::with_capacity(ctx.total);

    for i in 0..ctx.total {
        let t = ctx.time(i);
        let drone: f32 = SPACE_PARTIALS
            .iter()
            .map(|(mult, level)| (TAU * SPACE_FUNDAMENTAL_HZ * mult * t).sin() * level)
            .sum();
        let swell = 0.6 + 0.4 * (TAU * lfo_hz * t).sin();

        if rng.gen::<f32>() < ctx.chance(PING_RATE_HZ) {
            pings.push(Ping {
                start: i,
                base: rng.gen_range(600.0..900.0),
                osc: Oscillator::default(),
            });
        }
        pings.retain(|p| i - p.start < ping_len);

        let mut sonar = 0.0;
        for p in pings.iter_mut() {
            let local = ctx.time(i - p.start);
            let freq = p.base * (1.0 + PING_SWEEP * local);
            sonar += p.osc.next(freq, ctx.sample_rate) * burst_envelope(local, 3.0, 200.0);
        }

        out.push(
            drone * swell
                + floor.process(white(rng)) * SPACE_FLOOR_LEVEL
                + sonar * PING_LEVEL,
        );
    }
    out
}
