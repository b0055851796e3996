//! Ambience engine
//!
//! The public playback controller. `play_sound` tears down whatever is
//! playing, then resolves the request on an `ambience-load` worker thread:
//! hosted asset when it is reachable and loads in time, procedural loop
//! otherwise. Each request bumps a generation counter; results from
//! requests that are no longer current are discarded.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use rodio::Source;

use crate::config::EngineConfig;
use crate::error::{Result, SoundscapeError};
use crate::stream::decoder::RemoteTrack;
use crate::stream::loader::{HttpStreamLoader, RemoteStreamLoader, StreamLoader};
use crate::stream::probe::{AssetCheck, AvailabilityProbe, HttpAssetCheck};
use crate::synth::{ProceduralGenerator, SynthBuffer};

use super::graph::{AudioGraph, Connection, DeviceFactory};
use super::output::RodioOutput;
use super::sampler::{FrequencyBuffer, FrequencySampler};
use super::source::LoopingSource;
use super::types::{EnginePhase, PlayOutcome, PlaybackState, SoundType, SourceKind};

/// Failure reported when a load worker dies without settling its request
const WORKER_EXITED: &str = "load worker exited";

/// The source currently connected to the graph
pub enum ActiveSource {
    Synthetic {
        sound: SoundType,
        buffer: SynthBuffer,
        connection: Connection,
    },
    Remote {
        sound: SoundType,
        track: RemoteTrack,
        connection: Connection,
    },
}

impl ActiveSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ActiveSource::Synthetic { .. } => SourceKind::Synthetic,
            ActiveSource::Remote { .. } => SourceKind::Remote,
        }
    }

    pub fn sound(&self) -> SoundType {
        match self {
            ActiveSource::Synthetic { sound, .. } | ActiveSource::Remote { sound, .. } => *sound,
        }
    }

    pub fn connection(&self) -> &Connection {
        match self {
            ActiveSource::Synthetic { connection, .. }
            | ActiveSource::Remote { connection, .. } => connection,
        }
    }
}

/// Audio ready to connect, produced off the engine lock
enum Prepared {
    Remote(RemoteTrack),
    Synthetic(SynthBuffer),
}

/// Handle to an in-flight `play_sound` request
pub struct PlayRequest {
    sound: SoundType,
    generation: u64,
    outcome_rx: Receiver<PlayOutcome>,
}

impl PlayRequest {
    fn settled(sound: SoundType, generation: u64, outcome: PlayOutcome) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(outcome);
        Self {
            sound,
            generation,
            outcome_rx: rx,
        }
    }

    pub fn sound(&self) -> SoundType {
        self.sound
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Block until the request settles
    pub fn wait(self) -> PlayOutcome {
        self.outcome_rx
            .recv()
            .unwrap_or_else(|_| PlayOutcome::Failed(WORKER_EXITED.to_string()))
    }

    /// Block for at most `timeout`; `None` if the request is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PlayOutcome> {
        match self.outcome_rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(PlayOutcome::Failed(WORKER_EXITED.to_string()))
            }
        }
    }
}

struct EngineInner {
    graph: AudioGraph,
    active: Option<ActiveSource>,
    state: PlaybackState,
    /// Monotonically increasing counter to discard stale load results
    request_generation: u64,
    sampler: FrequencySampler,
    disposed: bool,
}

impl EngineInner {
    /// Disconnect the active source, stop sampling, return to Idle
    fn teardown(&mut self) {
        self.sampler.stop();
        if let Some(active) = self.active.take() {
            debug!(
                "Stopping {} ({}) on connection {}",
                active.sound(),
                active.kind(),
                active.connection().id()
            );
        }
        self.graph.disconnect_source();
        self.state.reset_to_idle();
    }

    fn apply_gain(&self) {
        self.graph.set_gain(self.state.effective_gain());
    }
}

/// Everything a load worker needs besides the shared engine state
#[derive(Clone)]
struct Resolver {
    probe: Arc<AvailabilityProbe>,
    loader: RemoteStreamLoader,
    generator: ProceduralGenerator,
    config: EngineConfig,
}

/// Ambient soundscape playback controller
pub struct AmbienceEngine {
    inner: Arc<Mutex<EngineInner>>,
    resolver: Resolver,
    buffer: Arc<FrequencyBuffer>,
}

impl AmbienceEngine {
    /// Engine backed by HTTP asset access and the default sound card.
    ///
    /// The output device is not opened until the first `play_sound`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let check = Arc::new(HttpAssetCheck::with_timeout(config.probe_timeout())?);
        let loader = Arc::new(HttpStreamLoader::new()?);
        Self::with_parts(config, check, loader, RodioOutput::factory())
    }

    /// Engine with substituted asset access and output device
    pub fn with_parts(
        config: EngineConfig,
        check: Arc<dyn AssetCheck>,
        loader: Arc<dyn StreamLoader>,
        factory: DeviceFactory,
    ) -> Result<Self> {
        config.validate()?;

        let state = PlaybackState::default();
        let buffer = Arc::new(FrequencyBuffer::new());
        let inner = EngineInner {
            graph: AudioGraph::new(factory, state.effective_gain()),
            active: None,
            state,
            request_generation: 0,
            sampler: FrequencySampler::new(buffer.clone()),
            disposed: false,
        };
        let resolver = Resolver {
            probe: Arc::new(AvailabilityProbe::new(check)),
            loader: RemoteStreamLoader::new(loader, config.load_timeout()),
            generator: ProceduralGenerator::new(config.sample_rate, config.sample_duration_seconds),
            config,
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            resolver,
            buffer,
        })
    }

    /// Fix the synthesis seed (reproducible fallback buffers)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.resolver.generator = self.resolver.generator.clone().with_seed(seed);
        self
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.resolver.config
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Switch to `sound`, or stop with `SoundType::None`.
    ///
    /// The previous source is disconnected before this returns. Only an
    /// unavailable output device or a disposed engine are errors; asset
    /// problems fall back to synthesis.
    pub fn play_sound(&self, sound: SoundType) -> Result<PlayRequest> {
        let mut inner = self.lock();
        if inner.disposed {
            return Err(SoundscapeError::Disposed);
        }

        inner.teardown();
        inner.request_generation += 1;
        let generation = inner.request_generation;

        if sound.is_none() {
            info!("Ambience stopped");
            return Ok(PlayRequest::settled(sound, generation, PlayOutcome::Stopped));
        }

        if let Err(e) = inner.graph.resume() {
            error!("Cannot play {}: {}", sound, e);
            return Err(e);
        }
        inner.apply_gain();
        inner.state.current_sound = sound;
        inner.state.phase = EnginePhase::Starting;
        drop(inner);

        info!("Starting {} (request {})", sound, generation);

        let (tx, rx) = bounded(1);
        let shared = self.inner.clone();
        let resolver = self.resolver.clone();
        let spawned = thread::Builder::new()
            .name("ambience-load".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    resolver.run(&shared, sound, generation)
                }))
                .unwrap_or_else(|_| {
                    error!("Load worker for {} panicked", sound);
                    recover_worker(&shared, generation)
                });
                debug!("Request {} settled: {:?}", generation, outcome);
                let _ = tx.send(outcome);
            });

        match spawned {
            Ok(_) => Ok(PlayRequest {
                sound,
                generation,
                outcome_rx: rx,
            }),
            Err(e) => {
                error!("Failed to spawn load thread: {}", e);
                let mut inner = self.lock();
                if inner.request_generation == generation {
                    inner.state.reset_to_idle();
                }
                Ok(PlayRequest::settled(
                    sound,
                    generation,
                    PlayOutcome::Failed(e.to_string()),
                ))
            }
        }
    }

    /// Stop whatever is playing or starting
    pub fn stop_sound(&self) {
        let mut inner = self.lock();
        if inner.disposed {
            return;
        }
        inner.teardown();
        inner.request_generation += 1;
    }

    /// Set the volume, clamped to 0.0..=1.0.
    ///
    /// A positive volume while muted also unmutes.
    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            warn!("Ignoring NaN volume");
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut inner = self.lock();
        inner.state.volume = volume;
        if inner.state.is_muted && volume > 0.0 {
            inner.state.is_muted = false;
        }
        inner.apply_gain();
    }

    /// Flip mute, returning the new mute state. The volume is kept.
    pub fn toggle_mute(&self) -> bool {
        let mut inner = self.lock();
        inner.state.is_muted = !inner.state.is_muted;
        inner.apply_gain();
        inner.state.is_muted
    }

    /// Stop playback and release the output device. Idempotent.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        if inner.disposed {
            return;
        }
        inner.teardown();
        inner.request_generation += 1;
        inner.graph.close();
        inner.disposed = true;
        info!("Ambience engine disposed");
    }

    // =========================================================================
    // Observables
    // =========================================================================

    pub fn current_sound(&self) -> SoundType {
        self.lock().state.current_sound
    }

    pub fn is_playing(&self) -> bool {
        self.lock().state.is_playing
    }

    pub fn volume(&self) -> f32 {
        self.lock().state.volume
    }

    pub fn is_muted(&self) -> bool {
        self.lock().state.is_muted
    }

    pub fn phase(&self) -> EnginePhase {
        self.lock().state.phase
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.lock().state.source
    }

    /// Snapshot of the full playback state
    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    /// Gain currently written to the gain node
    pub fn output_gain(&self) -> f32 {
        self.lock().graph.gain()
    }

    /// Number of sources connected to the graph (never more than one)
    pub fn connected_sources(&self) -> usize {
        self.lock().graph.connected_sources()
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Shared spectrum buffer; the same handle for the engine's lifetime
    pub fn frequency_buffer(&self) -> Arc<FrequencyBuffer> {
        self.buffer.clone()
    }
}

impl Drop for AmbienceEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Resolver {
    fn run(&self, shared: &Mutex<EngineInner>, sound: SoundType, generation: u64) -> PlayOutcome {
        let remote = match self.config.asset_url(sound) {
            Some(url) => self.try_remote(shared, &url, sound, generation),
            None => {
                debug!("No asset URL for {}; synthesizing", sound);
                None
            }
        };

        let prepared = match remote {
            Some(track) => Prepared::Remote(track),
            None => {
                if !is_current(shared, generation) {
                    return PlayOutcome::Superseded;
                }
                match self.generator.generate(sound) {
                    Ok(buffer) => Prepared::Synthetic(buffer),
                    Err(e) => {
                        error!("Synthesis of {} failed: {}", sound, e);
                        return settle_failure(shared, generation, e.to_string());
                    }
                }
            }
        };

        connect(shared, sound, generation, prepared)
    }

    fn try_remote(
        &self,
        shared: &Mutex<EngineInner>,
        url: &str,
        sound: SoundType,
        generation: u64,
    ) -> Option<RemoteTrack> {
        if !is_current(shared, generation) {
            return None;
        }
        if !self.probe.is_available(url) {
            debug!("{} asset unavailable at {}; synthesizing", sound, url);
            return None;
        }
        match self.loader.load(url) {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Falling back to synthesis for {}: {}", sound, e);
                None
            }
        }
    }
}

fn lock_inner(shared: &Mutex<EngineInner>) -> MutexGuard<'_, EngineInner> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

fn is_current(shared: &Mutex<EngineInner>, generation: u64) -> bool {
    let inner = lock_inner(shared);
    !inner.disposed && inner.request_generation == generation
}

fn settle_failure(shared: &Mutex<EngineInner>, generation: u64, reason: String) -> PlayOutcome {
    let mut inner = lock_inner(shared);
    if inner.disposed || inner.request_generation != generation {
        return PlayOutcome::Superseded;
    }
    inner.state.reset_to_idle();
    PlayOutcome::Failed(reason)
}

/// Undo whatever a panicked worker left behind, if its request is current
fn recover_worker(shared: &Mutex<EngineInner>, generation: u64) -> PlayOutcome {
    let mut inner = lock_inner(shared);
    if inner.disposed || inner.request_generation != generation {
        return PlayOutcome::Superseded;
    }
    inner.teardown();
    PlayOutcome::Failed(WORKER_EXITED.to_string())
}

/// Connect prepared audio if the request is still current
fn connect(
    shared: &Mutex<EngineInner>,
    sound: SoundType,
    generation: u64,
    prepared: Prepared,
) -> PlayOutcome {
    let mut inner = lock_inner(shared);
    if inner.disposed || inner.request_generation != generation {
        debug!("Discarding stale {} result (request {})", sound, generation);
        return PlayOutcome::Superseded;
    }

    let looping = match &prepared {
        Prepared::Remote(track) => LoopingSource::from_track(track),
        Prepared::Synthetic(buffer) => LoopingSource::from_buffer(buffer),
    };
    let source: Box<dyn Source + Send> = match looping {
        Ok(source) => Box::new(source),
        Err(e) => {
            error!("Cannot loop {}: {}", sound, e);
            inner.state.reset_to_idle();
            return PlayOutcome::Failed(e.to_string());
        }
    };

    let connection = match inner.graph.connect_source(source) {
        Ok(connection) => connection,
        Err(e) => {
            error!("Cannot connect {}: {}", sound, e);
            inner.state.reset_to_idle();
            return PlayOutcome::Failed(e.to_string());
        }
    };

    let active = match prepared {
        Prepared::Remote(track) => ActiveSource::Remote {
            sound,
            track,
            connection,
        },
        Prepared::Synthetic(buffer) => ActiveSource::Synthetic {
            sound,
            buffer,
            connection,
        },
    };
    let kind = active.kind();
    inner.active = Some(active);
    inner.state.current_sound = sound;
    inner.state.is_playing = true;
    inner.state.phase = EnginePhase::Playing;
    inner.state.source = Some(kind);
    let analyser = inner.graph.analyser();
    inner.sampler.start(analyser);

    info!("Playing {} ({})", sound, kind);
    PlayOutcome::from(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::OfflineOutput;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const BASE: &str = "https://cdn.example/ambience";
    const SETTLE: Duration = Duration::from_secs(5);

    struct FakeCheck {
        available: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakeCheck {
        fn new(available: &[SoundType]) -> Arc<Self> {
            Arc::new(Self {
                available: available
                    .iter()
                    .map(|s| format!("{}/{}.mp3", BASE, s))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl AssetCheck for FakeCheck {
        fn check(&self, url: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.available.contains(url))
        }
    }

    struct FakeLoader {
        delay: Duration,
        fetches: AtomicUsize,
    }

    impl FakeLoader {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fetches: AtomicUsize::new(0),
            })
        }
    }

    impl StreamLoader for FakeLoader {
        fn fetch(&self, _url: &str) -> Result<RemoteTrack> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(RemoteTrack::new(vec![0.2; 4_410 * 2], 2, 44_100))
        }
    }

    fn test_config(timeout_ms: u64) -> EngineConfig {
        EngineConfig {
            load_timeout_ms: timeout_ms,
            sample_duration_seconds: 1.0,
            sample_rate: 22_050,
            ..EngineConfig::with_base_url(BASE)
        }
    }

    fn engine_with(
        config: EngineConfig,
        check: Arc<FakeCheck>,
        loader: Arc<FakeLoader>,
    ) -> (AmbienceEngine, OfflineOutput) {
        let output = OfflineOutput::new();
        let engine = AmbienceEngine::with_parts(config, check, loader, output.factory())
            .unwrap()
            .with_seed(7);
        (engine, output)
    }

    fn offline_engine() -> (AmbienceEngine, OfflineOutput) {
        engine_with(
            test_config(1_000),
            FakeCheck::new(&[]),
            FakeLoader::new(Duration::ZERO),
        )
    }

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + SETTLE;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    // --- Scenarios ---

    #[test]
    fn unavailable_rain_plays_synthetic_and_feeds_frequency_buffer() {
        let (engine, output) = offline_engine();
        let buffer = engine.frequency_buffer();

        let request = engine.play_sound(SoundType::Rain).unwrap();
        assert_eq!(request.wait(), PlayOutcome::Synthetic);
        assert_eq!(engine.current_sound(), SoundType::Rain);
        assert!(engine.is_playing());
        assert_eq!(engine.source_kind(), Some(SourceKind::Synthetic));
        assert_eq!(engine.phase(), EnginePhase::Playing);

        output.render(4_096);
        let frames = buffer.frames();
        assert!(wait_for(|| buffer.frames() > frames));
        assert!(buffer.snapshot().iter().any(|&b| b > 0));
    }

    #[test]
    fn mute_round_trip_restores_volume() {
        let (engine, _output) = offline_engine();
        engine.set_volume(0.8);
        assert!(engine.toggle_mute());
        assert!(engine.is_muted());
        assert_eq!(engine.output_gain(), 0.0);
        assert_eq!(engine.volume(), 0.8);

        assert!(!engine.toggle_mute());
        assert_eq!(engine.output_gain(), 0.8);
        assert_eq!(engine.volume(), 0.8);
    }

    #[test]
    fn ocean_timeout_falls_back_without_connecting_remote() {
        let loader = FakeLoader::new(Duration::from_millis(300));
        let (engine, output) = engine_with(
            test_config(30),
            FakeCheck::new(&[SoundType::Ocean]),
            loader.clone(),
        );

        let request = engine.play_sound(SoundType::Ocean).unwrap();
        assert_eq!(request.wait(), PlayOutcome::Synthetic);
        assert_eq!(loader.fetches.load(Ordering::SeqCst), 1);

        // Let the late load finish; it must not replace the synthetic loop
        thread::sleep(Duration::from_millis(400));
        assert_eq!(engine.source_kind(), Some(SourceKind::Synthetic));
        assert_eq!(output.attach_count(), 1);
        assert_eq!(engine.connected_sources(), 1);
    }

    // --- Source selection ---

    #[test]
    fn available_asset_plays_remote() {
        let (engine, output) = engine_with(
            test_config(1_000),
            FakeCheck::new(&[SoundType::Forest]),
            FakeLoader::new(Duration::ZERO),
        );
        let request = engine.play_sound(SoundType::Forest).unwrap();
        assert_eq!(request.wait(), PlayOutcome::Remote);
        assert_eq!(engine.source_kind(), Some(SourceKind::Remote));

        let rendered = output.render(8);
        // 0.2 sample through the default 0.5 gain
        assert!(rendered.iter().all(|&s| (s - 0.1).abs() < 1e-6));
    }

    #[test]
    fn missing_url_synthesizes_without_probing() {
        let check = FakeCheck::new(&[]);
        let loader = FakeLoader::new(Duration::ZERO);
        let config = EngineConfig {
            asset_base_url: None,
            ..test_config(1_000)
        };
        let (engine, _output) = engine_with(config, check.clone(), loader.clone());

        let request = engine.play_sound(SoundType::Space).unwrap();
        assert_eq!(request.wait(), PlayOutcome::Synthetic);
        assert_eq!(check.calls.load(Ordering::SeqCst), 0);
        assert_eq!(loader.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fallback_is_deterministic_and_probe_is_memoized() {
        let check = FakeCheck::new(&[]);
        let (engine, _output) =
            engine_with(test_config(1_000), check.clone(), FakeLoader::new(Duration::ZERO));

        for _ in 0..3 {
            let request = engine.play_sound(SoundType::Cafe).unwrap();
            assert_eq!(request.wait(), PlayOutcome::Synthetic);
        }
        assert_eq!(check.calls.load(Ordering::SeqCst), 1);
    }

    // --- Ordering ---

    #[test]
    fn last_call_wins() {
        let (engine, output) = engine_with(
            test_config(2_000),
            FakeCheck::new(&[SoundType::Rain]),
            FakeLoader::new(Duration::from_millis(200)),
        );

        let slow = engine.play_sound(SoundType::Rain).unwrap();
        let fast = engine.play_sound(SoundType::WhiteNoise).unwrap();
        assert_eq!(fast.wait(), PlayOutcome::Synthetic);
        assert_eq!(slow.wait(), PlayOutcome::Superseded);

        assert_eq!(engine.current_sound(), SoundType::WhiteNoise);
        assert_eq!(engine.source_kind(), Some(SourceKind::Synthetic));
        assert_eq!(output.attach_count(), 1);
    }

    #[test]
    fn at_most_one_source_under_rapid_switching() {
        let (engine, _output) = offline_engine();
        let requests: Vec<PlayRequest> = SoundType::AMBIENCES
            .iter()
            .map(|&s| engine.play_sound(s).unwrap())
            .collect();
        for request in requests {
            request.wait();
            assert!(engine.connected_sources() <= 1);
        }
        assert_eq!(engine.connected_sources(), 1);
        assert_eq!(engine.current_sound(), SoundType::Space);
    }

    #[test]
    fn generations_increase_per_request() {
        let (engine, _output) = offline_engine();
        let a = engine.play_sound(SoundType::Rain).unwrap();
        let b = engine.play_sound(SoundType::None).unwrap();
        assert!(b.generation() > a.generation());
        assert_eq!(b.sound(), SoundType::None);
    }

    // --- Stop ---

    #[test]
    fn stop_clears_state() {
        let (engine, output) = offline_engine();
        engine.play_sound(SoundType::Forest).unwrap().wait();
        engine.stop_sound();

        let state = engine.state();
        assert_eq!(state.current_sound, SoundType::None);
        assert!(!state.is_playing);
        assert_eq!(state.phase, EnginePhase::Idle);
        assert_eq!(state.source, None);
        assert_eq!(engine.connected_sources(), 0);
        assert!(!output.is_attached());
    }

    #[test]
    fn play_none_stops_and_settles_immediately() {
        let (engine, _output) = offline_engine();
        engine.play_sound(SoundType::Ocean).unwrap().wait();
        let request = engine.play_sound(SoundType::None).unwrap();
        assert_eq!(
            request.wait_timeout(Duration::ZERO),
            Some(PlayOutcome::Stopped)
        );
        assert!(!engine.is_playing());
    }

    #[test]
    fn stop_during_load_supersedes_request() {
        let (engine, output) = engine_with(
            test_config(2_000),
            FakeCheck::new(&[SoundType::Rain]),
            FakeLoader::new(Duration::from_millis(150)),
        );
        let request = engine.play_sound(SoundType::Rain).unwrap();
        assert_eq!(engine.phase(), EnginePhase::Starting);
        engine.stop_sound();
        assert_eq!(request.wait(), PlayOutcome::Superseded);
        assert_eq!(output.attach_count(), 0);
        assert_eq!(engine.current_sound(), SoundType::None);
    }

    // --- Volume ---

    #[test]
    fn volume_is_clamped() {
        let (engine, _output) = offline_engine();
        engine.set_volume(1.7);
        assert_eq!(engine.volume(), 1.0);
        engine.set_volume(-0.3);
        assert_eq!(engine.volume(), 0.0);
        engine.set_volume(f32::NAN);
        assert_eq!(engine.volume(), 0.0);
    }

    #[test]
    fn volume_is_idempotent() {
        let (engine, _output) = offline_engine();
        engine.set_volume(0.4);
        let first = engine.state();
        engine.set_volume(0.4);
        assert_eq!(engine.state(), first);
        assert_eq!(engine.output_gain(), 0.4);
    }

    #[test]
    fn positive_volume_unmutes_but_zero_does_not() {
        let (engine, _output) = offline_engine();
        engine.toggle_mute();
        engine.set_volume(0.0);
        assert!(engine.is_muted());
        engine.set_volume(0.6);
        assert!(!engine.is_muted());
        assert_eq!(engine.output_gain(), 0.6);
    }

    #[test]
    fn volume_survives_sound_changes() {
        let (engine, output) = offline_engine();
        engine.set_volume(0.25);
        engine.play_sound(SoundType::WhiteNoise).unwrap().wait();
        assert_eq!(engine.output_gain(), 0.25);
        let peak = output.render(1_024).iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak <= 0.25 * 0.95 + 1e-6);
    }

    // --- Failures and lifecycle ---

    #[test]
    fn unavailable_output_is_reported() {
        let engine = AmbienceEngine::with_parts(
            test_config(1_000),
            FakeCheck::new(&[]),
            FakeLoader::new(Duration::ZERO),
            Box::new(|| Err(SoundscapeError::GraphUnavailable("no device".to_string()))),
        )
        .unwrap();

        assert!(matches!(
            engine.play_sound(SoundType::Rain),
            Err(SoundscapeError::GraphUnavailable(_))
        ));
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert!(!engine.is_playing());
    }

    #[test]
    fn synthesis_failure_leaves_engine_idle() {
        let (mut engine, output) = offline_engine();
        engine.resolver.generator = ProceduralGenerator::new(0, 1.0);

        let request = engine.play_sound(SoundType::Rain).unwrap();
        assert!(matches!(request.wait(), PlayOutcome::Failed(_)));
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert_eq!(engine.current_sound(), SoundType::None);
        assert!(!engine.is_playing());
        assert_eq!(engine.connected_sources(), 0);
        assert!(!output.is_attached());
    }

    #[test]
    fn panicking_worker_fails_request_and_resets_state() {
        struct PanickingCheck;

        impl AssetCheck for PanickingCheck {
            fn check(&self, _url: &str) -> Result<bool> {
                panic!("host check blew up");
            }
        }

        let output = OfflineOutput::new();
        let engine = AmbienceEngine::with_parts(
            test_config(1_000),
            Arc::new(PanickingCheck),
            FakeLoader::new(Duration::ZERO),
            output.factory(),
        )
        .unwrap();

        let request = engine.play_sound(SoundType::Rain).unwrap();
        assert_eq!(
            request.wait(),
            PlayOutcome::Failed(WORKER_EXITED.to_string())
        );
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert_eq!(engine.current_sound(), SoundType::None);
        assert_eq!(engine.connected_sources(), 0);

        // The engine stays usable afterwards
        assert_eq!(engine.play_sound(SoundType::None).unwrap().wait(), PlayOutcome::Stopped);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            sample_rate: 0,
            ..EngineConfig::default()
        };
        let result = AmbienceEngine::with_parts(
            config,
            FakeCheck::new(&[]),
            FakeLoader::new(Duration::ZERO),
            OfflineOutput::new().factory(),
        );
        assert!(matches!(result, Err(SoundscapeError::Config(_))));
    }

    #[test]
    fn dispose_is_idempotent_and_final() {
        let (engine, output) = offline_engine();
        engine.play_sound(SoundType::Rain).unwrap().wait();
        engine.dispose();
        engine.dispose();

        assert!(engine.is_disposed());
        assert!(output.is_closed());
        assert!(!engine.is_playing());
        assert!(matches!(
            engine.play_sound(SoundType::Rain),
            Err(SoundscapeError::Disposed)
        ));
    }

    #[test]
    fn drop_releases_output() {
        let (engine, output) = offline_engine();
        engine.play_sound(SoundType::Cafe).unwrap().wait();
        drop(engine);
        assert!(output.is_closed());
    }

    #[test]
    fn frequency_buffer_identity_is_stable() {
        let (engine, _output) = offline_engine();
        let before = engine.frequency_buffer();
        engine.play_sound(SoundType::Forest).unwrap().wait();
        engine.play_sound(SoundType::Ocean).unwrap().wait();
        engine.stop_sound();
        assert!(Arc::ptr_eq(&before, &engine.frequency_buffer()));
    }

    #[test]
    fn output_opens_lazily_once() {
        let (engine, output) = offline_engine();
        assert_eq!(output.open_count(), 0);
        engine.play_sound(SoundType::Rain).unwrap().wait();
        engine.play_sound(SoundType::Space).unwrap().wait();
        assert_eq!(output.open_count(), 1);
    }
}
