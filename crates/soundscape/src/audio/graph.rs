//! Audio graph
//!
//! One output device, one gain node and one analyser node, wired
//! `source -> gain -> analyser -> output`. The device is opened on first use;
//! gain and analyser live as long as the graph. Sources are attached
//! upstream of the gain one at a time and detached by closing their gate.

use std::num::NonZero;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rodio::Source;

use crate::error::{Result, SoundscapeError};

use super::analyser::{Analyser, AnalyzingSource};

/// The chain handed to an output device for one connection
pub type GraphInput = AnalyzingSource<GainSource<GatedSource>>;

/// Sink end of the graph
pub trait OutputDevice: Send {
    /// Start (or restart) pulling samples from the device
    fn resume(&mut self) -> Result<()>;

    /// Replace whatever is playing with `input`
    fn attach(&mut self, input: GraphInput) -> Result<()>;

    /// Drop the attached input, if any
    fn clear(&mut self);

    /// Release the device; later calls are no-ops
    fn close(&mut self);
}

/// Opens the output device on first use
pub type DeviceFactory = Box<dyn FnMut() -> Result<Box<dyn OutputDevice>> + Send>;

// =============================================================================
// Gain
// =============================================================================

/// Volume parameter shared between the controller and the audio thread
#[derive(Debug)]
pub struct GainNode {
    bits: AtomicU32,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            bits: AtomicU32::new(gain.to_bits()),
        }
    }

    pub fn set(&self, gain: f32) {
        self.bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Multiplies every sample by the current value of a `GainNode`
pub struct GainSource<S> {
    inner: S,
    gain: Arc<GainNode>,
}

impl<S: Source> GainSource<S> {
    pub fn new(inner: S, gain: Arc<GainNode>) -> Self {
        Self { inner, gain }
    }
}

impl<S: Source> Iterator for GainSource<S> {
    type Item = f32;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|s| s * self.gain.get())
    }
}

impl<S: Source> Source for GainSource<S> {
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> NonZero<u16> {
        self.inner.channels()
    }

    fn sample_rate(&self) -> NonZero<u32> {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

// =============================================================================
// Gate
// =============================================================================

/// Source that ends as soon as its connection is closed
pub struct GatedSource {
    inner: Box<dyn Source + Send>,
    open: Arc<AtomicBool>,
    channels: NonZero<u16>,
    sample_rate: NonZero<u32>,
}

impl GatedSource {
    fn new(inner: Box<dyn Source + Send>, open: Arc<AtomicBool>) -> Self {
        let channels = inner.channels();
        let sample_rate = inner.sample_rate();
        Self {
            inner,
            open,
            channels,
            sample_rate,
        }
    }
}

impl Iterator for GatedSource {
    type Item = f32;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if !self.open.load(Ordering::Relaxed) {
            return None;
        }
        self.inner.next()
    }
}

impl Source for GatedSource {
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
        None
    }
}

/// Handle to one attached source
#[derive(Debug, Clone)]
pub struct Connection {
    id: u64,
    open: Arc<AtomicBool>,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

// =============================================================================
// Graph
// =============================================================================

pub struct AudioGraph {
    factory: DeviceFactory,
    device: Option<Box<dyn OutputDevice>>,
    gain: Arc<GainNode>,
    analyser: Arc<Analyser>,
    connection: Option<Connection>,
    next_id: u64,
    closed: bool,
}

impl AudioGraph {
    pub fn new(factory: DeviceFactory, initial_gain: f32) -> Self {
        Self {
            factory,
            device: None,
            gain: Arc::new(GainNode::new(initial_gain)),
            analyser: Arc::new(Analyser::new()),
            connection: None,
            next_id: 0,
            closed: false,
        }
    }

    /// True once the output device has been opened
    pub fn is_built(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure(&mut self) -> Result<&mut Box<dyn OutputDevice>> {
        if self.closed {
            return Err(SoundscapeError::GraphUnavailable(
                "graph has been closed".to_string(),
            ));
        }
        if self.device.is_none() {
            let device = (self.factory)().map_err(unavailable)?;
            info!("Audio graph built");
            self.device = Some(device);
        }
        match self.device.as_mut() {
            Some(device) => Ok(device),
            None => Err(SoundscapeError::GraphUnavailable(
                "output device missing".to_string(),
            )),
        }
    }

    /// Build the graph if needed and make sure the device is running
    pub fn resume(&mut self) -> Result<()> {
        self.ensure()?.resume().map_err(unavailable)
    }

    /// Write the volume parameter (effective gain, mute already applied)
    pub fn set_gain(&self, gain: f32) {
        self.gain.set(gain);
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    pub fn gain_node(&self) -> Arc<GainNode> {
        self.gain.clone()
    }

    pub fn analyser(&self) -> Arc<Analyser> {
        self.analyser.clone()
    }

    /// Attach `source` upstream of the gain node.
    ///
    /// Refused while another connection is still open.
    pub fn connect_source(&mut self, source: Box<dyn Source + Send>) -> Result<Connection> {
        if let Some(existing) = &self.connection {
            return Err(SoundscapeError::Graph(format!(
                "source {} is still connected",
                existing.id
            )));
        }

        self.next_id += 1;
        let connection = Connection {
            id: self.next_id,
            open: Arc::new(AtomicBool::new(true)),
        };
        let input = AnalyzingSource::new(
            GainSource::new(
                GatedSource::new(source, connection.open.clone()),
                self.gain.clone(),
            ),
            self.analyser.clone(),
        );

        self.ensure()?.attach(input)?;
        debug!("Connected source {}", connection.id);
        self.connection = Some(connection.clone());
        Ok(connection)
    }

    /// Detach the current source, if any
    pub fn disconnect_source(&mut self) -> Option<Connection> {
        let connection = self.connection.take()?;
        connection.close();
        if let Some(device) = self.device.as_mut() {
            device.clear();
        }
        self.analyser.reset();
        debug!("Disconnected source {}", connection.id);
        Some(connection)
    }

    /// Number of currently attached sources (0 or 1)
    pub fn connected_sources(&self) -> usize {
        usize::from(self.connection.is_some())
    }

    pub fn current_connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Tear down the output device. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.disconnect_source();
        if let Some(mut device) = self.device.take() {
            device.close();
            info!("Audio graph closed");
        }
        self.closed = true;
    }
}

fn unavailable(e: SoundscapeError) -> SoundscapeError {
    match e {
        SoundscapeError::GraphUnavailable(_) => e,
        other => SoundscapeError::GraphUnavailable(other.to_string()),
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::OfflineOutput;
    use crate::audio::source::LoopingSource;

    fn looping(level: f32) -> Box<dyn Source + Send> {
        Box::new(LoopingSource::new(Arc::from(vec![level; 64]), 1, 44_100).unwrap())
    }

    fn graph_with(output: &OfflineOutput) -> AudioGraph {
        AudioGraph::new(output.factory(), 1.0)
    }

    // --- Lazy construction ---

    #[test]
    fn device_opens_on_first_resume_only() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        assert!(!graph.is_built());
        graph.resume().unwrap();
        graph.resume().unwrap();
        assert!(graph.is_built());
        assert_eq!(output.open_count(), 1);
        assert!(output.is_resumed());
    }

    #[test]
    fn factory_failure_is_graph_unavailable() {
        let mut graph = AudioGraph::new(
            Box::new(|| Err(SoundscapeError::Io(std::io::Error::other("no device")))),
            1.0,
        );
        assert!(matches!(
            graph.resume(),
            Err(SoundscapeError::GraphUnavailable(_))
        ));
        assert!(!graph.is_built());
    }

    #[test]
    fn nodes_keep_identity() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        let gain = graph.gain_node();
        let analyser = graph.analyser();
        graph.resume().unwrap();
        graph.connect_source(looping(0.1)).unwrap();
        graph.disconnect_source();
        assert!(Arc::ptr_eq(&gain, &graph.gain_node()));
        assert!(Arc::ptr_eq(&analyser, &graph.analyser()));
    }

    // --- Connections ---

    #[test]
    fn second_connection_is_refused() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        graph.connect_source(looping(0.1)).unwrap();
        assert!(matches!(
            graph.connect_source(looping(0.2)),
            Err(SoundscapeError::Graph(_))
        ));
        assert_eq!(graph.connected_sources(), 1);
    }

    #[test]
    fn disconnect_closes_gate_and_clears_device() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        let connection = graph.connect_source(looping(0.1)).unwrap();
        assert!(output.is_attached());

        let closed = graph.disconnect_source().unwrap();
        assert_eq!(closed.id(), connection.id());
        assert!(!connection.is_open());
        assert!(!output.is_attached());
        assert_eq!(graph.connected_sources(), 0);
        assert!(graph.disconnect_source().is_none());
    }

    #[test]
    fn reconnect_after_disconnect() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        let first = graph.connect_source(looping(0.1)).unwrap();
        graph.disconnect_source();
        let second = graph.connect_source(looping(0.2)).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(output.attach_count(), 2);
    }

    // --- Gain ---

    #[test]
    fn gain_scales_rendered_output() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        graph.resume().unwrap();
        graph.connect_source(looping(0.5)).unwrap();
        graph.set_gain(0.5);
        let rendered = output.render(16);
        assert!(rendered.iter().all(|&s| (s - 0.25).abs() < 1e-6));

        graph.set_gain(0.0);
        assert!(output.render(16).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn gain_set_before_build_is_kept() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        graph.set_gain(0.3);
        graph.resume().unwrap();
        assert!((graph.gain() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn rendered_audio_reaches_the_analyser() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        graph.resume().unwrap();
        graph.connect_source(looping(0.5)).unwrap();
        output.render(512);
        assert_eq!(graph.analyser().samples_seen(), 512);
    }

    // --- Teardown ---

    #[test]
    fn close_is_idempotent_and_final() {
        let output = OfflineOutput::new();
        let mut graph = graph_with(&output);
        graph.resume().unwrap();
        graph.connect_source(looping(0.1)).unwrap();
        graph.close();
        graph.close();
        assert!(graph.is_closed());
        assert!(output.is_closed());
        assert_eq!(graph.connected_sources(), 0);
        assert!(matches!(
            graph.resume(),
            Err(SoundscapeError::GraphUnavailable(_))
        ));
    }

    #[test]
    fn drop_closes_device() {
        let output = OfflineOutput::new();
        {
            let mut graph = graph_with(&output);
            graph.resume().unwrap();
        }
        assert!(output.is_closed());
    }
}
