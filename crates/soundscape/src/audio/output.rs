//! Output devices
//!
//! `RodioOutput` plays through the default sound card on a dedicated thread.
//! `OfflineOutput` is a headless device that only produces samples when
//! asked to, for tests and offline rendering.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, warn};
use rodio::{DeviceSinkBuilder, Player, Source};

use crate::error::{Result, SoundscapeError};

use super::graph::{DeviceFactory, GraphInput, OutputDevice};

enum OutputCommand {
    Attach(GraphInput),
    Clear,
    Resume,
    Close,
}

// =============================================================================
// Rodio
// =============================================================================

/// Default sound card output, owned by the `audio-output` thread
pub struct RodioOutput {
    cmd_tx: Sender<OutputCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RodioOutput {
    /// Open the default output device.
    ///
    /// Blocks until the device is initialized (or fails). The player starts
    /// paused; `resume()` starts it.
    pub fn open() -> Result<Self> {
        let (cmd_tx, cmd_rx) = bounded::<OutputCommand>(16);
        let (init_tx, init_rx) = bounded::<std::result::Result<(), String>>(1);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || Self::run(cmd_rx, init_tx))
            .map_err(|e| {
                SoundscapeError::GraphUnavailable(format!("Failed to spawn audio thread: {}", e))
            })?;

        let init_result = init_rx.recv().map_err(|_| {
            SoundscapeError::GraphUnavailable("Audio thread terminated during init".to_string())
        })?;
        init_result.map_err(SoundscapeError::GraphUnavailable)?;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    /// Factory that opens a `RodioOutput` when the graph is first built
    pub fn factory() -> DeviceFactory {
        Box::new(|| Ok(Box::new(RodioOutput::open()?) as Box<dyn OutputDevice>))
    }

    fn send(&self, cmd: OutputCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| SoundscapeError::GraphUnavailable("Audio thread has exited".to_string()))
    }

    fn run(cmd_rx: Receiver<OutputCommand>, init_tx: Sender<std::result::Result<(), String>>) {
        // Create audio output on this thread (cpal streams may be !Send)
        let mut stream = match DeviceSinkBuilder::open_default_sink() {
            Ok(s) => s,
            Err(e) => {
                let _ = init_tx.send(Err(format!("Failed to open audio output: {}", e)));
                return;
            }
        };
        stream.log_on_drop(false);

        // `stream` must be declared before `player` so Rust drops player first
        let player = Player::connect_new(stream.mixer());
        player.pause();

        let _ = init_tx.send(Ok(()));

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                OutputCommand::Attach(input) => {
                    debug!(
                        "Output attach: {} ch @ {} Hz",
                        input.channels(),
                        input.sample_rate()
                    );
                    player.stop();
                    player.append(input);
                }
                OutputCommand::Clear => player.stop(),
                OutputCommand::Resume => player.play(),
                OutputCommand::Close => break,
            }
        }

        player.stop();
        debug!("Audio output thread exiting");
    }
}

impl OutputDevice for RodioOutput {
    fn resume(&mut self) -> Result<()> {
        self.send(OutputCommand::Resume)
    }

    fn attach(&mut self, input: GraphInput) -> Result<()> {
        self.send(OutputCommand::Attach(input))
    }

    fn clear(&mut self) {
        if self.send(OutputCommand::Clear).is_err() {
            warn!("Audio output already gone while clearing");
        }
    }

    fn close(&mut self) {
        let _ = self.cmd_tx.send(OutputCommand::Close);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Offline
// =============================================================================

#[derive(Default)]
struct OfflineState {
    input: Option<GraphInput>,
    resumed: bool,
    closed: bool,
    attach_count: usize,
    open_count: usize,
}

/// Headless device; every clone shares the same state
#[derive(Clone, Default)]
pub struct OfflineOutput {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory handing out clones of this device, counting each open
    pub fn factory(&self) -> DeviceFactory {
        let device = self.clone();
        Box::new(move || {
            device.lock().open_count += 1;
            Ok(Box::new(device.clone()) as Box<dyn OutputDevice>)
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pull `n` interleaved samples through the graph.
    ///
    /// Yields silence while suspended or with nothing attached; an input that
    /// runs dry is dropped and the remainder is padded with silence.
    pub fn render(&self, n: usize) -> Vec<f32> {
        let mut state = self.lock();
        let mut out = vec![0.0; n];
        if !state.resumed || state.closed {
            return out;
        }
        let mut ended = None;
        if let Some(input) = state.input.as_mut() {
            for (i, slot) in out.iter_mut().enumerate() {
                match input.next() {
                    Some(s) => *slot = s,
                    None => {
                        ended = Some(i);
                        break;
                    }
                }
            }
        }
        if let Some(i) = ended {
            debug!("Offline input ended after {} samples", i);
            state.input = None;
        }
        out
    }

    pub fn is_attached(&self) -> bool {
        self.lock().input.is_some()
    }

    pub fn is_resumed(&self) -> bool {
        self.lock().resumed
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn attach_count(&self) -> usize {
        self.lock().attach_count
    }

    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }
}

impl OutputDevice for OfflineOutput {
    fn resume(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(SoundscapeError::GraphUnavailable(
                "offline output is closed".to_string(),
            ));
        }
        state.resumed = true;
        Ok(())
    }

    fn attach(&mut self, input: GraphInput) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(SoundscapeError::GraphUnavailable(
                "offline output is closed".to_string(),
            ));
        }
        state.input = Some(input);
        state.attach_count += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.lock().input = None;
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.input = None;
        state.resumed = false;
        state.closed = true;
    }
}
