//! Frequency sampling loop
//!
//! While a sound plays, a `frequency-sampler` thread copies the analyser's
//! byte spectrum into a shared `FrequencyBuffer` every tick. Readers always
//! see a complete (possibly one tick old) snapshot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::config::audio::FREQUENCY_BIN_COUNT;
use crate::config::sampler::TICK_INTERVAL_MS;

use super::analyser::Analyser;

/// Fixed-size spectrum buffer shared with visualizers
#[derive(Debug)]
pub struct FrequencyBuffer {
    bins: Mutex<Vec<u8>>,
    frames: AtomicU64,
}

impl Default for FrequencyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyBuffer {
    pub fn new() -> Self {
        Self {
            bins: Mutex::new(vec![0; FREQUENCY_BIN_COUNT]),
            frames: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        FREQUENCY_BIN_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Copy of the current bins
    pub fn snapshot(&self) -> Vec<u8> {
        self.bins.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Copy the current bins into `out`, returning the number written
    pub fn read_into(&self, out: &mut [u8]) -> usize {
        let bins = self.bins.lock().unwrap_or_else(|e| e.into_inner());
        let n = out.len().min(bins.len());
        out[..n].copy_from_slice(&bins[..n]);
        n
    }

    /// Number of refreshes so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Refresh in place from the analyser
    pub fn refresh(&self, analyser: &Analyser) {
        let mut bins = self.bins.lock().unwrap_or_else(|e| e.into_inner());
        analyser.get_byte_frequency_data(&mut bins);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every bin
    pub fn clear(&self) {
        self.bins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fill(0);
    }
}

struct RunningLoop {
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Cancellable repeating task refreshing a `FrequencyBuffer`
pub struct FrequencySampler {
    buffer: Arc<FrequencyBuffer>,
    interval: Duration,
    running: Option<RunningLoop>,
}

impl FrequencySampler {
    pub fn new(buffer: Arc<FrequencyBuffer>) -> Self {
        Self::with_interval(buffer, Duration::from_millis(TICK_INTERVAL_MS))
    }

    pub fn with_interval(buffer: Arc<FrequencyBuffer>, interval: Duration) -> Self {
        Self {
            buffer,
            interval,
            running: None,
        }
    }

    pub fn buffer(&self) -> Arc<FrequencyBuffer> {
        self.buffer.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start sampling `analyser`, replacing any loop already running
    pub fn start(&mut self, analyser: Arc<Analyser>) {
        self.stop();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let buffer = self.buffer.clone();
        let interval = self.interval;

        let spawned = thread::Builder::new()
            .name("frequency-sampler".to_string())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    buffer.refresh(&analyser);
                    thread::sleep(interval);
                }
            });

        match spawned {
            Ok(handle) => {
                debug!("Frequency sampler started");
                self.running = Some(RunningLoop { stop_flag, handle });
            }
            Err(e) => warn!("Failed to spawn frequency sampler: {}", e),
        }
    }

    /// Refresh once on the calling thread
    pub fn tick(&self, analyser: &Analyser) {
        self.buffer.refresh(analyser);
    }

    /// Stop the loop and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop_flag.store(true, Ordering::SeqCst);
            let _ = running.handle.join();
            debug!("Frequency sampler stopped");
        }
    }
}

impl Drop for FrequencySampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;
    use std::time::Instant;

    fn analyser_with_tone(bin: usize) -> Arc<Analyser> {
        let analyser = Arc::new(Analyser::new());
        let tone: Vec<f32> = (0..256)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / 256.0).sin() * 0.5)
            .collect();
        analyser.push(&tone);
        analyser
    }

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    // --- FrequencyBuffer ---

    #[test]
    fn buffer_starts_zeroed() {
        let buffer = FrequencyBuffer::new();
        assert_eq!(buffer.len(), 128);
        assert!(buffer.snapshot().iter().all(|&b| b == 0));
        assert_eq!(buffer.frames(), 0);
    }

    #[test]
    fn refresh_copies_spectrum() {
        let buffer = FrequencyBuffer::new();
        buffer.refresh(&analyser_with_tone(10));
        assert!(buffer.snapshot()[10] > 0);
        assert_eq!(buffer.frames(), 1);
    }

    #[test]
    fn read_into_short_slice() {
        let buffer = FrequencyBuffer::new();
        buffer.refresh(&analyser_with_tone(2));
        let mut out = [0u8; 4];
        assert_eq!(buffer.read_into(&mut out), 4);
        assert!(out[2] > 0);
    }

    #[test]
    fn clear_zeroes_bins() {
        let buffer = FrequencyBuffer::new();
        buffer.refresh(&analyser_with_tone(10));
        buffer.clear();
        assert!(buffer.snapshot().iter().all(|&b| b == 0));
    }

    // --- Sampler loop ---

    #[test]
    fn loop_refreshes_until_stopped() {
        let buffer = Arc::new(FrequencyBuffer::new());
        let mut sampler = FrequencySampler::with_interval(buffer.clone(), Duration::from_millis(1));
        sampler.start(analyser_with_tone(20));
        assert!(sampler.is_running());
        assert!(wait_for(|| buffer.frames() >= 3));

        sampler.stop();
        assert!(!sampler.is_running());
        let frozen = buffer.frames();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(buffer.frames(), frozen);
        assert!(buffer.snapshot()[20] > 0);
    }

    #[test]
    fn restart_keeps_single_loop() {
        let buffer = Arc::new(FrequencyBuffer::new());
        let mut sampler = FrequencySampler::with_interval(buffer.clone(), Duration::from_millis(1));
        sampler.start(analyser_with_tone(5));
        sampler.start(analyser_with_tone(40));
        assert!(wait_for(|| buffer.snapshot()[40] > 0));
        sampler.stop();
        assert!(!sampler.is_running());
    }

    #[test]
    fn stop_without_start_is_noop() {
        let mut sampler = FrequencySampler::new(Arc::new(FrequencyBuffer::new()));
        sampler.stop();
        assert!(!sampler.is_running());
    }

    #[test]
    fn manual_tick_refreshes_buffer() {
        let buffer = Arc::new(FrequencyBuffer::new());
        let sampler = FrequencySampler::new(buffer.clone());
        sampler.tick(&analyser_with_tone(8));
        assert_eq!(buffer.frames(), 1);
        assert!(Arc::ptr_eq(&buffer, &sampler.buffer()));
    }
}
