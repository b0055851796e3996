//! Whole-asset decoding using Symphonia
//!
//! Ambience assets are short loops, so they are decoded completely into
//! memory before playback starts. A track that decodes is a track that can
//! play without interruption.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SoundscapeError};

/// Fully decoded interleaved PCM
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
}

impl RemoteTrack {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            channels,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate.max(1) as f64)
    }
}

/// File extension of a URL path, used as a format hint
pub fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Decode an entire in-memory asset
pub fn decode_all(bytes: Vec<u8>, format_hint: Option<&str>) -> Result<RemoteTrack> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = format_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SoundscapeError::Decode(format!("Probe error: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SoundscapeError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SoundscapeError::Decode(format!("Decoder creation error: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut sample_rate = track.codec_params.sample_rate;
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(SoundscapeError::Decode(format!("Read error: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = Some(spec.channels.count() as u16);
                sample_rate = Some(spec.rate);

                let capacity = decoded.capacity();
                if sample_buf
                    .as_ref()
                    .map_or(true, |buf| buf.capacity() < capacity)
                {
                    sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                skipped += 1;
                debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(SoundscapeError::Decode(format!("Decode error: {}", e))),
        }
    }

    let channels = channels.filter(|&c| c > 0).unwrap_or(2);
    let sample_rate = sample_rate
        .filter(|&r| r > 0)
        .ok_or_else(|| SoundscapeError::Decode("Unknown sample rate".to_string()))?;
    if samples.is_empty() {
        return Err(SoundscapeError::Decode("Asset contains no audio".to_string()));
    }
    // Drop a trailing partial frame so the loop stays channel-aligned
    samples.truncate(samples.len() - samples.len() % channels as usize);
    if samples.is_empty() {
        return Err(SoundscapeError::Decode("Asset contains no audio".to_string()));
    }

    debug!(
        "Decoded {} frames ({} ch @ {} Hz, {} packets skipped)",
        samples.len() / channels as usize,
        channels,
        sample_rate,
        skipped
    );
    Ok(RemoteTrack::new(samples, channels, sample_rate))
}
