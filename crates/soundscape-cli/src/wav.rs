//! WAV export of synthesized loops

use std::path::Path;

use soundscape::synth::SynthBuffer;

/// Write a mono loop as 16-bit PCM, repeated `loops` times
pub fn write_loop(path: &Path, buffer: &SynthBuffer, loops: u32) -> Result<(), String> {
    let spec = hound::WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("Failed to create WAV file: {}", e))?;

    for _ in 0..loops.max(1) {
        for &sample in buffer.samples() {
            let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| format!("Failed to write sample: {}", e))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| format!("Failed to finalize WAV file: {}", e))?;

    Ok(())
}
