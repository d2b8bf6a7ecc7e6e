//! Uncompressed PCM WAV reading and writing via hound

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;

use crate::error::{AudioError, Result};

/// Decoded WAV clip, normalized to [-1.0, 1.0] and still interleaved
#[derive(Debug, Clone)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl WavClip {
    /// Average interleaved channels down to mono
    pub fn into_mono(self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples;
        }
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }
}

/// Write PCM16 samples as a canonical RIFF/WAVE file.
///
/// Returns the number of samples written. Only 16-bit integer PCM is
/// supported since that is what the capture path produces.
pub fn write_pcm<P, I>(
    path: P,
    samples: I,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = i16>,
{
    if bits_per_sample != 16 {
        return Err(AudioError::invalid_config(format!(
            "Unsupported bit depth {} (only 16-bit PCM is written)",
            bits_per_sample
        )));
    }
    if sample_rate == 0 || channels == 0 {
        return Err(AudioError::invalid_config(
            "Sample rate and channel count must be non-zero",
        ));
    }

    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let path = path.as_ref();
    let mut writer = WavWriter::create(path, spec)?;
    let mut written = 0usize;
    for sample in samples {
        writer.write_sample(sample)?;
        written += 1;
    }
    writer.finalize()?;

    debug!("Wrote {} samples to {}", written, path.display());
    Ok(written)
}

/// Read any integer or float WAV file into normalized f32 samples.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<WavClip> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    Ok(WavClip {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}
