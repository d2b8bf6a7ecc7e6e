//! Reference clips the matcher looks for

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use soundhorn_audio::{read_wav, Resampler};

use crate::error::{DetectError, Result};

/// A named, immutable reference clip at the capture sample rate.
#[derive(Debug, Clone)]
pub struct SoundTemplate {
    name: String,
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SoundTemplate {
    /// Build a template from mono samples already at `sample_rate`.
    pub fn from_samples<S: Into<String>>(name: S, samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        let name = name.into();
        if sample_rate == 0 {
            return Err(DetectError::config(format!(
                "Template '{}' has a zero sample rate",
                name
            )));
        }
        if samples.is_empty() {
            return Err(DetectError::config(format!("Template '{}' is empty", name)));
        }
        Ok(Self {
            name,
            samples,
            sample_rate,
        })
    }

    /// Load a WAV clip, downmix it to mono and resample it to `target_rate`.
    pub fn load<S, P>(name: S, path: P, target_rate: u32) -> Result<Self>
    where
        S: Into<String>,
        P: AsRef<Path>,
    {
        let name = name.into();
        let path = path.as_ref();
        if !path.exists() {
            return Err(DetectError::config(format!(
                "Template '{}' not found at {}",
                name,
                path.display()
            )));
        }

        let clip = read_wav(path)?;
        let source_rate = clip.sample_rate;
        let channels = clip.channels;
        let mono = clip.into_mono();
        debug!(
            "Decoded template '{}': {} samples, {} Hz, {} ch",
            name,
            mono.len(),
            source_rate,
            channels
        );

        let samples = if source_rate != target_rate {
            let mut resampler = Resampler::new(source_rate, target_rate)?;
            resampler.process_clip(&mono)?
        } else {
            mono
        };

        let template = Self::from_samples(name, samples, target_rate)?;
        info!(
            "Loaded template '{}' from {} ({:.2}s)",
            template.name,
            path.display(),
            template.duration().as_secs_f32()
        );
        Ok(template)
    }

    /// Synthetic sine clip, handy for line checks and tests
    pub fn tone<S: Into<String>>(name: S, freq_hz: f32, duration: Duration, sample_rate: u32) -> Result<Self> {
        let len = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
        let samples = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq_hz * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect();
        Self::from_samples(name, samples, sample_rate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}
