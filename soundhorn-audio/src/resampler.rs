//! Audio resampling with rubato
//!
//! Used offline to bring reference clips to the capture sample rate.

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::error::{AudioError, Result};

/// Mono resampler for whole clips
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    resampler: Option<SincFixedIn<f32>>,
}

impl Resampler {
    /// Create new resampler
    ///
    /// # Arguments
    ///
    /// * `source_rate` - Sample rate of the clip (e.g., 48000)
    /// * `target_rate` - Capture sample rate (typically 44100)
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }

        // If rates are the same, no resampling needed
        let resampler = if source_rate != target_rate {
            Some(Self::create_resampler(source_rate, target_rate)?)
        } else {
            None
        };

        Ok(Self {
            source_rate,
            target_rate,
            resampler,
        })
    }

    fn create_resampler(source_rate: u32, target_rate: u32) -> Result<SincFixedIn<f32>> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // 100ms of input per call
        let chunk_size = (source_rate as f32 * 0.1).max(1.0) as usize;

        SincFixedIn::<f32>::new(
            target_rate as f64 / source_rate as f64,
            2.0, // max_resample_ratio_relative
            params,
            chunk_size,
            1,
        )
        .map_err(|e| AudioError::ResampleError(format!("Failed to create resampler: {:?}", e)))
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Resample a complete mono clip.
    ///
    /// The resampler delay is trimmed so the output starts where the input
    /// starts and has `expected_output_len` samples.
    pub fn process_clip(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let expected = self.expected_output_len(input.len());
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(input.to_vec());
        };

        if input.is_empty() {
            return Ok(Vec::new());
        }

        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay);
        let mut pos = 0;

        while input.len() - pos >= resampler.input_frames_next() {
            let take = resampler.input_frames_next();
            let wave_in: [&[f32]; 1] = [&input[pos..pos + take]];
            let chunk = resampler
                .process(&wave_in[..], None)
                .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;
            output.extend_from_slice(&chunk[0]);
            pos += take;
        }

        if pos < input.len() {
            let wave_in: [&[f32]; 1] = [&input[pos..]];
            let chunk = resampler
                .process_partial(Some(&wave_in[..]), None)
                .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;
            output.extend_from_slice(&chunk[0]);
        }

        // Flush until the delayed tail is out
        while output.len() < expected + delay {
            let chunk = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;
            if chunk[0].is_empty() {
                break;
            }
            output.extend_from_slice(&chunk[0]);
        }

        let start = delay.min(output.len());
        let mut trimmed = output.split_off(start);
        trimmed.truncate(expected);
        Ok(trimmed)
    }

    /// Get expected output length for given input length
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        if self.resampler.is_none() {
            return input_len;
        }
        (input_len as f64 * self.target_rate as f64 / self.source_rate as f64).round() as usize
    }
}
