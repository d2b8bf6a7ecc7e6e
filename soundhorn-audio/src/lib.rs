//! soundhorn audio core
//!
//! Real-time capture, loudness metering and recording for a single mono
//! input stream.
//!
//! ## Architecture
//!
//! ```text
//! Audio Device (cpal callback thread)
//!   │
//!   ├─> FrameAssembler  (downmix, PCM16, fixed-size frames)
//!   │
//!   ├─> FrameIngestor   (ringbuf, drop-oldest, drop counter)
//!   │     │
//!   │     └─> fan-out by reference
//!   │           ├─> LoudnessMeter  -> LevelHandle (atomic, last value wins)
//!   │           ├─> Recorder       -> Recording -> WAV (hound)
//!   │           └─> any other FrameConsumer (template matcher)
//!   │
//!   └─> CaptureStream   (owns the device stream, closes once)
//! ```

pub mod capture;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod meter;
pub mod recorder;
pub mod resampler;
pub mod wav;

pub use capture::{AudioCapture, BlockIngest, CaptureStream, DeviceInfo};
pub use error::{AudioError, Result};
pub use frame::{AudioFrame, FrameAssembler};
pub use ingest::{FrameConsumer, FrameIngestor, IngestState, IngestStatus};
pub use meter::{rms_db, LevelHandle, LoudnessMeter, LOUDNESS_EPSILON, LOUDNESS_FLOOR_DB};
pub use recorder::{Recorder, Recording, RecordingStatus};
pub use resampler::Resampler;
pub use wav::{read_wav, write_pcm, WavClip};

use std::time::Duration;

/// Capture sample rate (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Samples per frame (~23 ms at 44.1 kHz)
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Frames the ingest ring holds before it starts dropping the oldest
pub const DEFAULT_RING_CAPACITY: usize = 16;

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Capture sample rate (default: 44100 Hz)
    pub sample_rate: u32,
    /// Device-side channel count to request; frames are always mono
    pub channels: u16,
    /// Samples per frame (default: 1024)
    pub frame_size: usize,
    /// Ingest ring capacity in frames (default: 16)
    pub ring_capacity: usize,
    /// Device index (None = default device)
    pub device_index: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            frame_size: DEFAULT_FRAME_SIZE,
            ring_capacity: DEFAULT_RING_CAPACITY,
            device_index: None,
        }
    }
}

impl AudioConfig {
    /// Time between frames at the configured rate
    pub fn frame_period(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::invalid_config("sample_rate must be positive"));
        }
        if self.frame_size == 0 {
            return Err(AudioError::invalid_config("frame_size must be positive"));
        }
        if self.channels == 0 {
            return Err(AudioError::invalid_config("channels must be positive"));
        }
        if self.ring_capacity == 0 {
            return Err(AudioError::invalid_config("ring_capacity must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_period() {
        let config = AudioConfig::default();
        let ms = config.frame_period().as_secs_f64() * 1000.0;
        assert!((ms - 23.22).abs() < 0.01, "unexpected period {}", ms);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_frame_size() {
        let config = AudioConfig {
            frame_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AudioError::InvalidConfig(_))));
    }
}
