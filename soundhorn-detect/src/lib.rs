//! Template-based sound detection for soundhorn
//!
//! Compares live audio against registered reference clips using normalized
//! cross-correlation on a block-decimated sliding window. Scores do not depend
//! on input gain, so a template recorded at one level matches the same sound
//! played louder or quieter.
//!
//! # Example
//!
//! ```no_run
//! use soundhorn_detect::{MatcherConfig, SoundTemplate, TemplateMatcher};
//! use soundhorn_audio::AudioFrame;
//!
//! let horn = SoundTemplate::load("horn", "templates/horn.wav", 44_100)?;
//! let config = MatcherConfig::default().threshold(0.6);
//! let mut matcher = TemplateMatcher::new(config, vec![horn])?;
//!
//! let frame = AudioFrame::from_samples(0, vec![0i16; 1024]);
//! if let Some(event) = matcher.process(&frame) {
//!     println!("{} matched ({:.2})", event.template, event.confidence);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
pub mod matcher;
pub mod queue;
pub mod template;

pub use error::{DetectError, Result};
pub use matcher::{normalized_cross_correlation, MatchEvent, TemplateMatcher};
pub use queue::{ListenGate, MatchForwarder, MatchQueue, DEFAULT_MATCH_QUEUE_CAPACITY};
pub use template::SoundTemplate;

/// Default similarity threshold
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Default block-mean decimation factor
pub const DEFAULT_DECIMATION: usize = 4;

/// Matcher configuration
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Capture sample rate every template must share (default: 44100 Hz)
    pub sample_rate: u32,

    /// Similarity at or above which a match fires (0.0 to 1.0, default: 0.6)
    pub threshold: f32,

    /// Samples averaged into one block before correlation (default: 4)
    /// Higher = cheaper per frame, coarser time alignment
    pub decimation: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            sample_rate: soundhorn_audio::DEFAULT_SAMPLE_RATE,
            threshold: DEFAULT_THRESHOLD,
            decimation: DEFAULT_DECIMATION,
        }
    }
}

impl MatcherConfig {
    /// Create config for a capture rate
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    /// Set match threshold
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set decimation factor
    pub fn decimation(mut self, factor: usize) -> Self {
        self.decimation = factor;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DetectError::config("Sample rate must be positive"));
        }

        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(DetectError::config("Threshold must be in (0.0, 1.0]"));
        }

        if self.decimation == 0 {
            return Err(DetectError::config("Decimation factor must be at least 1"));
        }

        Ok(())
    }
}
