//! Error types for template loading and matching

use thiserror::Error;

/// Result type for detection operations
pub type Result<T> = std::result::Result<T, DetectError>;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectError {
    /// Configuration error (bad threshold, missing or unusable template)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Template file could not be decoded
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Resampling or other audio-layer failure
    #[error("Audio error: {0}")]
    Audio(soundhorn_audio::AudioError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<soundhorn_audio::AudioError> for DetectError {
    fn from(err: soundhorn_audio::AudioError) -> Self {
        match err {
            soundhorn_audio::AudioError::Wav(e) => Self::Wav(e),
            soundhorn_audio::AudioError::Io(e) => Self::Io(e),
            other => Self::Audio(other),
        }
    }
}

impl DetectError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
