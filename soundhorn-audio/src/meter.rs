//! RMS loudness metering
//!
//! One dB value per frame, published last-value-wins through an atomic so the
//! capture thread never waits on whoever displays it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::frame::AudioFrame;
use crate::ingest::FrameConsumer;

/// Lower bound applied to RMS before taking the logarithm
pub const LOUDNESS_EPSILON: f64 = 1e-10;

/// `20 * log10(LOUDNESS_EPSILON)`, reported for digital silence
pub const LOUDNESS_FLOOR_DB: f32 = -200.0;

/// Root-mean-square amplitude on the PCM16 integer scale
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / samples.len() as f64).sqrt()
}

/// Loudness of a block in dB. Never returns -inf or NaN.
pub fn rms_db(samples: &[i16]) -> f32 {
    (20.0 * rms(samples).max(LOUDNESS_EPSILON).log10()) as f32
}

/// Shared handle to the most recent loudness value
#[derive(Clone, Debug)]
pub struct LevelHandle {
    level_bits: Arc<AtomicU32>,
}

impl LevelHandle {
    fn new(initial: f32) -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(initial.to_bits())),
        }
    }

    fn publish(&self, db: f32) {
        self.level_bits.store(db.to_bits(), Ordering::Release);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Acquire))
    }
}

/// Per-frame RMS meter with an optional display clamp
pub struct LoudnessMeter {
    clamp: Option<(f32, f32)>,
    level: LevelHandle,
    frames: u64,
}

impl LoudnessMeter {
    pub fn new(clamp: Option<(f32, f32)>) -> Self {
        let meter = Self {
            clamp,
            level: LevelHandle::new(LOUDNESS_FLOOR_DB),
            frames: 0,
        };
        meter.level.publish(meter.apply_clamp(LOUDNESS_FLOOR_DB));
        meter
    }

    /// Compute the loudness of `frame` and publish it.
    pub fn process(&mut self, frame: &AudioFrame) -> f32 {
        let db = self.apply_clamp(rms_db(frame.samples()));
        self.level.publish(db);
        self.frames += 1;
        db
    }

    pub fn handle(&self) -> LevelHandle {
        self.level.clone()
    }

    pub fn level_db(&self) -> f32 {
        self.level.level_db()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    fn apply_clamp(&self, db: f32) -> f32 {
        match self.clamp {
            Some((lo, hi)) => db.clamp(lo, hi),
            None => db,
        }
    }
}

impl Default for LoudnessMeter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FrameConsumer for LoudnessMeter {
    fn on_frame(&mut self, frame: &AudioFrame) {
        self.process(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_silence_reports_floor() {
        let mut meter = LoudnessMeter::default();
        let db = meter.process(&AudioFrame::from_samples(0, vec![0; 1024]));
        assert!(db.is_finite());
        assert_relative_eq!(db, LOUDNESS_FLOOR_DB);
        assert_relative_eq!(
            LOUDNESS_FLOOR_DB as f64,
            20.0 * LOUDNESS_EPSILON.log10(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_empty_frame_is_floor() {
        assert_relative_eq!(rms_db(&[]), LOUDNESS_FLOOR_DB);
    }

    #[test]
    fn test_constant_amplitude() {
        // RMS of a constant 1000 is 1000 -> 60 dB
        let samples = vec![1000i16; 512];
        assert_relative_eq!(rms_db(&samples), 60.0, epsilon = 1e-4);

        // Sign does not matter
        let samples: Vec<i16> = (0..512).map(|i| if i % 2 == 0 { 1000 } else { -1000 }).collect();
        assert_relative_eq!(rms_db(&samples), 60.0, epsilon = 1e-4);
    }

    #[test]
    fn test_clamp_applies_to_published_value() {
        let mut meter = LoudnessMeter::new(Some((0.0, 100.0)));
        assert_eq!(meter.level_db(), 0.0);

        let handle = meter.handle();
        meter.process(&AudioFrame::from_samples(0, vec![0; 64]));
        assert_eq!(handle.level_db(), 0.0);

        meter.process(&AudioFrame::from_samples(1, vec![1000; 64]));
        assert_relative_eq!(handle.level_db(), 60.0, epsilon = 1e-4);
        assert_eq!(meter.frames_processed(), 2);
    }

    #[test]
    fn test_handle_keeps_latest_only() {
        let mut meter = LoudnessMeter::default();
        let handle = meter.handle();
        meter.process(&AudioFrame::from_samples(0, vec![1000; 64]));
        meter.process(&AudioFrame::from_samples(1, vec![10; 64]));
        assert_relative_eq!(handle.level_db(), 20.0, epsilon = 1e-4);
    }
}
