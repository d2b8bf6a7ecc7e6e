//! Append-only recording of captured frames
//!
//! The capture thread is the only writer. The active flag is only read or
//! changed with the buffer locked, so a frame is either in the recording
//! `stop()` hands back or rejected; never appended to the emptied buffer.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{AudioError, Result};
use crate::frame::AudioFrame;
use crate::ingest::FrameConsumer;
use crate::wav::write_pcm;

/// Outcome of serializing a recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingStatus {
    /// File written with this many samples
    Saved { path: PathBuf, samples: usize },
    /// Nothing was captured; no file was created
    NothingRecorded,
}

/// Frames taken out of the recorder at `stop()`.
///
/// Saving borrows the recording, so a failed write leaves the audio in place
/// for another attempt.
#[derive(Debug, Clone)]
pub struct Recording {
    frames: Vec<AudioFrame>,
    sample_rate: u32,
}

impl Recording {
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total samples across all frames
    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(AudioFrame::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count() as f64 / self.sample_rate as f64)
    }

    /// Samples of every frame concatenated in arrival order
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.frames.iter().flat_map(|f| f.samples().iter().copied())
    }

    /// Write the recording as mono PCM16 WAV.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<RecordingStatus> {
        if self.is_empty() {
            info!("No audio recorded, skipping save");
            return Ok(RecordingStatus::NothingRecorded);
        }

        let path = path.as_ref();
        let samples = write_pcm(path, self.samples(), self.sample_rate, 1, 16)?;
        info!(
            "Recording saved to {} ({} samples, {:.2}s)",
            path.display(),
            samples,
            self.duration().as_secs_f32()
        );
        Ok(RecordingStatus::Saved {
            path: path.to_path_buf(),
            samples,
        })
    }
}

struct RecorderShared {
    active: AtomicBool,
    buffer: Mutex<Vec<AudioFrame>>,
    sample_rate: u32,
}

/// Cloneable recorder handle: one clone lives in the capture callback, the
/// other with whoever toggles recording.
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<RecorderShared>,
}

impl Recorder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(RecorderShared {
                active: AtomicBool::new(false),
                buffer: Mutex::new(Vec::new()),
                sample_rate,
            }),
        }
    }

    /// Clear the buffer and begin accepting frames
    pub fn start(&self) {
        let mut buffer = self.shared.buffer.lock();
        buffer.clear();
        self.shared.active.store(true, Ordering::Release);
        drop(buffer);
        info!("Recording started");
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Copy `frame` into the buffer if recording is active. Returns whether
    /// the frame was kept.
    pub fn append(&self, frame: &AudioFrame) -> bool {
        let mut buffer = self.shared.buffer.lock();
        if !self.shared.active.load(Ordering::Acquire) {
            return false;
        }
        buffer.push(frame.clone());
        true
    }

    /// Frames buffered so far
    pub fn buffered_frames(&self) -> usize {
        self.shared.buffer.lock().len()
    }

    /// Mark recording inactive and hand back everything captured.
    pub fn stop(&self) -> Result<Recording> {
        let frames = {
            let mut buffer = self.shared.buffer.lock();
            if !self.shared.active.swap(false, Ordering::AcqRel) {
                return Err(AudioError::NotRecording);
            }
            std::mem::take(&mut *buffer)
        };
        debug!("Recording stopped with {} frames", frames.len());
        Ok(Recording {
            frames,
            sample_rate: self.shared.sample_rate,
        })
    }

    /// `stop()` followed by a synchronous save. Do not call from the
    /// capture thread.
    pub fn stop_and_save<P: AsRef<Path>>(&self, path: P) -> Result<RecordingStatus> {
        self.stop()?.save(path)
    }
}

impl FrameConsumer for Recorder {
    fn on_frame(&mut self, frame: &AudioFrame) {
        let _ = self.append(frame);
    }
}
