//! Drop-oldest frame ring between the device callback and its consumers

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::AudioError;
use crate::frame::AudioFrame;

/// Anything that reads frames during fan-out.
///
/// The frame reference is only valid for the duration of the call.
pub trait FrameConsumer {
    fn on_frame(&mut self, frame: &AudioFrame);
}

impl<F> FrameConsumer for F
where
    F: FnMut(&AudioFrame),
{
    fn on_frame(&mut self, frame: &AudioFrame) {
        self(frame)
    }
}

/// Ingestor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Running,
    Stopped,
}

/// Counters and failure flag shared between the capture callbacks and callers
#[derive(Debug, Default)]
pub struct IngestStatus {
    stopped: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
    error: Mutex<Option<String>>,
}

impl IngestStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> IngestState {
        if self.stopped.load(Ordering::Acquire) {
            IngestState::Stopped
        } else {
            IngestState::Running
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == IngestState::Stopped
    }

    /// Frames accepted since creation
    pub fn pushed_frames(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Frames overwritten before a consumer saw them
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record a fatal capture failure. Returns true only for the first one.
    pub fn fail<S: Into<String>>(&self, msg: S) -> bool {
        let msg = msg.into();
        if self.stopped.swap(true, Ordering::AcqRel) {
            warn!("Capture already stopped, ignoring: {}", msg);
            return false;
        }
        error!("Capture stopped: {}", msg);
        *self.error.lock() = Some(msg);
        true
    }

    /// Take the fatal error, if any. Later calls return None.
    pub fn take_error(&self) -> Option<AudioError> {
        self.error.lock().take().map(AudioError::DeviceError)
    }
}

/// Bounded frame ring with drop-oldest overflow.
///
/// `push` never blocks: when the ring is full the oldest unconsumed frame is
/// overwritten and the drop counter is bumped. `dispatch` hands every pending
/// frame, oldest first, to a consumer by reference.
pub struct FrameIngestor {
    ring: HeapRb<AudioFrame>,
    capacity: usize,
    status: Arc<IngestStatus>,
}

impl FrameIngestor {
    pub fn new(capacity: usize) -> Self {
        Self::with_status(capacity, IngestStatus::new())
    }

    pub fn with_status(capacity: usize, status: Arc<IngestStatus>) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: HeapRb::new(capacity),
            capacity,
            status,
        }
    }

    /// Accept one frame from the device side.
    ///
    /// Returns false if the ingestor is stopped and the frame was rejected.
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        if self.status.is_stopped() {
            return false;
        }

        if self.ring.push_overwrite(frame).is_some() {
            self.status.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.status.pushed.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Fan every pending frame out to `consumer`, oldest first.
    pub fn dispatch<C: FrameConsumer + ?Sized>(&mut self, consumer: &mut C) -> usize {
        let mut delivered = 0;
        while let Some(frame) = self.ring.try_pop() {
            consumer.on_frame(&frame);
            delivered += 1;
        }
        delivered
    }

    /// Transition to Stopped and discard anything still queued.
    pub fn fail<S: Into<String>>(&mut self, msg: S) -> bool {
        let first = self.status.fail(msg);
        while self.ring.try_pop().is_some() {}
        first
    }

    pub fn pending(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> IngestState {
        self.status.state()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.status.dropped_frames()
    }

    pub fn status(&self) -> Arc<IngestStatus> {
        Arc::clone(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> AudioFrame {
        AudioFrame::from_samples(seq, vec![seq as i16; 4])
    }

    #[test]
    fn test_push_and_dispatch_in_order() {
        let mut ingestor = FrameIngestor::new(8);
        for seq in 0..3 {
            assert!(ingestor.push(frame(seq)));
        }
        assert_eq!(ingestor.pending(), 3);

        let mut seen = Vec::new();
        let delivered = ingestor.dispatch(&mut |f: &AudioFrame| seen.push(f.seq()));
        assert_eq!(delivered, 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(ingestor.pending(), 0);
        assert_eq!(ingestor.dropped_frames(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut ingestor = FrameIngestor::new(4);
        for seq in 0..10 {
            assert!(ingestor.push(frame(seq)));
        }

        assert_eq!(ingestor.pending(), 4);
        assert_eq!(ingestor.dropped_frames(), 6);

        let mut seen = Vec::new();
        ingestor.dispatch(&mut |f: &AudioFrame| seen.push(f.seq()));
        assert_eq!(seen, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_fan_out_to_multiple_consumers() {
        let mut ingestor = FrameIngestor::new(4);
        ingestor.push(frame(0));
        ingestor.push(frame(1));

        let mut lens = Vec::new();
        let mut seqs = Vec::new();
        ingestor.dispatch(&mut |f: &AudioFrame| {
            lens.push(f.len());
            seqs.push(f.seq());
        });
        assert_eq!(lens, vec![4, 4]);
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_failure_stops_ingestor_once() {
        let mut ingestor = FrameIngestor::new(4);
        ingestor.push(frame(0));

        assert!(ingestor.fail("device unplugged"));
        assert!(!ingestor.fail("second error"));
        assert_eq!(ingestor.state(), IngestState::Stopped);
        assert_eq!(ingestor.pending(), 0);
        assert!(!ingestor.push(frame(1)));

        let status = ingestor.status();
        let err = status.take_error().expect("first error is kept");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("device unplugged"));
        assert!(status.take_error().is_none());
    }
}
