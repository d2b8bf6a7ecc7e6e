//! Hand-off of match events from the capture thread to the automation task

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use soundhorn_audio::{AudioFrame, FrameConsumer};

use crate::matcher::{MatchEvent, TemplateMatcher};

/// Default number of pending events kept before the oldest is dropped
pub const DEFAULT_MATCH_QUEUE_CAPACITY: usize = 8;

struct QueueInner {
    ring: Mutex<HeapRb<MatchEvent>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

/// Bounded drop-oldest event queue.
///
/// `push` never waits on the reader: the lock is only held for a single
/// ring operation.
#[derive(Clone)]
pub struct MatchQueue {
    inner: Arc<QueueInner>,
}

impl MatchQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                ring: Mutex::new(HeapRb::new(capacity)),
                capacity,
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue an event. Returns false if the oldest pending event was evicted.
    pub fn push(&self, event: MatchEvent) -> bool {
        let evicted = self.inner.ring.lock().push_overwrite(event);
        self.inner.notify.notify_one();

        match evicted {
            Some(old) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Match queue full, dropped event for '{}'", old.template);
                false
            }
            None => true,
        }
    }

    pub fn try_pop(&self) -> Option<MatchEvent> {
        self.inner.ring.lock().try_pop()
    }

    /// Wait for the next event.
    pub async fn recv(&self) -> MatchEvent {
        loop {
            if let Some(event) = self.try_pop() {
                return event;
            }
            // notify_one stores a permit, so a push between the check and
            // this await is not lost
            self.inner.notify.notified().await;
        }
    }

    /// Discard everything pending. Returns the number removed.
    pub fn clear(&self) -> usize {
        let mut ring = self.inner.ring.lock();
        let mut removed = 0;
        while ring.try_pop().is_some() {
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.ring.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Default for MatchQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_QUEUE_CAPACITY)
    }
}

/// Arms event delivery for one listen window at a time.
///
/// Each `arm()` starts a new generation; events carry the generation they
/// were accepted under so a reader can discard ones from an older window.
pub struct ListenGate {
    armed: AtomicBool,
    generation: AtomicU64,
    expected: Option<String>,
}

impl ListenGate {
    /// `expected` restricts delivery to one template name
    pub fn new(expected: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            armed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            expected,
        })
    }

    /// Open a new listen window and return its generation
    pub fn arm(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.armed.store(true, Ordering::Release);
        generation
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn expected(&self) -> Option<&str> {
        self.expected.as_deref()
    }

    /// Generation to stamp on an event for `template`, or None if the gate
    /// is closed to it.
    pub fn accepts(&self, template: &str) -> Option<u64> {
        if !self.is_armed() {
            return None;
        }
        match self.expected.as_deref() {
            Some(expected) if expected != template => None,
            _ => Some(self.generation()),
        }
    }
}

/// Capture-side stage: runs the matcher and forwards gated events.
pub struct MatchForwarder {
    matcher: TemplateMatcher,
    gate: Arc<ListenGate>,
    queue: MatchQueue,
}

impl MatchForwarder {
    /// A gate expecting one template also narrows the matcher to it, so a
    /// stronger match on another template cannot hide the expected one.
    pub fn new(mut matcher: TemplateMatcher, gate: Arc<ListenGate>, queue: MatchQueue) -> Self {
        if let Err(e) = matcher.focus(gate.expected()) {
            warn!("Listen gate expects a template the matcher does not have: {}", e);
        }
        Self {
            matcher,
            gate,
            queue,
        }
    }

    pub fn matcher(&self) -> &TemplateMatcher {
        &self.matcher
    }

    /// Process one frame; returns true if an event was queued.
    pub fn forward(&mut self, frame: &AudioFrame) -> bool {
        let Some(mut event) = self.matcher.process(frame) else {
            return false;
        };

        match self.gate.accepts(&event.template) {
            Some(generation) => {
                event.generation = generation;
                self.queue.push(event);
                true
            }
            None => {
                debug!("Ignoring match for '{}' outside a listen window", event.template);
                false
            }
        }
    }
}

impl FrameConsumer for MatchForwarder {
    fn on_frame(&mut self, frame: &AudioFrame) {
        self.forward(frame);
    }
}
