//! Fixed-size PCM16 frames and the assembler that cuts device blocks into them

use std::time::{Duration, Instant};

/// One fixed-length block of mono PCM16 samples.
///
/// Frames are immutable once produced. Consumers borrow them during fan-out;
/// anything that needs the samples after its processing step copies them.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    seq: u64,
    captured_at: Instant,
    samples: Box<[i16]>,
}

impl AudioFrame {
    pub fn new(seq: u64, captured_at: Instant, samples: Vec<i16>) -> Self {
        Self {
            seq,
            captured_at,
            samples: samples.into_boxed_slice(),
        }
    }

    /// Build a frame stamped with the current instant (tests, offline files)
    pub fn from_samples(seq: u64, samples: Vec<i16>) -> Self {
        Self::new(seq, Instant::now(), samples)
    }

    /// Monotonically increasing sequence number assigned by the assembler
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of this frame at `sample_rate`
    pub fn duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / sample_rate as f64)
    }
}

/// Convert a normalized f32 sample to PCM16.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * i16::MAX as f32).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert an unsigned 16-bit sample to PCM16.
pub fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32_768) as i16
}

/// Cuts arbitrary device callback blocks into fixed-size mono frames.
///
/// Multi-channel input is averaged down to mono before it is buffered. Leftover
/// samples are carried to the next call so every emitted frame has exactly
/// `frame_size` samples.
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<i16>,
    next_seq: u64,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
            next_seq: 0,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for the next full frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sequence number the next emitted frame will carry
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Feed one interleaved device block and emit every completed frame.
    pub fn push<T, F, E>(&mut self, data: &[T], channels: usize, mut convert: F, mut emit: E)
    where
        T: Copy,
        F: FnMut(T) -> i16,
        E: FnMut(AudioFrame),
    {
        if channels <= 1 {
            self.pending.extend(data.iter().copied().map(&mut convert));
        } else {
            for block in data.chunks(channels) {
                let sum: i32 = block.iter().map(|&s| convert(s) as i32).sum();
                self.pending.push((sum / block.len() as i32) as i16);
            }
        }

        let now = Instant::now();
        while self.pending.len() >= self.frame_size {
            let samples: Vec<i16> = self.pending.drain(..self.frame_size).collect();
            let frame = AudioFrame::new(self.next_seq, now, samples);
            self.next_seq += 1;
            emit(frame);
        }
    }

    /// Drop buffered partial data and restart numbering
    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_seq = 0;
    }
}
