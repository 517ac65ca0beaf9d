//! Byte counting reader that doubles as the playback clock

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// s16le, 2 channels, 44.1 kHz
pub const SAMPLE_RATE: u32 = 44_100;
pub const CHANNELS: u16 = 2;
pub const BYTES_PER_SAMPLE: u32 = 2;
pub const BYTES_PER_SECOND: u64 = SAMPLE_RATE as u64 * CHANNELS as u64 * BYTES_PER_SAMPLE as u64;

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    finished: AtomicBool,
}

/// Wraps the transcoder output. Every byte handed to the audio pump is counted,
/// so the count divided by the PCM byte rate is the elapsed playback time.
pub struct ByteCounter<R> {
    inner: R,
    counters: Arc<Counters>,
}

/// Lock-free view on a `ByteCounter`, safe to read from the tick task
#[derive(Clone, Debug, Default)]
pub struct PositionHandle {
    counters: Arc<Counters>,
}

impl<R: Read> ByteCounter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn handle(&self) -> PositionHandle {
        PositionHandle {
            counters: self.counters.clone(),
        }
    }
}

impl<R: Read> Read for ByteCounter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.counters.finished.store(true, Ordering::Release);
                Ok(0)
            }
            Ok(n) => {
                self.counters.total.fetch_add(n as u64, Ordering::AcqRel);
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }
}

impl PositionHandle {
    pub fn total_bytes(&self) -> u64 {
        self.counters.total.load(Ordering::Acquire)
    }

    pub fn current_seconds(&self) -> f64 {
        self.total_bytes() as f64 / BYTES_PER_SECOND as f64
    }

    /// True once the underlying stream returned EOF
    pub fn is_finished(&self) -> bool {
        self.counters.finished.load(Ordering::Acquire)
    }
}

#[cfg(test)]
impl PositionHandle {
    pub(crate) fn add_bytes(&self, n: u64) {
        self.counters.total.fetch_add(n, Ordering::AcqRel);
    }

    pub(crate) fn mark_finished(&self) {
        self.counters.finished.store(true, Ordering::Release);
    }
}
