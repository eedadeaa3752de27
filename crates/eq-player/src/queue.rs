//! Bounded, closable queue of interleaved `f32` samples.
//!
//! Every stage boundary in a playback session is one of these:
//! - decoder thread → queue
//! - resampler thread → queue
//! - output callback drains the last queue without blocking
//!
//! `close()` plus drain semantics make shutdown deterministic for both EOF and
//! cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Thread-safe bounded queue for interleaved `f32` audio samples.
///
/// Samples are stored interleaved (`frame0[ch0], frame0[ch1], frame1[ch0], ...`)
/// and the channel count is fixed for the lifetime of the queue. The `done`
/// flag lives under the same mutex as the samples so that "closed and empty"
/// can be observed atomically.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
    created: Instant,
    low_watermark_logged_ms: AtomicU64,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Strategy for popping interleaved frames from the queue.
#[derive(Clone, Copy, Debug)]
pub enum PopStrategy {
    /// Block until exactly `frames` are available, or return `None` if closed before enough data.
    BlockingExact { frames: usize },
    /// Block until at least one frame is available, then return up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Return immediately with up to `max_frames`, or `None` if currently empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `seconds` of audio at `rate_hz` × `channels`.
///
/// Non-finite or non-positive `buffer_seconds` falls back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SharedAudio {
    /// Create a queue holding at most `max_buffered_samples` samples (not frames).
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
            created: Instant::now(),
            low_watermark_logged_ms: AtomicU64::new(0),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SharedInner>) -> MutexGuard<'a, SharedInner> {
        self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Channel count of the interleaved stream.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the producer has closed the queue (it may still hold samples).
    pub fn is_done(&self) -> bool {
        self.lock_inner().done
    }

    /// Mark the queue finished and wake all waiters. Idempotent.
    ///
    /// Blocked pushes return early and drop their remaining samples; blocked
    /// pops return `None` once the queue drains.
    pub fn close(&self) {
        self.lock_inner().done = true;
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every sample was accepted.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) -> bool {
        let mut rest = samples;

        while !rest.is_empty() {
            let mut g = self.lock_inner();
            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.wait(g);
            }
            if g.done {
                return false;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let (now, later) = rest.split_at(room.min(rest.len()));
            g.queue.extend(now.iter().copied());
            rest = later;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop interleaved frames using the requested strategy.
    ///
    /// Returns `None` when the queue is closed and no data can satisfy the request.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock_inner();

        let take_frames = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.queue.len() < want && !g.done {
                    g = self.wait(g);
                }
                if g.queue.len() < want {
                    return None;
                }
                frames
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.queue.len() < self.channels && !g.done {
                    g = self.wait(g);
                }
                let available = g.queue.len() / self.channels;
                if available == 0 {
                    return None;
                }
                available.min(max_frames)
            }
            PopStrategy::NonBlocking { max_frames } => {
                let available = g.queue.len() / self.channels;
                let take = available.min(max_frames);
                if take == 0 {
                    return None;
                }
                take
            }
        };

        let out: Vec<f32> = g.queue.drain(..take_frames * self.channels).collect();
        let remaining = g.queue.len();
        drop(g);
        self.cv.notify_all();
        self.note_low_watermark(remaining);
        Some(out)
    }

    /// Log (at most once a second) when the buffered level dips below 1/8 of capacity.
    fn note_low_watermark(&self, queued: usize) {
        let threshold = (self.max_buffered_samples / 8).max(self.channels * 16);
        if queued == 0 || queued >= threshold {
            return;
        }
        let now_ms = self.created.elapsed().as_millis() as u64 + 1;
        let last = self.low_watermark_logged_ms.load(Ordering::Relaxed);
        if last == 0 || now_ms.saturating_sub(last) > 1000 {
            self.low_watermark_logged_ms.store(now_ms, Ordering::Relaxed);
            tracing::debug!(
                queued_samples = queued,
                threshold_samples = threshold,
                "audio queue low watermark"
            );
        }
    }
}

/// Block until `q` is closed and drained, or `stop` returns true.
///
/// `stop` is polled at least every 50 ms. Returns `true` if the queue drained
/// normally, `false` if stopped.
pub fn wait_until_done_and_empty_or(q: &SharedAudio, stop: impl Fn() -> bool) -> bool {
    let mut g = q.lock_inner();
    loop {
        if stop() {
            return false;
        }
        if g.done && g.queue.is_empty() {
            return true;
        }
        let (ng, _timeout) = q
            .cv
            .wait_timeout(g, Duration::from_millis(50))
            .unwrap_or_else(PoisonError::into_inner);
        g = ng;
    }
}
