//! Streaming resample stage.
//!
//! Uses Rubato to convert decoded interleaved `f32` audio from the source rate
//! to the output device rate. Runs in a background thread and writes into a bounded
//! [`SharedAudio`] queue consumed by the playback stage.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::queue::{PopStrategy, SharedAudio, calc_max_buffered_samples};

/// Configuration for the streaming resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,

    /// Target buffering (seconds) for the resampler output queue.
    pub buffer_seconds: f32,
}

/// One resampler plus its reusable output buffer.
///
/// The filter delay is trimmed from the start of the output, and the total
/// output is capped at `ceil(frames_in * ratio)` so padded tails don't add
/// trailing silence.
struct Stage {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    out: Vec<f32>,
    frames_to_trim: usize,
    frames_in: u64,
    frames_out: u64,
}

impl Stage {
    fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let resampler = Async::<f32>::new_sinc(
            dst_rate as f64 / src_rate as f64,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;

        let out_frames = resampler.output_frames_max();
        let frames_to_trim = resampler.output_delay();
        Ok(Self {
            resampler: Box::new(resampler),
            channels,
            out: vec![0.0; channels * out_frames.max(chunk_frames * 3)],
            frames_to_trim,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Output frames still owed for the input seen so far.
    fn pending_frames(&self) -> u64 {
        let expected = (self.resampler.resample_ratio() * self.frames_in as f64).ceil() as u64;
        expected.saturating_sub(self.frames_out)
    }

    /// Resample one chunk of interleaved input; `partial` marks a short final chunk.
    fn process(&mut self, input: &[f32], partial: bool) -> Result<&[f32]> {
        let in_frames = input.len() / self.channels;
        let out_frames = self.out.len() / self.channels;

        let input_adapter = InterleavedSlice::new(input, self.channels, in_frames)
            .map_err(|e| anyhow!("interleaved input: {e}"))?;
        let mut output_adapter = InterleavedSlice::new_mut(&mut self.out, self.channels, out_frames)
            .map_err(|e| anyhow!("interleaved output: {e}"))?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: partial.then_some(in_frames),
        };

        let (_consumed, produced) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resample: {e}"))?;
        self.frames_in += in_frames as u64;

        let start = self.frames_to_trim.min(produced);
        self.frames_to_trim -= start;
        let keep = ((produced - start) as u64).min(self.pending_frames()) as usize;
        self.frames_out += keep as u64;

        let ch = self.channels;
        Ok(&self.out[start * ch..(start + keep) * ch])
    }

    /// Pump silence through the filter to release the frames it still holds.
    /// Returns `None` once the output has caught up with the input.
    fn drain(&mut self) -> Result<Option<&[f32]>> {
        if self.pending_frames() == 0 {
            return Ok(None);
        }
        self.process(&[], true).map(Some)
    }
}

/// Start a background resampler thread.
///
/// Reads from `srcq` at `src_rate` and produces interleaved `f32` at `dst_rate`
/// into a new queue. When `srcq` closes and its tail is flushed, the output
/// queue is closed. If the consumer closes the output queue first, the
/// source queue is closed too so the decoder stops.
pub fn start_resampler(
    srcq: Arc<SharedAudio>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SharedAudio>> {
    let channels = srcq.channels();
    let chunk_frames = cfg.chunk_frames.max(1);

    let max_buffered_samples = calc_max_buffered_samples(dst_rate, channels, cfg.buffer_seconds);
    let dstq = Arc::new(SharedAudio::new(channels, max_buffered_samples));

    // The resampler is built on its own thread; init errors come back here.
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
    let dstq_thread = dstq.clone();
    thread::Builder::new()
        .name("eq-player-resample".to_string())
        .spawn(move || {
            let mut stage = match Stage::new(src_rate, dst_rate, channels, chunk_frames) {
                Ok(stage) => {
                    let _ = ready_tx.send(Ok(()));
                    stage
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    srcq.close();
                    dstq_thread.close();
                    return;
                }
            };
            if let Err(e) = run_stage(&mut stage, &srcq, &dstq_thread, chunk_frames) {
                tracing::error!("resampler error: {e:#}");
            }
            srcq.close();
            dstq_thread.close();
        })
        .context("spawn resampler thread")?;

    ready_rx
        .recv()
        .map_err(|_| anyhow!("resampler thread exited during init"))??;
    Ok(dstq)
}

fn run_stage(
    stage: &mut Stage,
    srcq: &SharedAudio,
    dstq: &SharedAudio,
    chunk_frames: usize,
) -> Result<()> {
    while let Some(chunk) = srcq.pop(PopStrategy::BlockingExact {
        frames: chunk_frames,
    }) {
        if dstq.is_done() {
            return Ok(());
        }
        let out = stage.process(&chunk, false)?;
        if !dstq.push_interleaved_blocking(out) {
            return Ok(());
        }
    }

    // Source closed: flush whatever is left in short chunks.
    while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo {
        max_frames: chunk_frames,
    }) {
        let out = stage.process(&tail, true)?;
        if !out.is_empty() && !dstq.push_interleaved_blocking(out) {
            return Ok(());
        }
    }

    while let Some(out) = stage.drain()? {
        if dstq.is_done() {
            return Ok(());
        }
        if !out.is_empty() && !dstq.push_interleaved_blocking(out) {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_end(src_rate: u32, dst_rate: u32, frames: usize) -> usize {
        let srcq = Arc::new(SharedAudio::new(2, frames * 2 + 16));
        let samples: Vec<f32> = (0..frames)
            .flat_map(|n| {
                let v = (n as f32 * 0.01).sin() * 0.5;
                [v, -v]
            })
            .collect();
        srcq.push_interleaved_blocking(&samples);
        srcq.close();

        let dstq = start_resampler(
            srcq,
            src_rate,
            dst_rate,
            ResampleConfig {
                chunk_frames: 256,
                buffer_seconds: 0.5,
            },
        )
        .unwrap();

        let mut produced = 0;
        while let Some(v) = dstq.pop(PopStrategy::BlockingUpTo { max_frames: 1024 }) {
            assert!(v.iter().all(|s| s.is_finite()));
            produced += v.len() / 2;
        }
        produced
    }

    #[test]
    fn upsampling_scales_frame_count() {
        // 44_100 is not a multiple of the 256-frame chunk, so the tail is partial.
        let produced = run_to_end(44_100, 48_000, 44_100);
        assert!(produced.abs_diff(48_000) <= 1, "produced {produced}");
    }

    #[test]
    fn downsampling_scales_frame_count() {
        let produced = run_to_end(48_000, 24_000, 24_000);
        assert!(produced.abs_diff(12_000) <= 1, "produced {produced}");
    }

    #[test]
    fn drain_releases_filter_delay() {
        let mut stage = Stage::new(44_100, 48_000, 1, 64).unwrap();
        let produced = stage.process(&[0.5f32; 64], false).unwrap().len();
        assert!(stage.pending_frames() > 0);

        let mut drained = 0;
        while let Some(out) = stage.drain().unwrap() {
            drained += out.len();
        }
        assert!(drained > 0);
        assert_eq!(stage.pending_frames(), 0);
        let expected = (64.0f64 * 48_000.0 / 44_100.0).ceil() as usize;
        assert!((produced + drained).abs_diff(expected) <= 1);
    }

    #[test]
    fn closing_output_closes_source() {
        let srcq = Arc::new(SharedAudio::new(1, 64));
        let dstq = start_resampler(
            srcq.clone(),
            44_100,
            48_000,
            ResampleConfig {
                chunk_frames: 16,
                buffer_seconds: 0.01,
            },
        )
        .unwrap();
        dstq.close();
        for _ in 0..200 {
            if srcq.is_done() {
                break;
            }
            // Feed a chunk so a stage waiting on input notices the close.
            srcq.push_interleaved_blocking(&[0.0; 16]);
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(srcq.is_done());
    }
}
