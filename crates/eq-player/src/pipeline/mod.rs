//! Playback pipeline wiring: resample + output stream + drain/cancel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use symphonia::core::audio::SignalSpec;

use crate::config::PlaybackConfig;
use crate::playback::{self, OutputOptions};
use crate::queue::{self, SharedAudio};
use crate::resample;

/// How a running pipeline finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineEnd {
    /// Every queued sample reached the device.
    Drained,
    /// The session's cancel flag was raised.
    Cancelled,
    /// The output stream reported an error.
    StreamFailed,
}

/// A started output stream and the queues feeding it.
///
/// Holds the CPAL stream, so it must stay on the thread that created it.
pub struct RunningPipeline {
    stream: cpal::Stream,
    srcq: Arc<SharedAudio>,
    dstq: Arc<SharedAudio>,
    stream_failed: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    resampling: bool,
}

/// Wire up the resampler (when rates differ) and start the output stream.
pub fn start(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    stream_config: &cpal::StreamConfig,
    playback: &PlaybackConfig,
    src_spec: SignalSpec,
    srcq: Arc<SharedAudio>,
    opts: OutputOptions,
) -> Result<RunningPipeline> {
    let dst_rate = stream_config.sample_rate;
    let resampling = src_spec.rate != dst_rate;
    let dstq = if resampling {
        tracing::info!(from_hz = src_spec.rate, to_hz = dst_rate, "resampling");
        resample::start_resampler(
            srcq.clone(),
            src_spec.rate,
            dst_rate,
            resample::ResampleConfig {
                chunk_frames: playback.chunk_frames,
                buffer_seconds: playback.buffer_seconds,
            },
        )?
    } else {
        tracing::info!(rate_hz = dst_rate, "resample skipped");
        srcq.clone()
    };

    let stream_failed = opts.stream_failed.clone();
    let paused = opts.paused.clone();
    let stream = match playback::build_output_stream(
        device,
        stream_config,
        config.sample_format(),
        &dstq,
        OutputOptions {
            refill_max_frames: playback.refill_max_frames,
            ..opts
        },
    )
    .and_then(|s| s.play().map(|()| s).context("start output stream"))
    {
        Ok(stream) => stream,
        Err(e) => {
            srcq.close();
            dstq.close();
            return Err(e);
        }
    };

    Ok(RunningPipeline {
        stream,
        srcq,
        dstq,
        stream_failed,
        paused,
        resampling,
    })
}

impl RunningPipeline {
    /// Whether a resampler stage sits between decoder and device.
    pub fn resampling(&self) -> bool {
        self.resampling
    }

    /// Block until playback drains, `cancel` is raised, or the stream fails.
    ///
    /// Any early exit closes both queues so upstream threads wind down.
    pub fn wait(self, cancel: &AtomicBool) -> PipelineEnd {
        let drained = queue::wait_until_done_and_empty_or(&self.dstq, || {
            cancel.load(Ordering::Relaxed) || self.stream_failed.load(Ordering::Relaxed)
        });

        let end = if drained {
            // Let the device play out its last callback buffer.
            thread::sleep(Duration::from_millis(100));
            PipelineEnd::Drained
        } else {
            self.paused.store(true, Ordering::Relaxed);
            self.srcq.close();
            self.dstq.close();
            if cancel.load(Ordering::Relaxed) {
                PipelineEnd::Cancelled
            } else {
                PipelineEnd::StreamFailed
            }
        };

        if let Err(e) = self.stream.pause() {
            tracing::debug!("pause output stream on teardown: {e}");
        }
        end
    }
}
