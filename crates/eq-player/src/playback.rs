//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - refills a small local buffer from the shared queue without blocking
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - runs the equalizer, when one is attached
//! - converts `f32` samples to the device sample format

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::eq::{EqControl, Equalizer};
use crate::queue::{PopStrategy, SharedAudio};

/// Configuration for the playback stage (CPAL output callback).
#[derive(Clone, Debug, Default)]
pub struct OutputOptions {
    /// Maximum number of frames to pull from the queue per refill.
    ///
    /// Larger values reduce mutex/queue churn but can increase latency.
    pub refill_max_frames: usize,

    /// When `true`, the callback outputs silence and does not drain the queue.
    pub paused: Arc<AtomicBool>,

    /// Incremented by the number of output frames taken from the queue.
    pub played_frames: Arc<AtomicU64>,

    /// Incremented when the callback has to output silence.
    pub underrun_frames: Arc<AtomicU64>,
    pub underrun_events: Arc<AtomicU64>,

    /// Raised from the stream error callback.
    pub stream_failed: Arc<AtomicBool>,

    /// Preset selection for the equalizer stage; `None` means no EQ stage.
    pub eq: Option<Arc<EqControl>>,
}

/// Build a CPAL output stream that plays audio from `dstq`.
///
/// `dstq` must contain interleaved `f32` samples already at the device rate.
/// Underruns are filled with silence; the callback never waits on a condition
/// variable.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    dstq: &Arc<SharedAudio>,
    opts: OutputOptions,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, dstq, opts),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, dstq, opts),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, dstq, opts),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, dstq, opts),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    dstq: &Arc<SharedAudio>,
    opts: OutputOptions,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let mut renderer = Renderer::new(
        dstq.clone(),
        channels_out,
        config.sample_rate,
        opts.refill_max_frames,
        opts.eq.clone(),
    );

    let paused = opts.paused.clone();
    let played_frames = opts.played_frames.clone();
    let underrun_frames = opts.underrun_frames.clone();
    let underrun_events = opts.underrun_events.clone();
    let stream_failed = opts.stream_failed.clone();

    let err_fn = move |err| {
        tracing::warn!("stream error: {err}");
        stream_failed.store(true, Ordering::Relaxed);
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
            if paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            let rendered = renderer.render(data.len() / channels_out);
            let samples = rendered.frames * channels_out;
            for (dst, src) in data.iter_mut().zip(&renderer.scratch[..samples]) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
            data[samples..].fill(silence);

            if rendered.frames > 0 {
                played_frames.fetch_add(rendered.frames as u64, Ordering::Relaxed);
            }
            if rendered.underrun_frames > 0 {
                underrun_events.fetch_add(1, Ordering::Relaxed);
                underrun_frames.fetch_add(rendered.underrun_frames as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[derive(Debug, PartialEq, Eq)]
struct Rendered {
    frames: usize,
    underrun_frames: usize,
}

/// State owned by the output callback: the last chunk popped from the queue,
/// a scratch buffer of mapped output samples, and the equalizer.
struct Renderer {
    queue: Arc<SharedAudio>,
    src_channels: usize,
    dst_channels: usize,
    refill_max_frames: usize,
    src: Vec<f32>,
    pos: usize,
    scratch: Vec<f32>,
    eq: Option<(Arc<EqControl>, Equalizer)>,
}

impl Renderer {
    fn new(
        queue: Arc<SharedAudio>,
        dst_channels: usize,
        sample_rate: u32,
        refill_max_frames: usize,
        eq: Option<Arc<EqControl>>,
    ) -> Self {
        let dst_channels = dst_channels.max(1);
        Self {
            src_channels: queue.channels(),
            queue,
            dst_channels,
            refill_max_frames: refill_max_frames.max(1),
            src: Vec::new(),
            pos: 0,
            scratch: Vec::new(),
            eq: eq.map(|control| (control, Equalizer::new(sample_rate, dst_channels))),
        }
    }

    /// Fill `scratch` with up to `frames` mapped, equalized frames.
    fn render(&mut self, frames: usize) -> Rendered {
        if self.scratch.len() < frames * self.dst_channels {
            self.scratch.resize(frames * self.dst_channels, 0.0);
        }

        let mut filled = 0usize;
        while filled < frames {
            if self.pos >= self.src.len() && !self.refill() {
                break;
            }
            let at = filled * self.dst_channels;
            map_frame(
                &self.src[self.pos..self.pos + self.src_channels],
                &mut self.scratch[at..at + self.dst_channels],
            );
            self.pos += self.src_channels;
            filled += 1;
        }

        if let Some((control, eq)) = self.eq.as_mut() {
            eq.sync(control);
            eq.process_interleaved(&mut self.scratch[..filled * self.dst_channels]);
        }

        Rendered {
            frames: filled,
            underrun_frames: frames - filled,
        }
    }

    fn refill(&mut self) -> bool {
        self.pos = 0;
        match self.queue.pop(PopStrategy::NonBlocking {
            max_frames: self.refill_max_frames,
        }) {
            Some(v) => {
                self.src = v;
                true
            }
            None => {
                self.src.clear();
                false
            }
        }
    }
}

/// Map one source frame onto one destination frame.
///
/// - mono → any: duplicate channel 0
/// - stereo → mono: average L/R
/// - otherwise: channel `i` takes source channel `min(i, src - 1)`
fn map_frame(src: &[f32], dst: &mut [f32]) {
    match (src.len(), dst.len()) {
        (2, 1) => dst[0] = 0.5 * (src[0] + src[1]),
        (n, _) if n > 0 => {
            for (ch, out) in dst.iter_mut().enumerate() {
                *out = src[ch.min(n - 1)];
            }
        }
        _ => dst.fill(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(channels: usize, samples: &[f32]) -> Arc<SharedAudio> {
        let q = Arc::new(SharedAudio::new(channels, 1024));
        q.push_interleaved_blocking(samples);
        q
    }

    #[test]
    fn map_frame_covers_common_layouts() {
        let mut stereo = [0.0; 2];
        map_frame(&[0.4], &mut stereo);
        assert_eq!(stereo, [0.4, 0.4]);

        let mut mono = [0.0; 1];
        map_frame(&[0.2, 0.6], &mut mono);
        assert!((mono[0] - 0.4).abs() < 1e-6);

        let mut quad = [0.0; 4];
        map_frame(&[0.1, 0.2], &mut quad);
        assert_eq!(quad, [0.1, 0.2, 0.2, 0.2]);

        let mut two = [9.0; 2];
        map_frame(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], &mut two);
        assert_eq!(two, [0.1, 0.2]);
    }

    #[test]
    fn render_reports_underrun_when_queue_runs_dry() {
        let q = queue_with(2, &[0.1, 0.2, 0.3, 0.4]);
        let mut r = Renderer::new(q, 2, 48_000, 64, None);
        let out = r.render(5);
        assert_eq!(
            out,
            Rendered {
                frames: 2,
                underrun_frames: 3
            }
        );
        assert_eq!(&r.scratch[..4], &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn render_spans_multiple_refills() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let q = queue_with(1, &samples);
        let mut r = Renderer::new(q, 1, 48_000, 3, None);
        let out = r.render(10);
        assert_eq!(out.frames, 10);
        assert_eq!(&r.scratch[..10], samples.as_slice());
    }

    #[test]
    fn render_upmixes_mono_to_stereo() {
        let q = queue_with(1, &[0.5, -0.5]);
        let mut r = Renderer::new(q, 2, 48_000, 16, None);
        assert_eq!(r.render(2).frames, 2);
        assert_eq!(&r.scratch[..4], &[0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn render_applies_selected_preset() {
        let samples: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
        let control = Arc::new(EqControl::default());

        let mut bypass = Renderer::new(queue_with(1, &samples), 1, 48_000, 512, Some(control.clone()));
        bypass.render(256);
        assert_eq!(&bypass.scratch[..256], samples.as_slice());

        control.select(2).unwrap();
        let mut boosted = Renderer::new(queue_with(1, &samples), 1, 48_000, 512, Some(control));
        boosted.render(256);
        assert_ne!(&boosted.scratch[..256], samples.as_slice());
        assert_eq!(boosted.eq.as_ref().and_then(|(_, eq)| eq.applied()), Some(2));
    }
}
