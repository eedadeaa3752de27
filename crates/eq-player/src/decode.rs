//! Streaming audio decode stage.
//!
//! Uses Symphonia to:
//! - probe the input container/codec
//! - decode packets into interleaved `f32` samples
//! - push samples into a bounded [`SharedAudio`] queue from a background thread

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::queue::{SharedAudio, calc_max_buffered_samples};

/// Stream properties captured while probing the source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    /// Source sample rate in Hz.
    pub sample_rate: u32,
    /// Source channel count.
    pub channels: u16,
    /// Duration in milliseconds when the container reports it.
    pub duration_ms: Option<u64>,
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Container/extension hint, uppercased (best-effort).
    pub container: Option<String>,
}

/// A running decoder thread and the queue it fills.
pub struct DecodedStream {
    /// Rate and channel layout of the samples in `queue`.
    pub spec: SignalSpec,
    /// Interleaved `f32` output; closed on EOF, error, or cancel.
    pub queue: Arc<SharedAudio>,
    /// Raised when decoding stopped because of an error rather than EOF.
    pub failed: Arc<AtomicBool>,
}

struct Opened {
    format: Box<dyn FormatReader>,
    track_id: u32,
    codec_params: CodecParameters,
    spec: SignalSpec,
}

fn open_format(source: Box<dyn MediaSource>, hint: &Hint) -> Result<Opened> {
    let mss = MediaSourceStream::new(source, Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("probe media format")?;

    let format = probed.format;
    let track = first_audio_track(format.tracks())
        .ok_or_else(|| anyhow!("No default audio track"))?;

    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?;
    let rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    Ok(Opened {
        format,
        track_id,
        codec_params,
        spec: SignalSpec::new(rate, channels),
    })
}

fn first_audio_track(tracks: &[Track]) -> Option<&Track> {
    tracks.iter().find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
}

/// Probe `source` without decoding audio.
///
/// Used when a player is constructed so that bad URLs and unsupported
/// formats fail up front.
pub fn probe(source: Box<dyn MediaSource>, hint: &Hint, container: Option<String>) -> Result<SourceInfo> {
    let opened = open_format(source, hint)?;
    Ok(source_info_from(&opened, container))
}

fn source_info_from(opened: &Opened, container: Option<String>) -> SourceInfo {
    let params = &opened.codec_params;
    SourceInfo {
        sample_rate: opened.spec.rate,
        channels: opened.spec.channels.count() as u16,
        duration_ms: duration_ms_from_codec_params(params),
        codec: codec_name_from_params(params),
        bit_depth: params
            .bits_per_sample
            .or(params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
        container: container.map(|c| c.to_ascii_uppercase()),
    }
}

/// Start a background decoder thread that streams interleaved `f32` from `source`.
///
/// The queue is sized for `buffer_seconds` of source audio and is closed on
/// EOF, on error, or as soon as the consumer closes it.
pub fn start_streaming_decode(
    source: Box<dyn MediaSource>,
    hint: &Hint,
    buffer_seconds: f32,
) -> Result<DecodedStream> {
    let opened = open_format(source, hint)?;
    let spec = opened.spec;
    let channels = spec.channels.count();

    let max_buffered_samples = calc_max_buffered_samples(spec.rate, channels, buffer_seconds);
    let queue = Arc::new(SharedAudio::new(channels, max_buffered_samples));
    let failed = Arc::new(AtomicBool::new(false));

    let queue_for_thread = queue.clone();
    let failed_for_thread = failed.clone();
    thread::Builder::new()
        .name("eq-player-decode".to_string())
        .spawn(move || {
            if let Err(e) = decode_format_loop(opened, &queue_for_thread) {
                tracing::error!("decoder thread error: {e:#}");
                failed_for_thread.store(true, Ordering::Relaxed);
            }
            queue_for_thread.close();
        })
        .context("spawn decoder thread")?;

    Ok(DecodedStream {
        spec,
        queue,
        failed,
    })
}

/// Decode packets of the selected track and push interleaved `f32` into `shared`.
fn decode_format_loop(opened: Opened, shared: &SharedAudio) -> Result<()> {
    let Opened {
        mut format,
        track_id,
        codec_params,
        ..
    } = opened;
    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(e).context("decode packet"),
        };

        let spec = *decoded.spec();
        check_channel_count(&spec, shared.channels())?;
        let frames = decoded.capacity();
        let needed = frames * spec.channels.count();
        if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<f32>::new(frames as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        if !shared.push_interleaved_blocking(buf.samples()) {
            tracing::debug!("decode queue closed by consumer");
            break;
        }
    }

    Ok(())
}

/// The output queue's interleaving is fixed when the stream opens; a packet
/// with a different layout can't be pushed into it.
fn check_channel_count(spec: &SignalSpec, expected: usize) -> Result<()> {
    let got = spec.channels.count();
    if got != expected {
        bail!("channel count changed mid-stream: {expected} -> {got}");
    }
    Ok(())
}

/// Best-effort duration in milliseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Best-effort codec label used for status payloads.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::queue::PopStrategy;
    use std::io::Write;
    use std::path::Path;
    use symphonia::core::codecs::*;

    /// Write a 16-bit PCM WAV of `frames` frames of a constant `value` per channel.
    pub(crate) fn write_test_wav(path: &Path, rate: u32, channels: u16, frames: u32, value: i16) {
        let block_align = channels as u32 * 2;
        let data_len = frames * block_align;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * block_align).to_le_bytes());
        bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for _ in 0..frames * channels as u32 {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    fn wav_hint() -> Hint {
        let mut hint = Hint::new();
        hint.with_extension("wav");
        hint
    }

    #[test]
    fn duration_ms_from_codec_params_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_ms_from_codec_params(&params).is_none());
    }

    #[test]
    fn channel_count_change_is_an_error() {
        use symphonia::core::audio::Channels;
        let stereo = SignalSpec::new(44_100, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mono = SignalSpec::new(44_100, Channels::FRONT_LEFT);
        assert!(check_channel_count(&stereo, 2).is_ok());
        let err = check_channel_count(&mono, 2).unwrap_err();
        assert!(err.to_string().contains("2 -> 1"));
    }

    #[test]
    fn duration_ms_from_codec_params_computes() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        assert_eq!(duration_ms_from_codec_params(&params), Some(2000));
    }

    #[test]
    fn codec_name_from_params_maps_known_codecs() {
        let mut params = CodecParameters::new();
        params.codec = CODEC_TYPE_FLAC;
        assert_eq!(codec_name_from_params(&params), Some("FLAC".to_string()));
        params.codec = CODEC_TYPE_PCM_S16LE;
        assert_eq!(codec_name_from_params(&params), Some("PCM_S16".to_string()));
        params.codec = CODEC_TYPE_NULL;
        assert!(codec_name_from_params(&params).is_none());
    }

    #[test]
    fn probe_reads_wav_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 22_050, 2, 11_025, 1000);

        let file = std::fs::File::open(&path).unwrap();
        let info = probe(Box::new(file), &wav_hint(), Some("wav".to_string())).unwrap();
        assert_eq!(info.sample_rate, 22_050);
        assert_eq!(info.channels, 2);
        assert_eq!(info.duration_ms, Some(500));
        assert_eq!(info.codec.as_deref(), Some("PCM_S16"));
        assert_eq!(info.bit_depth, Some(16));
        assert_eq!(info.container.as_deref(), Some("WAV"));
    }

    #[test]
    fn probe_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        let file = std::fs::File::open(&path).unwrap();
        assert!(probe(Box::new(file), &wav_hint(), None).is_err());
    }

    #[test]
    fn streaming_decode_delivers_every_frame_then_closes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 8_000, 1, 4_000, i16::MAX / 2);

        let file = std::fs::File::open(&path).unwrap();
        let stream = start_streaming_decode(Box::new(file), &wav_hint(), 0.1).unwrap();
        assert_eq!(stream.spec.rate, 8_000);
        assert_eq!(stream.queue.channels(), 1);

        let mut total = 0usize;
        while let Some(chunk) = stream.queue.pop(PopStrategy::BlockingUpTo { max_frames: 512 }) {
            assert!(chunk.iter().all(|s| (s - 0.5).abs() < 1e-3));
            total += chunk.len();
        }
        assert_eq!(total, 4_000);
        assert!(!stream.failed.load(Ordering::Relaxed));
    }

    #[test]
    fn closing_the_queue_stops_the_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_test_wav(&path, 8_000, 2, 80_000, 0);

        let file = std::fs::File::open(&path).unwrap();
        let stream = start_streaming_decode(Box::new(file), &wav_hint(), 0.05).unwrap();
        assert!(stream.queue.pop(PopStrategy::BlockingExact { frames: 16 }).is_some());
        stream.queue.close();
        while stream.queue.pop(PopStrategy::BlockingUpTo { max_frames: 4096 }).is_some() {}
        assert!(stream.queue.is_done());
    }
}
