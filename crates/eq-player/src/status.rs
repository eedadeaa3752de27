use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use player_types::{EqPresetInfo, PlaybackEndReason, PlaybackState, PlayerStatus};

use crate::decode::SourceInfo;
use crate::eq::EqControl;
use crate::eq::presets::PRESETS;

/// Shared status store updated by the worker and the running session.
///
/// Track fields come from the probe done at construction and survive across
/// sessions; session fields are cleared whenever a session ends.
#[derive(Debug, Default)]
pub struct PlayerStatusState {
    /// Transport state as last committed by the worker.
    pub state: PlaybackState,
    /// Label of the opened media.
    pub now_playing: Option<String>,
    /// Probed stream properties of the opened media.
    pub source: Option<SourceInfo>,
    /// Selected output device name.
    pub device: Option<String>,
    /// Effective output sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Output sample format used by the device stream.
    pub output_sample_format: Option<String>,
    /// Whether resampling is active for the running session.
    pub resampling: Option<bool>,
    /// Counter updated by the output callback for elapsed progress.
    pub played_frames: Option<Arc<AtomicU64>>,
    /// Total frames emitted as silence due to underruns.
    pub underrun_frames: Option<Arc<AtomicU64>>,
    /// Number of underrun incidents observed by the callback.
    pub underrun_events: Option<Arc<AtomicU64>>,
    /// Equalizer selection, for players that carry one.
    pub eq: Option<Arc<EqControl>>,
    /// Terminal reason of the most recent session.
    pub end_reason: Option<PlaybackEndReason>,
}

/// Status store shared between a player, its worker, and its sessions.
pub type SharedStatus = Arc<Mutex<PlayerStatusState>>;

impl PlayerStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared(now_playing: String, source: SourceInfo, eq: Option<Arc<EqControl>>) -> SharedStatus {
        Arc::new(Mutex::new(Self {
            now_playing: Some(now_playing),
            source: Some(source),
            eq,
            ..Self::default()
        }))
    }

    /// Build a point-in-time snapshot.
    pub fn snapshot(&self) -> PlayerStatus {
        let elapsed_ms = match (self.played_frames.as_ref(), self.sample_rate) {
            (Some(frames), Some(sr)) if sr > 0 => {
                Some(frames.load(Ordering::Relaxed).saturating_mul(1000) / sr as u64)
            }
            _ => None,
        };
        let source = self.source.as_ref();
        PlayerStatus {
            state: self.state,
            now_playing: self.now_playing.clone(),
            elapsed_ms,
            duration_ms: source.and_then(|s| s.duration_ms),
            source_codec: source.and_then(|s| s.codec.clone()),
            source_bit_depth: source.and_then(|s| s.bit_depth),
            source_container: source.and_then(|s| s.container.clone()),
            source_rate_hz: source.map(|s| s.sample_rate),
            sample_rate: self.sample_rate,
            channels: source.map(|s| s.channels),
            resampling: self.resampling,
            output_sample_format: self.output_sample_format.clone(),
            device: self.device.clone(),
            underrun_frames: self
                .underrun_frames
                .as_ref()
                .map(|v| v.load(Ordering::Relaxed)),
            underrun_events: self
                .underrun_events
                .as_ref()
                .map(|v| v.load(Ordering::Relaxed)),
            eq_preset: self.eq.as_ref().and_then(|eq| {
                let index = eq.selected();
                PRESETS.get(index).map(|p| EqPresetInfo {
                    index,
                    name: p.name.to_string(),
                })
            }),
            end_reason: self.end_reason,
        }
    }

    /// Clear session-specific fields when playback ends.
    pub fn clear_session(&mut self) {
        self.device = None;
        self.sample_rate = None;
        self.output_sample_format = None;
        self.resampling = None;
        self.played_frames = None;
        self.underrun_frames = None;
        self.underrun_events = None;
    }
}

/// Lock the status store, recovering from poisoning.
pub(crate) fn lock(status: &SharedStatus) -> MutexGuard<'_, PlayerStatusState> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}
