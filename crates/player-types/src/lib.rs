use serde::{Deserialize, Serialize};

/// Transport state of a player.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Opened but nothing rendered yet, or explicitly stopped.
    #[default]
    Idle,
    /// Output stream running and draining audio.
    Playing,
    /// Output stream alive but emitting silence; position is retained.
    Paused,
    /// The source reached end-of-stream or failed mid-playback.
    Ended,
}

impl PlaybackState {
    /// `true` unless audio is actively being rendered.
    pub fn is_stopped(self) -> bool {
        self != PlaybackState::Playing
    }
}

/// Reason why a playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream/file.
    Eof,
    /// Decoder, transport, or output error interrupted playback.
    Error,
    /// Playback was explicitly stopped by a command.
    Stopped,
}

/// Read-only view of one entry in the equalizer preset catalogue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EqPresetInfo {
    /// Position in the catalogue; this is the value accepted by preset selection.
    pub index: usize,
    /// Display name, e.g. `Bass Booster`.
    pub name: String,
}

/// Point-in-time player status.
///
/// Track-specific fields are `None` while no session is running.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Transport state.
    pub state: PlaybackState,
    /// Label of the opened media (file name or URL).
    pub now_playing: Option<String>,
    /// Elapsed playback time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Total media duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Source codec (for example `FLAC`, `MP3`).
    pub source_codec: Option<String>,
    /// Source bit depth, if known.
    pub source_bit_depth: Option<u16>,
    /// Container hint from the media location (for example `FLAC`, `MP3`).
    pub source_container: Option<String>,
    /// Source sample rate (Hz).
    pub source_rate_hz: Option<u32>,
    /// Output stream sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Source channel count.
    pub channels: Option<u16>,
    /// Whether the session is resampled to the device rate.
    pub resampling: Option<bool>,
    /// Output sample format selected for the device stream.
    pub output_sample_format: Option<String>,
    /// Active output device name, if known.
    pub device: Option<String>,
    /// Count of frames emitted as silence because the queue ran dry.
    pub underrun_frames: Option<u64>,
    /// Count of underrun incidents.
    pub underrun_events: Option<u64>,
    /// Selected equalizer preset, for players that carry an equalizer.
    pub eq_preset: Option<EqPresetInfo>,
    /// How the most recent session ended.
    pub end_reason: Option<PlaybackEndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_playing_is_not_stopped() {
        assert!(PlaybackState::Idle.is_stopped());
        assert!(PlaybackState::Paused.is_stopped());
        assert!(PlaybackState::Ended.is_stopped());
        assert!(!PlaybackState::Playing.is_stopped());
    }

    #[test]
    fn status_serializes_snake_case_enums() {
        let status = PlayerStatus {
            state: PlaybackState::Paused,
            end_reason: Some(PlaybackEndReason::Eof),
            eq_preset: Some(EqPresetInfo {
                index: 2,
                name: "Bass Booster".to_string(),
            }),
            ..PlayerStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "paused");
        assert_eq!(json["end_reason"], "eof");
        assert_eq!(json["eq_preset"]["name"], "Bass Booster");
    }
}
