use crate::http_stream::HttpRangeConfig;

/// Playback tuning parameters shared by decode/resample/playback stages.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackConfig {
    /// Decoder/resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration for queue sizing.
    pub buffer_seconds: f32,
}

impl Default for PlaybackConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
        }
    }
}

/// Everything a player needs beyond the media URL.
#[derive(Clone, Debug, Default)]
pub struct PlayerConfig {
    /// Stage buffering and chunk sizes.
    pub playback: PlaybackConfig,
    /// Output device substring; `None` picks the host default.
    pub device: Option<String>,
    /// Range-fetch settings for `http(s)://` sources.
    pub http: HttpRangeConfig,
}

impl PlayerConfig {
    /// Use the output device whose name contains `needle` (blank means default).
    pub fn with_device(mut self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        let trimmed = needle.trim();
        self.device = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Replace the stage tuning parameters.
    pub fn with_playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }
}
