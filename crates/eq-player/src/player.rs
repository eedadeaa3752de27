//! Public player types.
//!
//! [`SimplePlayer`] plays one media URL with play/pause/stop. [`EqPlayer`] adds
//! a graphic equalizer with a fixed preset catalogue. Both probe the media when
//! constructed and drive playback through a background worker, so every call
//! here returns once the worker has applied it.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use player_types::{EqPresetInfo, PlaybackState, PlayerStatus};

use crate::config::PlayerConfig;
use crate::decode::{self, SourceInfo};
use crate::eq::{EqControl, presets};
use crate::source::MediaLocation;
use crate::status::{self, PlayerStatusState, SharedStatus};
use crate::transport::TransportCommand;
use crate::worker::{PlayerContext, WorkerHandle, spawn_worker};

/// Transport surface shared by both players.
pub trait Player {
    /// Start from the beginning (when idle or ended) or resume (when paused).
    fn play(&self) -> Result<()>;

    /// Pause a playing session; no-op in any other state.
    fn pause(&self) -> Result<()>;

    /// End the session; the next `play` starts from the beginning.
    fn stop(&self) -> Result<()>;

    fn state(&self) -> PlaybackState;

    fn status(&self) -> PlayerStatus;

    /// `true` in every state except [`PlaybackState::Playing`].
    fn is_stopped(&self) -> bool {
        self.state().is_stopped()
    }
}

struct PlayerCore {
    info: SourceInfo,
    status: SharedStatus,
    worker: WorkerHandle,
}

impl PlayerCore {
    fn open(url: &str, config: PlayerConfig, eq: Option<Arc<EqControl>>) -> Result<Self> {
        let location = MediaLocation::parse(url)?;
        let source = location
            .open(&config.http, None)
            .with_context(|| format!("open {location}"))?;
        let info = decode::probe(source, &location.probe_hint(), location.extension_hint())
            .with_context(|| format!("probe {location}"))?;
        tracing::info!(
            media = %location,
            rate_hz = info.sample_rate,
            channels = info.channels,
            codec = info.codec.as_deref().unwrap_or("?"),
            duration_ms = ?info.duration_ms,
            "media opened"
        );

        let status = PlayerStatusState::shared(location.display_name(), info.clone(), eq.clone());
        let worker = spawn_worker(PlayerContext {
            location,
            config,
            status: status.clone(),
            eq,
        })?;
        Ok(Self {
            info,
            status,
            worker,
        })
    }

    fn state(&self) -> PlaybackState {
        status::lock(&self.status).state
    }

    fn status(&self) -> PlayerStatus {
        status::lock(&self.status).snapshot()
    }
}

/// A player for one media URL.
pub struct SimplePlayer {
    core: PlayerCore,
}

impl SimplePlayer {
    /// Open `url` (`file://`, `http(s)://`, or a plain path) with default settings.
    pub fn open(url: &str) -> Result<Self> {
        Self::open_with(url, PlayerConfig::default())
    }

    pub fn open_with(url: &str, config: PlayerConfig) -> Result<Self> {
        Ok(Self {
            core: PlayerCore::open(url, config, None)?,
        })
    }

    /// Stream properties found when the media was opened.
    pub fn source_info(&self) -> &SourceInfo {
        &self.core.info
    }
}

impl Player for SimplePlayer {
    fn play(&self) -> Result<()> {
        self.core.worker.send(TransportCommand::Play)
    }

    fn pause(&self) -> Result<()> {
        self.core.worker.send(TransportCommand::Pause)
    }

    fn stop(&self) -> Result<()> {
        self.core.worker.send(TransportCommand::Stop)
    }

    fn state(&self) -> PlaybackState {
        self.core.state()
    }

    fn status(&self) -> PlayerStatus {
        self.core.status()
    }
}

/// A player with a ten-band graphic equalizer.
///
/// Preset changes apply on the next output callback, whatever the transport
/// state; a selection made before `play` is used from the first sample.
pub struct EqPlayer {
    core: PlayerCore,
    eq: Arc<EqControl>,
    presets: Vec<EqPresetInfo>,
}

impl EqPlayer {
    pub fn open(url: &str) -> Result<Self> {
        Self::open_with(url, PlayerConfig::default())
    }

    pub fn open_with(url: &str, config: PlayerConfig) -> Result<Self> {
        let eq = Arc::new(EqControl::default());
        Ok(Self {
            core: PlayerCore::open(url, config, Some(eq.clone()))?,
            eq,
            presets: presets::preset_infos(),
        })
    }

    pub fn source_info(&self) -> &SourceInfo {
        &self.core.info
    }

    /// The preset catalogue, in index order.
    pub fn presets(&self) -> &[EqPresetInfo] {
        &self.presets
    }

    /// Index of the selected preset; `0` (`Disabled`) until changed.
    pub fn selected_preset(&self) -> usize {
        self.eq.selected()
    }

    /// Select a preset by index. Out-of-range indices are rejected and the
    /// current selection is kept.
    pub fn select_eq_preset(&self, index: usize) -> Result<()> {
        self.eq.select(index)
    }

    /// Select a preset by name, ignoring case, spaces, and punctuation.
    pub fn select_eq_preset_by_name(&self, name: &str) -> Result<()> {
        let index =
            presets::find_by_name(name).ok_or_else(|| anyhow!("Unknown EQ preset: {name}"))?;
        self.eq.select(index)
    }
}

impl Player for EqPlayer {
    fn play(&self) -> Result<()> {
        self.core.worker.send(TransportCommand::Play)
    }

    fn pause(&self) -> Result<()> {
        self.core.worker.send(TransportCommand::Pause)
    }

    fn stop(&self) -> Result<()> {
        self.core.worker.send(TransportCommand::Stop)
    }

    fn state(&self) -> PlaybackState {
        self.core.state()
    }

    fn status(&self) -> PlayerStatus {
        self.core.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::write_test_wav;

    fn wav(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 22_050, 2, 2_205, 1000);
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn new_player_is_idle_and_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let player = SimplePlayer::open(&wav(&dir)).unwrap();
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(player.is_stopped());
        assert_eq!(player.source_info().sample_rate, 22_050);
        assert_eq!(player.source_info().channels, 2);

        let status = player.status();
        assert_eq!(status.now_playing.as_deref(), Some("tone.wav"));
        assert_eq!(status.duration_ms, Some(100));
        assert_eq!(status.source_container.as_deref(), Some("WAV"));
        assert!(status.eq_preset.is_none());
        assert!(status.elapsed_ms.is_none());
    }

    #[test]
    fn open_accepts_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = wav(&dir);
        let player = SimplePlayer::open(&format!("file://{path}")).unwrap();
        assert_eq!(player.source_info().channels, 2);
    }

    #[test]
    fn open_rejects_missing_and_undecodable_media() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        assert!(SimplePlayer::open(&missing.to_string_lossy()).is_err());

        let junk = dir.path().join("junk.mp3");
        std::fs::write(&junk, b"definitely not audio").unwrap();
        assert!(EqPlayer::open(&junk.to_string_lossy()).is_err());

        assert!(SimplePlayer::open("ftp://example.com/a.mp3").is_err());
    }

    #[test]
    fn pause_and_stop_are_noops_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let player = SimplePlayer::open(&wav(&dir)).unwrap();
        player.pause().unwrap();
        assert_eq!(player.state(), PlaybackState::Idle);
        player.stop().unwrap();
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(player.status().end_reason.is_none());
    }

    #[test]
    fn eq_player_lists_presets_and_defaults_to_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let player = EqPlayer::open(&wav(&dir)).unwrap();
        assert_eq!(player.presets().len(), presets::PRESETS.len());
        assert_eq!(player.presets()[0].name, "Disabled");
        assert_eq!(player.selected_preset(), 0);
        assert!(player.is_stopped());
    }

    #[test]
    fn eq_preset_can_be_selected_before_play() {
        let dir = tempfile::tempdir().unwrap();
        let player = EqPlayer::open(&wav(&dir)).unwrap();

        player.select_eq_preset(4).unwrap();
        assert_eq!(player.selected_preset(), 4);
        assert_eq!(player.status().eq_preset.map(|p| p.name), Some("Classical".to_string()));

        assert!(player.select_eq_preset(player.presets().len()).is_err());
        assert_eq!(player.selected_preset(), 4);

        player.select_eq_preset_by_name("vocal booster").unwrap();
        assert_eq!(player.selected_preset(), 22);
        assert!(player.select_eq_preset_by_name("karaoke").is_err());
        assert_eq!(player.selected_preset(), 22);
    }

    #[test]
    fn play_on_missing_device_fails_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlayerConfig::default().with_device("no-such-device-zzz");
        let player = EqPlayer::open_with(&wav(&dir), config).unwrap();

        assert!(player.play().is_err());
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(player.is_stopped());
        assert!(player.status().end_reason.is_none());

        player.pause().unwrap();
        player.select_eq_preset(3).unwrap();
        assert_eq!(player.selected_preset(), 3);
        assert_eq!(player.state(), PlaybackState::Idle);

        assert!(player.play().is_err());
        assert_eq!(player.state(), PlaybackState::Idle);
        drop(player);
    }
}
