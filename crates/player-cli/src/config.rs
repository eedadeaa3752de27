//! Optional TOML config file for `eqplay`.
//!
//! ```toml
//! device = "USB DAC"
//! preset = "Rock"
//!
//! [playback]
//! chunk_frames = 2048
//! buffer_seconds = 3.0
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use eq_player::{PlaybackConfig, PlayerConfig};
use serde::Deserialize;

use crate::cli::Args;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Output device substring.
    pub device: Option<String>,
    /// Default EQ preset, by index or name.
    pub preset: Option<PresetRef>,
    pub playback: Option<PlaybackSection>,
}

/// A preset given either as an index (`preset = 4`) or a name (`preset = "Rock"`).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PresetRef {
    Index(usize),
    Name(String),
}

impl PresetRef {
    /// Interpret a command-line value: digits are an index, anything else a name.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<usize>() {
            Ok(index) => PresetRef::Index(index),
            Err(_) => PresetRef::Name(raw.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PlaybackSection {
    pub chunk_frames: Option<usize>,
    pub refill_max_frames: Option<usize>,
    pub buffer_seconds: Option<f32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg =
            toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Settings after merging the config file with command-line flags.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub player: PlayerConfig,
    pub preset: Option<PresetRef>,
}

/// Merge `file` with `args`; flags win over file values, which win over defaults.
pub fn resolve(args: &Args, file: FileConfig, cli_preset: Option<&str>) -> Resolved {
    let defaults = PlaybackConfig::default();
    let section = file.playback.unwrap_or_default();
    let playback = PlaybackConfig {
        chunk_frames: args
            .chunk_frames
            .or(section.chunk_frames)
            .unwrap_or(defaults.chunk_frames),
        refill_max_frames: args
            .refill_max_frames
            .or(section.refill_max_frames)
            .unwrap_or(defaults.refill_max_frames),
        buffer_seconds: args
            .buffer_seconds
            .or(section.buffer_seconds)
            .unwrap_or(defaults.buffer_seconds),
    };

    let mut player = PlayerConfig::default().with_playback(playback);
    if let Some(device) = args.device.clone().or(file.device) {
        player = player.with_device(device);
    }

    Resolved {
        player,
        preset: cli_preset.map(PresetRef::parse).or(file.preset),
    }
}
