//! Built-in graphic EQ presets.
//!
//! Ten bands at the classic octave centres. Gains are in dB; index `0` is the
//! bypass entry and is the default selection.

use player_types::EqPresetInfo;

/// Number of graphic bands in every preset.
pub const BAND_COUNT: usize = 10;

/// Centre frequencies (Hz) of the graphic bands.
pub const BAND_FREQUENCIES_HZ: [f64; BAND_COUNT] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1_000.0, 2_000.0, 4_000.0, 8_000.0, 16_000.0,
];

/// Bandwidth of every band: one octave.
pub const BAND_Q: f64 = std::f64::consts::SQRT_2;

/// One entry of the catalogue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EqPreset {
    pub name: &'static str,
    /// Per-band gains in dB; `None` bypasses the equalizer.
    pub gains_db: Option<[f32; BAND_COUNT]>,
}

impl EqPreset {
    const fn bypass(name: &'static str) -> Self {
        Self {
            name,
            gains_db: None,
        }
    }

    const fn bands(name: &'static str, gains_db: [f32; BAND_COUNT]) -> Self {
        Self {
            name,
            gains_db: Some(gains_db),
        }
    }

    /// Headroom (dB, ≤ 0) applied ahead of the filters so boosts do not clip.
    pub fn preamp_db(&self) -> f32 {
        let max_boost = self
            .gains_db
            .map(|g| g.iter().copied().fold(0.0f32, f32::max))
            .unwrap_or(0.0);
        -max_boost
    }
}

/// Index of the bypass preset.
pub const DISABLED: usize = 0;

pub static PRESETS: [EqPreset; 23] = [
    EqPreset::bypass("Disabled"),
    EqPreset::bands("Acoustic", [5.0, 4.9, 3.95, 1.05, 2.15, 1.75, 3.5, 4.1, 3.55, 2.15]),
    EqPreset::bands("Bass Booster", [5.5, 4.25, 3.5, 2.5, 1.25, 0.0, 0.0, 0.0, 0.0, 0.0]),
    EqPreset::bands("Bass Reducer", [-5.5, -4.25, -3.5, -2.5, -1.25, 0.0, 0.0, 0.0, 0.0, 0.0]),
    EqPreset::bands("Classical", [4.75, 3.75, 3.0, 2.5, -1.5, -1.5, 0.0, 2.25, 3.25, 3.75]),
    EqPreset::bands("Dance", [3.57, 6.55, 4.99, 0.0, 1.92, 3.65, 5.15, 4.54, 3.59, 0.0]),
    EqPreset::bands("Deep", [4.95, 3.55, 1.75, 1.0, 2.85, 2.5, 1.45, -2.15, -3.55, -4.6]),
    EqPreset::bands("Electronic", [4.25, 3.8, 1.2, 0.0, -2.15, 2.25, 0.85, 1.25, 3.95, 4.8]),
    EqPreset::bands("Flat", [0.0; BAND_COUNT]),
    EqPreset::bands("Hip-Hop", [5.0, 4.25, 1.5, 3.0, -1.0, -1.0, 1.5, -0.5, 2.0, 3.0]),
    EqPreset::bands("Jazz", [4.0, 3.0, 1.5, 2.25, -1.5, -1.5, 0.0, 1.5, 3.0, 3.75]),
    EqPreset::bands("Latin", [4.5, 3.0, 0.0, 0.0, -1.5, -1.5, -1.5, 0.0, 3.0, 4.5]),
    EqPreset::bands("Loudness", [6.0, 4.0, 0.0, 0.0, -2.0, 0.0, -1.0, -5.0, 5.0, 1.0]),
    EqPreset::bands("Lounge", [-3.0, -1.5, -0.5, 1.5, 4.0, 2.5, 0.0, -1.5, 2.0, 1.0]),
    EqPreset::bands("Piano", [3.0, 2.0, 0.0, 2.5, 3.0, 1.5, 3.5, 4.5, 3.0, 3.5]),
    EqPreset::bands("Pop", [-1.5, -1.0, 0.0, 2.0, 4.0, 4.0, 2.0, 0.0, -1.0, -1.5]),
    EqPreset::bands("R&B", [2.62, 6.92, 5.65, 1.33, -2.19, -1.5, 2.32, 2.65, 3.0, 3.75]),
    EqPreset::bands("Rock", [5.0, 4.0, 3.0, 1.5, -0.5, -1.0, 0.5, 2.5, 3.5, 4.5]),
    EqPreset::bands("Small Speakers", [5.5, 4.25, 3.5, 2.5, 1.25, 0.0, -1.25, -2.5, -3.5, -4.25]),
    EqPreset::bands("Spoken Word", [-3.46, -0.47, 0.0, 0.69, 3.46, 4.61, 4.84, 4.28, 2.54, 0.0]),
    EqPreset::bands("Treble Booster", [0.0, 0.0, 0.0, 0.0, 0.0, 1.25, 2.5, 3.5, 4.25, 5.5]),
    EqPreset::bands("Treble Reducer", [0.0, 0.0, 0.0, 0.0, 0.0, -1.25, -2.5, -3.5, -4.25, -5.5]),
    EqPreset::bands("Vocal Booster", [-1.5, -3.0, -3.0, 1.5, 3.75, 3.75, 3.0, 1.5, 0.0, -1.5]),
];

/// Read-only catalogue view handed out by players.
pub fn preset_infos() -> Vec<EqPresetInfo> {
    PRESETS
        .iter()
        .enumerate()
        .map(|(index, p)| EqPresetInfo {
            index,
            name: p.name.to_string(),
        })
        .collect()
}

/// Case-insensitive lookup by name; spaces, dashes, and `&` are ignored.
pub fn find_by_name(name: &str) -> Option<usize> {
    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    PRESETS.iter().position(|p| normalize(p.name) == wanted)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
