//! Graphic equalizer stage.
//!
//! A cascade of peaking biquads (one per band, per output channel) run inside
//! the output callback. Selection is shared through [`EqControl`], an atomic
//! index the callback polls, so changing presets never blocks the audio thread.

pub mod presets;

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};

use presets::{BAND_COUNT, BAND_FREQUENCIES_HZ, BAND_Q, PRESETS};

/// Biquad coefficients normalized by `a0`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// RBJ audio-EQ-cookbook peaking filter.
    ///
    /// Bands at or above ~0.45 × sample rate cannot be realised and collapse to identity.
    fn peaking(sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> Self {
        if gain_db == 0.0 || sample_rate <= 0.0 || frequency >= sample_rate * 0.45 {
            return Self::IDENTITY;
        }
        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }
}

/// Transposed direct form II history for one band of one channel.
#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, x: f64, c: &BiquadCoeffs) -> f64 {
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }
}

/// Shared, lock-free preset selection.
///
/// Held behind an `Arc` by the player and by every output callback it starts.
#[derive(Debug)]
pub struct EqControl {
    selected: AtomicUsize,
}

impl Default for EqControl {
    fn default() -> Self {
        Self::new(presets::DISABLED)
    }
}

impl EqControl {
    pub fn new(initial: usize) -> Self {
        Self {
            selected: AtomicUsize::new(initial.min(PRESETS.len() - 1)),
        }
    }

    /// Currently selected preset index.
    pub fn selected(&self) -> usize {
        self.selected.load(Ordering::Acquire)
    }

    /// Select a preset; the next output callback picks it up.
    pub fn select(&self, index: usize) -> Result<()> {
        if index >= PRESETS.len() {
            bail!(
                "EQ preset index {index} out of range (0..{})",
                PRESETS.len()
            );
        }
        let previous = self.selected.swap(index, Ordering::AcqRel);
        if previous != index {
            tracing::info!(preset = PRESETS[index].name, index, "eq preset selected");
        }
        Ok(())
    }
}

/// Per-stream equalizer state, owned by one output callback.
pub struct Equalizer {
    sample_rate: f64,
    channels: usize,
    applied: Option<usize>,
    active: bool,
    preamp: f64,
    coeffs: [BiquadCoeffs; BAND_COUNT],
    states: Vec<[BiquadState; BAND_COUNT]>,
}

impl Equalizer {
    /// Build an equalizer for an interleaved stream; no preset is applied until
    /// the first [`Self::sync`].
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            channels: channels.max(1),
            applied: None,
            active: false,
            preamp: 1.0,
            coeffs: [BiquadCoeffs::IDENTITY; BAND_COUNT],
            states: vec![[BiquadState::default(); BAND_COUNT]; channels.max(1)],
        }
    }

    /// Pick up a new selection from `control`, recomputing coefficients on change.
    ///
    /// Filter history is cleared when the preset changes. Allocation-free.
    pub fn sync(&mut self, control: &EqControl) {
        let wanted = control.selected();
        if self.applied == Some(wanted) {
            return;
        }
        self.apply_preset(wanted);
    }

    fn apply_preset(&mut self, index: usize) {
        let Some(preset) = PRESETS.get(index) else {
            return;
        };
        self.applied = Some(index);
        for st in self.states.iter_mut() {
            *st = [BiquadState::default(); BAND_COUNT];
        }

        match preset.gains_db {
            None => {
                self.active = false;
                self.preamp = 1.0;
                self.coeffs = [BiquadCoeffs::IDENTITY; BAND_COUNT];
            }
            Some(gains) => {
                self.active = true;
                self.preamp = 10.0_f64.powf(preset.preamp_db() as f64 / 20.0);
                for (band, coeffs) in self.coeffs.iter_mut().enumerate() {
                    *coeffs = BiquadCoeffs::peaking(
                        self.sample_rate,
                        BAND_FREQUENCIES_HZ[band],
                        gains[band] as f64,
                        BAND_Q,
                    );
                }
            }
        }
    }

    /// Index of the preset currently baked into the coefficients.
    pub fn applied(&self) -> Option<usize> {
        self.applied
    }

    /// Filter interleaved samples in place. A bypass preset leaves them untouched.
    pub fn process_interleaved(&mut self, samples: &mut [f32]) {
        if !self.active {
            return;
        }
        for frame in samples.chunks_mut(self.channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let state = &mut self.states[ch];
                let mut x = *sample as f64 * self.preamp;
                for (band, coeffs) in self.coeffs.iter().enumerate() {
                    x = state[band].process(x, coeffs);
                }
                *sample = x as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 48_000;

    fn sine(freq: f64, frames: usize, channels: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * channels);
        for n in 0..frames {
            let v = (2.0 * PI * freq * n as f64 / RATE as f64).sin() as f32 * 0.25;
            out.extend(std::iter::repeat_n(v, channels));
        }
        out
    }

    /// RMS of the second half, after the filters have settled.
    fn settled_rms(samples: &[f32]) -> f64 {
        let tail = &samples[samples.len() / 2..];
        (tail.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / tail.len() as f64).sqrt()
    }

    fn gain_db_at(preset: usize, freq: f64) -> f64 {
        let control = EqControl::new(preset);
        let mut eq = Equalizer::new(RATE, 1);
        eq.sync(&control);
        let input = sine(freq, RATE as usize, 1);
        let mut output = input.clone();
        eq.process_interleaved(&mut output);
        20.0 * (settled_rms(&output) / settled_rms(&input)).log10()
    }

    #[test]
    fn disabled_preset_is_bit_exact_passthrough() {
        let control = EqControl::default();
        let mut eq = Equalizer::new(RATE, 2);
        eq.sync(&control);
        let input = sine(440.0, 1024, 2);
        let mut output = input.clone();
        eq.process_interleaved(&mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn flat_preset_has_unity_response() {
        let flat = presets::find_by_name("flat").unwrap();
        assert!(gain_db_at(flat, 1_000.0).abs() < 0.01);
        assert!(gain_db_at(flat, 60.0).abs() < 0.01);
    }

    #[test]
    fn bass_booster_lifts_lows_relative_to_highs() {
        let boost = presets::find_by_name("bass booster").unwrap();
        let low = gain_db_at(boost, 40.0);
        let high = gain_db_at(boost, 6_000.0);
        assert!(low - high > 4.0, "low {low:.2} dB, high {high:.2} dB");
    }

    #[test]
    fn treble_reducer_cuts_highs() {
        let cut = presets::find_by_name("treble reducer").unwrap();
        assert!(gain_db_at(cut, 12_000.0) < -3.0);
        assert!(gain_db_at(cut, 100.0).abs() < 1.0);
    }

    #[test]
    fn preamp_headroom_shows_where_bands_are_flat() {
        let boost = presets::find_by_name("bass booster").unwrap();
        let at_6k = gain_db_at(boost, 6_000.0);
        assert!((at_6k + 5.5).abs() < 0.3, "gain at 6 kHz {at_6k:.2} dB");
    }

    #[test]
    fn select_rejects_out_of_range_and_keeps_previous() {
        let control = EqControl::new(3);
        assert!(control.select(PRESETS.len()).is_err());
        assert_eq!(control.selected(), 3);
        control.select(5).unwrap();
        assert_eq!(control.selected(), 5);
    }

    #[test]
    fn sync_follows_control_changes() {
        let control = EqControl::default();
        let mut eq = Equalizer::new(RATE, 2);
        assert_eq!(eq.applied(), None);
        eq.sync(&control);
        assert_eq!(eq.applied(), Some(presets::DISABLED));
        control.select(7).unwrap();
        eq.sync(&control);
        assert_eq!(eq.applied(), Some(7));
    }

    #[test]
    fn bands_above_nyquist_collapse_to_identity() {
        let c = BiquadCoeffs::peaking(22_050.0, 16_000.0, 6.0, BAND_Q);
        assert_eq!(c, BiquadCoeffs::IDENTITY);
    }

    #[test]
    fn channels_are_filtered_independently() {
        let rock = presets::find_by_name("rock").unwrap();
        let control = EqControl::new(rock);
        let mut eq = Equalizer::new(RATE, 2);
        eq.sync(&control);
        let mut samples: Vec<f32> = (0..2048)
            .flat_map(|n| [(n as f32 * 0.01).sin() * 0.3, 0.0])
            .collect();
        eq.process_interleaved(&mut samples);
        assert!(samples.iter().skip(1).step_by(2).all(|s| *s == 0.0));
        assert!(samples.iter().step_by(2).any(|s| *s != 0.0));
    }
}
