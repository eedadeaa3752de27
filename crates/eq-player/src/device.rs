//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config close to the source rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Output device metadata for `--list-devices` and status reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    /// Supported sample-rate span; `None` when the device would not report one.
    pub rates: Option<(u32, u32)>,
}

/// Human-readable device name, falling back to a placeholder if the host fails.
pub fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "<unknown device>".to_string())
}

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| matches_device_name(&device_name(d), needle))
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Pick the best supported output config for the device.
///
/// With a `target_rate`, prefer the highest supported rate that is **<= target**;
/// if none are, choose the lowest rate above it. Without one, choose the highest
/// rate. Ties go to the better sample format (`f32` first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in device
        .supported_output_configs()
        .context("query supported output configs")?
    {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            below: target_rate.is_none_or(|t| rate <= t),
            rate,
            format_rank: sample_format_rank(range.sample_format()),
        };
        if best
            .as_ref()
            .is_none_or(|(current, _)| candidate.beats(current))
        {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Pick a stream buffer size, preferring larger values to reduce underruns.
///
/// Ranges are capped at 16384 frames. `Unknown` returns `None` so CPAL uses the
/// device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(clamp_buffer_frames(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Enumerate output devices for the current host.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<DeviceInfo>> {
    let default_name = host.default_output_device().map(|d| device_name(&d));
    let devices = host.output_devices().context("No output devices")?;

    let mut out = Vec::new();
    for (index, d) in devices.enumerate() {
        let name = device_name(&d);
        let rates = supported_rate_span(&d);
        if rates.is_none() {
            tracing::debug!(device = %name, "device reported no usable sample rates");
        }
        out.push(DeviceInfo {
            index,
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            rates,
        });
    }
    Ok(out)
}

fn supported_rate_span(device: &cpal::Device) -> Option<(u32, u32)> {
    let span = device.supported_output_configs().ok().and_then(|ranges| {
        ranges.fold(None, |acc: Option<(u32, u32)>, r| {
            let (lo, hi) = (r.min_sample_rate(), r.max_sample_rate());
            Some(acc.map_or((lo, hi), |(a, b)| (a.min(lo), b.max(hi))))
        })
    });
    span.filter(|(lo, hi)| *lo > 0 && hi >= lo).or_else(|| {
        device
            .default_output_config()
            .ok()
            .map(|c| (c.sample_rate(), c.sample_rate()))
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    below: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.below != other.below {
            self.below
        } else if self.rate != other.rate {
            // Below target: higher is closer. Above target: lower is closer.
            if self.below {
                self.rate > other.rate
            } else {
                self.rate < other.rate
            }
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(t) => t.clamp(min, max.max(min)),
        None => max,
    }
}

fn clamp_buffer_frames(min: u32, max: u32) -> u32 {
    const MAX_FRAMES: u32 = 16_384;
    if max <= MAX_FRAMES { max } else { min.max(MAX_FRAMES) }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(below: bool, rate: u32, format_rank: u8) -> Candidate {
        Candidate {
            below,
            rate,
            format_rank,
        }
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", " USB "));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn pick_rate_for_range_clamps_to_target() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(48_000)), 48_000);
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(pick_rate_for_range(44_100, 96_000, Some(192_000)), 96_000);
        assert_eq!(pick_rate_for_range(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn candidates_below_target_win() {
        assert!(cand(true, 44_100, 3).beats(&cand(false, 48_000, 0)));
        assert!(!cand(false, 48_000, 0).beats(&cand(true, 44_100, 3)));
    }

    #[test]
    fn candidates_prefer_closest_rate() {
        assert!(cand(true, 48_000, 2).beats(&cand(true, 44_100, 2)));
        assert!(cand(false, 88_200, 2).beats(&cand(false, 96_000, 2)));
    }

    #[test]
    fn candidates_break_ties_on_format() {
        assert!(cand(true, 48_000, 0).beats(&cand(true, 48_000, 2)));
        assert!(!cand(true, 48_000, 2).beats(&cand(true, 48_000, 2)));
    }

    #[test]
    fn buffer_frames_are_capped() {
        assert_eq!(clamp_buffer_frames(64, 4_096), 4_096);
        assert_eq!(clamp_buffer_frames(64, 1 << 20), 16_384);
        assert_eq!(clamp_buffer_frames(32_768, 1 << 20), 32_768);
    }
}
