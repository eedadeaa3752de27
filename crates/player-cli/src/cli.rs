use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "eqplay", version, about = "Play a media URL with graphic EQ presets")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// TOML config file (`device`, `preset`, `[playback]`); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long)]
    pub chunk_frames: Option<usize>,

    /// Playback callback refill cap (frames)
    #[arg(long)]
    pub refill_max_frames: Option<usize>,

    /// Queue buffer target in seconds (per stage)
    #[arg(long)]
    pub buffer_seconds: Option<f32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the EQ preset catalogue
    Presets {
        /// Emit JSON instead of `index: name` lines
        #[arg(long)]
        json: bool,
    },

    /// Play a file path, file:// URL, or http(s):// URL
    Play {
        url: String,

        /// EQ preset to start with, by index or name
        #[arg(long)]
        preset: Option<String>,

        /// Play without the equalizer stage
        #[arg(long, conflicts_with = "preset")]
        no_eq: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_preset_and_overrides() {
        let args = Args::try_parse_from([
            "eqplay",
            "--device",
            "usb",
            "--buffer-seconds",
            "1.5",
            "play",
            "song.flac",
            "--preset",
            "rock",
        ])
        .unwrap();
        assert_eq!(args.device.as_deref(), Some("usb"));
        assert_eq!(args.buffer_seconds, Some(1.5));
        assert!(args.chunk_frames.is_none());
        match args.cmd {
            Some(Command::Play {
                url,
                preset,
                no_eq,
            }) => {
                assert_eq!(url, "song.flac");
                assert_eq!(preset.as_deref(), Some("rock"));
                assert!(!no_eq);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn preset_and_no_eq_conflict() {
        let res = Args::try_parse_from(["eqplay", "play", "a.mp3", "--preset", "1", "--no-eq"]);
        assert!(res.is_err());
    }

    #[test]
    fn list_devices_needs_no_subcommand() {
        let args = Args::try_parse_from(["eqplay", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.cmd.is_none());
    }
}
