//! eqplay: play a media URL through the `eq-player` engine.
//!
//! Decoding runs on a background thread (Symphonia), resampling to the device
//! rate on another (Rubato) when needed, and the CPAL callback applies the
//! selected EQ preset before writing to the device.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use player_cli::cli::{Args, Command};
use player_cli::config::{self, FileConfig};
use player_cli::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,eq_player=info")),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    match &args.cmd {
        Some(Command::Presets { json }) => runtime::print_presets(*json),
        Some(Command::Play { url, preset, no_eq }) => {
            let resolved = config::resolve(&args, file, preset.as_deref());
            runtime::run_play(url, resolved, *no_eq)
        }
        None => {
            Args::command().print_help()?;
            Ok(())
        }
    }
}
