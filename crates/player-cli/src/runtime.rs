//! `eqplay` runtime helpers.
//!
//! Device and preset listing, plus the interactive play loop.

use std::io::BufRead;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, select};
use eq_player::eq::presets;
use eq_player::{EqPlayer, PlaybackState, Player, SimplePlayer, device};

use crate::config::{PresetRef, Resolved};

const STATE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Print output devices to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for d in device::list_devices(&host)? {
        let rates = match d.rates {
            Some((lo, hi)) if lo == hi => format!("{lo} Hz"),
            Some((lo, hi)) => format!("{lo}-{hi} Hz"),
            None => "rates unknown".to_string(),
        };
        let default = if d.is_default { " (default)" } else { "" };
        println!("#{}: {}{default} [{rates}]", d.index, d.name);
    }
    Ok(())
}

/// Print the preset catalogue as `index: name` lines or JSON.
pub fn print_presets(json: bool) -> Result<()> {
    let infos = presets::preset_infos();
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        for p in infos {
            println!("{:>2}: {}", p.index, p.name);
        }
    }
    Ok(())
}

enum Loaded {
    Simple(SimplePlayer),
    Eq(EqPlayer),
}

impl Loaded {
    fn player(&self) -> &dyn Player {
        match self {
            Loaded::Simple(p) => p,
            Loaded::Eq(p) => p,
        }
    }

    fn eq(&self) -> Option<&EqPlayer> {
        match self {
            Loaded::Simple(_) => None,
            Loaded::Eq(p) => Some(p),
        }
    }
}

/// One line of interactive input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Play,
    Pause,
    Stop,
    Eq(PresetRef),
    Presets,
    Status,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        // A bare space toggles pause, like most players.
        return line.contains(' ').then_some(Input::Pause);
    }
    let (word, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((trimmed, ""));
    Some(match word.to_ascii_lowercase().as_str() {
        "p" | "play" => Input::Play,
        "space" | "pause" => Input::Pause,
        "s" | "stop" => Input::Stop,
        "eq" if !rest.is_empty() => Input::Eq(PresetRef::parse(rest)),
        "presets" => Input::Presets,
        "status" => Input::Status,
        "q" | "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(trimmed.to_string()),
    })
}

fn select_preset(player: &EqPlayer, preset: &PresetRef) -> Result<()> {
    match preset {
        PresetRef::Index(i) => player.select_eq_preset(*i),
        PresetRef::Name(name) => player.select_eq_preset_by_name(name),
    }
}

/// The preset to apply at startup; a config-file preset is dropped with a
/// warning when the equalizer is disabled.
fn startup_preset(preset: Option<PresetRef>, no_eq: bool) -> Option<PresetRef> {
    if !no_eq {
        return preset;
    }
    if let Some(preset) = preset {
        tracing::warn!(?preset, "--no-eq set; ignoring configured preset");
    }
    None
}

/// Play `url` until it ends, the user quits, or Ctrl-C.
pub fn run_play(url: &str, resolved: Resolved, no_eq: bool) -> Result<()> {
    let preset = startup_preset(resolved.preset, no_eq);
    let loaded = if no_eq {
        Loaded::Simple(SimplePlayer::open_with(url, resolved.player)?)
    } else {
        let player = EqPlayer::open_with(url, resolved.player)?;
        if let Some(preset) = &preset {
            select_preset(&player, preset)?;
        }
        Loaded::Eq(player)
    };

    let (ctrlc_tx, ctrlc_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    let lines = spawn_stdin_reader();
    loaded.player().play()?;
    eprintln!("playing {url} (p=play, space=pause, s=stop, eq <n|name>, status, q=quit)");

    let ticker = crossbeam_channel::tick(STATE_POLL_INTERVAL);
    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    match parse_input(&line) {
                        Some(Input::Quit) => break,
                        Some(input) => {
                            if let Err(e) = handle_input(&loaded, input) {
                                eprintln!("error: {e:#}");
                            }
                        }
                        None => {}
                    }
                }
                // stdin closed: keep playing until the track ends.
                Err(_) => {
                    tracing::debug!("stdin closed");
                    return wait_for_end(&loaded, ctrlc_rx.clone());
                }
            },
            recv(ctrlc_rx) -> _ => {
                tracing::info!("interrupted");
                break;
            },
            recv(ticker) -> _ => {
                if loaded.player().state() == PlaybackState::Ended {
                    report_end(&loaded);
                    break;
                }
            },
        }
    }

    loaded.player().stop()
}

fn wait_for_end(loaded: &Loaded, ctrlc_rx: Receiver<()>) -> Result<()> {
    let ticker = crossbeam_channel::tick(STATE_POLL_INTERVAL);
    loop {
        select! {
            recv(ctrlc_rx) -> _ => return loaded.player().stop(),
            recv(ticker) -> _ => {
                if loaded.player().is_stopped() && loaded.player().state() != PlaybackState::Paused {
                    report_end(loaded);
                    return Ok(());
                }
            },
        }
    }
}

fn report_end(loaded: &Loaded) {
    let status = loaded.player().status();
    tracing::info!(reason = ?status.end_reason, "playback finished");
}

fn handle_input(loaded: &Loaded, input: Input) -> Result<()> {
    let player = loaded.player();
    match input {
        Input::Play => player.play()?,
        Input::Pause => match player.state() {
            PlaybackState::Paused => player.play()?,
            _ => player.pause()?,
        },
        Input::Stop => player.stop()?,
        Input::Eq(preset) => {
            let eq = loaded
                .eq()
                .ok_or_else(|| anyhow!("equalizer disabled (--no-eq)"))?;
            select_preset(eq, &preset)?;
            let name = &eq.presets()[eq.selected_preset()].name;
            eprintln!("eq: {name}");
        }
        Input::Presets => {
            let Some(eq) = loaded.eq() else {
                bail!("equalizer disabled (--no-eq)");
            };
            for p in eq.presets() {
                let mark = if p.index == eq.selected_preset() { '*' } else { ' ' };
                eprintln!("{mark}{:>2}: {}", p.index, p.name);
            }
        }
        Input::Status => {
            println!("{}", serde_json::to_string_pretty(&player.status())?);
        }
        Input::Quit => {}
        Input::Unknown(cmd) => bail!("unknown command: {cmd}"),
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transport_words() {
        assert_eq!(parse_input("p"), Some(Input::Play));
        assert_eq!(parse_input("PLAY"), Some(Input::Play));
        assert_eq!(parse_input(" "), Some(Input::Pause));
        assert_eq!(parse_input("pause"), Some(Input::Pause));
        assert_eq!(parse_input("s"), Some(Input::Stop));
        assert_eq!(parse_input("q"), Some(Input::Quit));
        assert_eq!(parse_input(""), None);
    }

    #[test]
    fn parses_eq_argument() {
        assert_eq!(parse_input("eq 4"), Some(Input::Eq(PresetRef::Index(4))));
        assert_eq!(
            parse_input("eq  bass booster "),
            Some(Input::Eq(PresetRef::Name("bass booster".to_string())))
        );
        assert_eq!(parse_input("eq"), Some(Input::Unknown("eq".to_string())));
    }

    #[test]
    fn no_eq_drops_configured_preset() {
        let preset = Some(PresetRef::Name("Rock".to_string()));
        assert_eq!(startup_preset(preset.clone(), false), preset);
        assert_eq!(startup_preset(preset, true), None);
        assert_eq!(startup_preset(None, true), None);
    }

    #[test]
    fn unknown_words_are_reported() {
        assert_eq!(parse_input("louder"), Some(Input::Unknown("louder".to_string())));
    }
}
