//! Transport state machine.
//!
//! Decides what a `play`/`pause`/`stop` request means for the current state
//! without touching any audio resources; the worker carries the decision out
//! and commits it back here.

use player_types::{PlaybackEndReason, PlaybackState};

/// User-facing transport request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
}

/// What the worker has to do to honour a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportAction {
    /// Open the device and start decoding from the beginning.
    StartSession,
    /// Clear the paused flag of the running session.
    Resume,
    /// Set the paused flag of the running session.
    Pause,
    /// Cancel and join the running session, if any.
    CancelSession,
    Nothing,
}

#[derive(Debug, Default)]
pub struct Transport {
    state: PlaybackState,
    session: Option<u64>,
    end_reason: Option<PlaybackEndReason>,
}

impl Transport {
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Id of the session that currently owns the output, if any.
    pub fn session(&self) -> Option<u64> {
        self.session
    }

    pub fn end_reason(&self) -> Option<PlaybackEndReason> {
        self.end_reason
    }

    pub fn action_for(&self, cmd: TransportCommand) -> TransportAction {
        use PlaybackState::*;
        match (cmd, self.state) {
            (TransportCommand::Play, Idle | Ended) => TransportAction::StartSession,
            (TransportCommand::Play, Paused) => TransportAction::Resume,
            (TransportCommand::Play, Playing) => TransportAction::Nothing,
            (TransportCommand::Pause, Playing) => TransportAction::Pause,
            (TransportCommand::Pause, _) => TransportAction::Nothing,
            (TransportCommand::Stop, Idle) => TransportAction::Nothing,
            (TransportCommand::Stop, _) => TransportAction::CancelSession,
        }
    }

    /// Record that session `id` is rendering audio.
    pub fn session_started(&mut self, id: u64) {
        self.state = PlaybackState::Playing;
        self.session = Some(id);
        self.end_reason = None;
    }

    /// Commit a completed action. `StartSession` is committed through
    /// [`Self::session_started`] instead, once the output is actually running.
    pub fn commit(&mut self, action: TransportAction) {
        match action {
            TransportAction::Resume => self.state = PlaybackState::Playing,
            TransportAction::Pause => self.state = PlaybackState::Paused,
            TransportAction::CancelSession => {
                self.state = PlaybackState::Idle;
                self.session = None;
                self.end_reason = Some(PlaybackEndReason::Stopped);
            }
            TransportAction::StartSession | TransportAction::Nothing => {}
        }
    }

    /// Handle a session finishing on its own.
    ///
    /// Returns `false` (and changes nothing) when `id` is not the current
    /// session, e.g. a cancelled session reporting late.
    pub fn on_session_ended(&mut self, id: u64, reason: PlaybackEndReason) -> bool {
        if self.session != Some(id) {
            return false;
        }
        self.state = PlaybackState::Ended;
        self.session = None;
        self.end_reason = Some(reason);
        true
    }
}
