//! Player control worker.
//!
//! One thread per player owns the [`Transport`] and the running session.
//! Public calls send a command with a reply channel and block on the answer;
//! sessions report completion on a second channel, multiplexed with `select!`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, select};
use player_types::{PlaybackEndReason, PlaybackState};

use crate::config::PlayerConfig;
use crate::eq::EqControl;
use crate::pipeline::{self, PipelineEnd};
use crate::playback::OutputOptions;
use crate::source::MediaLocation;
use crate::status::{self, SharedStatus};
use crate::transport::{Transport, TransportAction, TransportCommand};
use crate::{decode, device};

/// Everything a session needs to reopen the media and the device.
#[derive(Clone)]
pub(crate) struct PlayerContext {
    pub(crate) location: MediaLocation,
    pub(crate) config: PlayerConfig,
    pub(crate) status: SharedStatus,
    pub(crate) eq: Option<Arc<EqControl>>,
}

enum WorkerCommand {
    Transport {
        cmd: TransportCommand,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

enum SessionEvent {
    Finished { id: u64, reason: PlaybackEndReason },
}

struct SessionHandle {
    id: u64,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Handle for sending commands to the worker; dropping it stops playback.
pub(crate) struct WorkerHandle {
    cmd_tx: Sender<WorkerCommand>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Run `cmd` on the worker and wait for its outcome.
    pub(crate) fn send(&self, cmd: TransportCommand) -> Result<()> {
        let (reply, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(WorkerCommand::Transport { cmd, reply })
            .map_err(|_| anyhow!("player worker is not running"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("player worker exited before replying"))?
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!("player worker panicked");
            }
        }
    }
}

/// Spawn the control worker thread.
pub(crate) fn spawn_worker(ctx: PlayerContext) -> Result<WorkerHandle> {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let join = thread::Builder::new()
        .name("eq-player-worker".to_string())
        .spawn(move || worker_main(ctx, cmd_rx))
        .context("spawn player worker")?;
    Ok(WorkerHandle {
        cmd_tx,
        join: Some(join),
    })
}

fn worker_main(ctx: PlayerContext, cmd_rx: Receiver<WorkerCommand>) {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let mut transport = Transport::default();
    let mut session: Option<SessionHandle> = None;
    let mut next_id = 0u64;

    loop {
        select! {
            recv(cmd_rx) -> msg => match msg {
                Ok(WorkerCommand::Transport { cmd, reply }) => {
                    let result = handle_command(
                        &ctx,
                        &mut transport,
                        &mut session,
                        &mut next_id,
                        &event_tx,
                        cmd,
                    );
                    publish(&ctx.status, &transport);
                    let _ = reply.send(result);
                }
                Ok(WorkerCommand::Shutdown) | Err(_) => break,
            },
            recv(event_rx) -> event => {
                if let Ok(SessionEvent::Finished { id, reason }) = event {
                    if transport.on_session_ended(id, reason) {
                        tracing::info!(session = id, ?reason, "playback ended");
                        reap_session(&mut session, id);
                        publish(&ctx.status, &transport);
                    }
                }
            },
        }
    }

    cancel_session(&mut session);
    tracing::debug!("player worker stopped");
}

fn handle_command(
    ctx: &PlayerContext,
    transport: &mut Transport,
    session: &mut Option<SessionHandle>,
    next_id: &mut u64,
    event_tx: &Sender<SessionEvent>,
    cmd: TransportCommand,
) -> Result<()> {
    let action = transport.action_for(cmd);
    tracing::debug!(?cmd, ?action, state = ?transport.state(), "transport command");

    match action {
        TransportAction::StartSession => {
            // A finished session may not be reaped yet.
            cancel_session(session);
            *next_id += 1;
            let handle = start_session(ctx, *next_id, event_tx)?;
            transport.session_started(handle.id);
            *session = Some(handle);
            return Ok(());
        }
        TransportAction::Resume | TransportAction::Pause => {
            if let Some(sess) = session.as_ref() {
                sess.paused
                    .store(action == TransportAction::Pause, Ordering::Relaxed);
            }
        }
        TransportAction::CancelSession => cancel_session(session),
        TransportAction::Nothing => {}
    }
    transport.commit(action);
    Ok(())
}

/// Mirror the transport into the shared status store.
fn publish(status: &SharedStatus, transport: &Transport) {
    let mut s = status::lock(status);
    s.state = transport.state();
    s.end_reason = transport.end_reason();
    if matches!(s.state, PlaybackState::Idle | PlaybackState::Ended) {
        s.clear_session();
    }
}

/// Cancel the current playback session and join its thread.
fn cancel_session(session: &mut Option<SessionHandle>) {
    if let Some(sess) = session.take() {
        sess.cancel.store(true, Ordering::Relaxed);
        if sess.join.join().is_err() {
            tracing::error!(session = sess.id, "playback session panicked");
        }
    }
}

/// Join a session that has already finished on its own.
fn reap_session(session: &mut Option<SessionHandle>, id: u64) {
    if session.as_ref().is_some_and(|s| s.id == id) {
        cancel_session(session);
    }
}

/// Spawn a session thread and wait until its output stream is running.
///
/// The CPAL stream is not `Send` on every host, so device setup happens on
/// the session thread; setup errors come back through the ready channel.
fn start_session(
    ctx: &PlayerContext,
    id: u64,
    event_tx: &Sender<SessionEvent>,
) -> Result<SessionHandle> {
    let cancel = Arc::new(AtomicBool::new(false));
    let paused = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

    let session = Session {
        id,
        ctx: ctx.clone(),
        cancel: cancel.clone(),
        paused: paused.clone(),
    };
    let events = event_tx.clone();
    let join = thread::Builder::new()
        .name(format!("eq-player-session-{id}"))
        .spawn(move || session.run(ready_tx, events))
        .context("spawn playback session")?;

    let ready = ready_rx
        .recv()
        .map_err(|_| anyhow!("playback session exited during setup"))
        .and_then(|r| r);
    if let Err(e) = ready {
        let _ = join.join();
        return Err(e);
    }

    Ok(SessionHandle {
        id,
        cancel,
        paused,
        join,
    })
}

struct Session {
    id: u64,
    ctx: PlayerContext,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

/// A drained pipeline only counts as EOF if the decoder got there cleanly.
fn end_reason(end: PipelineEnd, decode_failed: bool) -> PlaybackEndReason {
    match end {
        PipelineEnd::Drained if decode_failed => PlaybackEndReason::Error,
        PipelineEnd::Drained => PlaybackEndReason::Eof,
        PipelineEnd::Cancelled => PlaybackEndReason::Stopped,
        PipelineEnd::StreamFailed => PlaybackEndReason::Error,
    }
}

impl Session {
    fn run(self, ready: Sender<Result<()>>, events: Sender<SessionEvent>) {
        let (running, decode_failed) = match self.prepare() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session = self.id, "playback setup failed: {e:#}");
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let end = running.wait(&self.cancel);
        let reason = end_reason(end, decode_failed.load(Ordering::Relaxed));
        tracing::debug!(session = self.id, ?reason, "playback session finished");
        let _ = events.send(SessionEvent::Finished {
            id: self.id,
            reason,
        });
    }

    fn prepare(&self) -> Result<(pipeline::RunningPipeline, Arc<AtomicBool>)> {
        let ctx = &self.ctx;
        let host = cpal::default_host();
        let device = device::pick_device(&host, ctx.config.device.as_deref())?;
        let target_rate = status::lock(&ctx.status)
            .source
            .as_ref()
            .map(|s| s.sample_rate);
        let config = device::pick_output_config(&device, target_rate)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }

        let source = ctx
            .location
            .open(&ctx.config.http, Some(self.cancel.clone()))?;
        let decoded = decode::start_streaming_decode(
            source,
            &ctx.location.probe_hint(),
            ctx.config.playback.buffer_seconds,
        )
        .with_context(|| format!("decode {}", ctx.location))?;

        let played_frames = Arc::new(AtomicU64::new(0));
        let underrun_frames = Arc::new(AtomicU64::new(0));
        let underrun_events = Arc::new(AtomicU64::new(0));
        let running = pipeline::start(
            &device,
            &config,
            &stream_config,
            &ctx.config.playback,
            decoded.spec,
            decoded.queue,
            OutputOptions {
                refill_max_frames: ctx.config.playback.refill_max_frames,
                paused: self.paused.clone(),
                played_frames: played_frames.clone(),
                underrun_frames: underrun_frames.clone(),
                underrun_events: underrun_events.clone(),
                stream_failed: Arc::new(AtomicBool::new(false)),
                eq: ctx.eq.clone(),
            },
        )?;

        let device_name = device::device_name(&device);
        tracing::info!(
            session = self.id,
            media = %ctx.location,
            device = %device_name,
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            format = ?config.sample_format(),
            "playback session started"
        );
        {
            let mut s = status::lock(&ctx.status);
            s.device = Some(device_name);
            s.sample_rate = Some(stream_config.sample_rate);
            s.output_sample_format = Some(format!("{:?}", config.sample_format()));
            s.resampling = Some(running.resampling());
            s.played_frames = Some(played_frames);
            s.underrun_frames = Some(underrun_frames);
            s.underrun_events = Some(underrun_events);
        }

        Ok((running, decoded.failed))
    }
}
