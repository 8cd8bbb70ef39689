//! Top-level voice turn orchestration.
//!
//! A single actor task owns every device resource and timer and processes
//! commands and collaborator events in arrival order, so "intended" and
//! "actual" mode can never drift apart. Stale work is fenced off by tags: a
//! session epoch for backend/audio round-trips, a generation per capture
//! session and per timer, and a token per playback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::VoiceTurnConfig;
use crate::endpointer::SilenceEndpointer;
use crate::error::{AudioFetchError, FatalReason};
use crate::playback::{AudioPlaybackGate, PlaybackFinished};
use crate::supervisor::{EndDisposition, ErrorDisposition, RestartSupervisor};
use crate::traits::{ConversationBackend, RecognitionEngine, SpeechAudioSource, SpeechPlayer};
use crate::types::{CaptureEvent, ReplyId, ThreadId, TurnReply, VoiceStatus, VoiceTurnState};

enum Command {
    Start(ThreadId),
    End,
    SubmitText(String),
}

enum Event {
    Capture {
        r#gen: u64,
        event: CaptureEvent,
    },
    SilenceElapsed {
        r#gen: u64,
    },
    RestartElapsed {
        epoch: u64,
    },
    ResumeElapsed {
        epoch: u64,
    },
    IdleElapsed {
        r#gen: u64,
    },
    ReplyArrived {
        epoch: u64,
        outcome: anyhow::Result<TurnReply>,
    },
    AudioReady {
        epoch: u64,
        reply: ReplyId,
        outcome: Result<Bytes, AudioFetchError>,
    },
}

/// A live capture session: its event-forwarder task plus the generation tag
/// that fences off events from sessions that no longer exist.
struct Capture {
    r#gen: u64,
    forwarder: JoinHandle<()>,
}

/// Handle to a running voice turn orchestrator.
///
/// Spawns the actor on construction; all methods just enqueue. The status
/// observable is a `watch` channel so the presentation layer can render
/// `{state, interim_text, is_playing}` without polling.
pub struct VoiceTurn {
    cmd_tx: UnboundedSender<Command>,
    status_rx: watch::Receiver<VoiceStatus>,
    desired: Arc<AtomicBool>,
    #[allow(dead_code)]
    machine: JoinHandle<()>,
}

impl VoiceTurn {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        backend: Arc<dyn ConversationBackend>,
        audio: Arc<dyn SpeechAudioSource>,
        player: Arc<dyn SpeechPlayer>,
        config: VoiceTurnConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(VoiceStatus::default());
        let desired = Arc::new(AtomicBool::new(false));
        let machine = VoiceTurnMachine::new(
            engine,
            backend,
            audio,
            player,
            config,
            Arc::clone(&desired),
            status_tx,
        );
        let handle = tokio::spawn(machine.run(cmd_rx));
        Self {
            cmd_tx,
            status_rx,
            desired,
            machine: handle,
        }
    }

    /// Begin a voice turn on `thread`. Ignored while a session is already
    /// active or when capture is unsupported.
    pub fn start_voice_turn(&self, thread: ThreadId) {
        let _ = self.cmd_tx.send(Command::Start(thread));
    }

    /// Stop the voice session, safe from any state. The desired flag is
    /// cleared before this returns, so completions already in flight can no
    /// longer reopen the microphone.
    pub fn end_voice_turn(&self) {
        self.desired.store(false, Ordering::SeqCst);
        let _ = self.cmd_tx.send(Command::End);
    }

    /// Submit typed text as an utterance. Subject to the same guard as
    /// spoken utterances: dropped unless listening or awaiting a reply on an
    /// open conversation.
    pub fn submit_text(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::SubmitText(text.into()));
    }

    pub fn status(&self) -> VoiceStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes for rendering.
    pub fn subscribe(&self) -> watch::Receiver<VoiceStatus> {
        self.status_rx.clone()
    }
}

struct VoiceTurnMachine {
    engine: Arc<dyn RecognitionEngine>,
    backend: Arc<dyn ConversationBackend>,
    audio: Arc<dyn SpeechAudioSource>,
    config: VoiceTurnConfig,

    supervisor: RestartSupervisor,
    endpointer: SilenceEndpointer,
    gate: AudioPlaybackGate,

    event_tx: UnboundedSender<Event>,
    event_rx: Option<UnboundedReceiver<Event>>,
    playback_rx: Option<UnboundedReceiver<PlaybackFinished>>,
    status_tx: watch::Sender<VoiceStatus>,

    state: VoiceTurnState,
    thread: Option<ThreadId>,
    conversation_open: bool,
    last_spoken: Option<ReplyId>,
    is_playing: bool,
    fatal: Option<FatalReason>,

    /// Bumped on every explicit start and teardown; round-trips tagged with
    /// an older epoch are discarded on arrival.
    epoch: u64,
    capture: Option<Capture>,
    capture_gen: u64,
    silence_timer: Option<JoinHandle<()>>,
    silence_gen: u64,
    idle_timer: Option<JoinHandle<()>>,
    idle_gen: u64,
    restart_timer: Option<JoinHandle<()>>,
    resume_timer: Option<JoinHandle<()>>,
}

impl VoiceTurnMachine {
    fn new(
        engine: Arc<dyn RecognitionEngine>,
        backend: Arc<dyn ConversationBackend>,
        audio: Arc<dyn SpeechAudioSource>,
        player: Arc<dyn SpeechPlayer>,
        config: VoiceTurnConfig,
        desired: Arc<AtomicBool>,
        status_tx: watch::Sender<VoiceStatus>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (done_tx, playback_rx) = mpsc::unbounded_channel();
        let supervisor = RestartSupervisor::new(desired, config.max_restarts);
        let gate = AudioPlaybackGate::new(Arc::clone(&engine), player, done_tx, &config);
        Self {
            engine,
            backend,
            audio,
            config,
            supervisor,
            endpointer: SilenceEndpointer::new(),
            gate,
            event_tx,
            event_rx: Some(event_rx),
            playback_rx: Some(playback_rx),
            status_tx,
            state: VoiceTurnState::Idle,
            thread: None,
            conversation_open: false,
            last_spoken: None,
            is_playing: false,
            fatal: None,
            epoch: 0,
            capture: None,
            capture_gen: 0,
            silence_timer: None,
            silence_gen: 0,
            idle_timer: None,
            idle_gen: 0,
            restart_timer: None,
            resume_timer: None,
        }
    }

    async fn run(mut self, mut cmd_rx: UnboundedReceiver<Command>) {
        let mut event_rx = self.event_rx.take().expect("event receiver consumed once");
        let mut playback_rx = self
            .playback_rx
            .take()
            .expect("playback receiver consumed once");
        loop {
            tokio::select! {
                biased;
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Handle dropped: tear down and exit so nothing leaks.
                    None => {
                        self.teardown(VoiceTurnState::Idle, None).await;
                        break;
                    }
                },
                Some(report) = playback_rx.recv() => self.handle_playback(report).await,
                Some(event) = event_rx.recv() => self.handle_event(event).await,
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start(thread) => self.start_voice_turn(thread).await,
            Command::End => {
                info!("voice turn ended by caller");
                self.teardown(VoiceTurnState::Idle, None).await;
            }
            Command::SubmitText(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    self.submit_utterance(trimmed.to_string());
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Capture { r#gen, event } => {
                if self.capture.as_ref().map(|c| c.r#gen) != Some(r#gen) {
                    debug!(r#gen, "event from stale capture session dropped");
                    return;
                }
                self.handle_capture_event(event).await;
            }
            Event::SilenceElapsed { r#gen } => {
                if r#gen != self.silence_gen {
                    return;
                }
                self.silence_timer = None;
                self.on_silence().await;
            }
            Event::RestartElapsed { epoch } => {
                if epoch != self.epoch {
                    return;
                }
                self.restart_timer = None;
                if self.supervisor.is_desired()
                    && self.capture.is_none()
                    && matches!(
                        self.state,
                        VoiceTurnState::Listening | VoiceTurnState::AwaitingReply
                    )
                {
                    self.start_capture().await;
                }
            }
            Event::ResumeElapsed { epoch } => {
                if epoch != self.epoch {
                    return;
                }
                self.resume_timer = None;
                if self.supervisor.is_desired() && self.conversation_open && self.capture.is_none()
                {
                    self.start_capture().await;
                }
            }
            Event::IdleElapsed { r#gen } => {
                if r#gen != self.idle_gen {
                    return;
                }
                self.idle_timer = None;
                // Neither listening nor speaking for the whole idle window:
                // the turn is stuck, give the device back.
                if self.state == VoiceTurnState::AwaitingReply {
                    info!("voice turn idle too long, returning to idle");
                    self.teardown(VoiceTurnState::Idle, None).await;
                }
            }
            Event::ReplyArrived { epoch, outcome } => self.handle_reply(epoch, outcome).await,
            Event::AudioReady {
                epoch,
                reply,
                outcome,
            } => self.handle_audio(epoch, reply, outcome).await,
        }
    }

    async fn start_voice_turn(&mut self, thread: ThreadId) {
        match self.state {
            VoiceTurnState::Idle | VoiceTurnState::Error => {}
            _ => {
                debug!("start ignored, voice turn already active");
                return;
            }
        }
        if !self.engine.is_supported() {
            warn!("speech capture not supported here, voice turn not started");
            return;
        }
        self.epoch += 1;
        self.thread = Some(thread);
        self.conversation_open = true;
        self.last_spoken = None;
        self.fatal = None;
        self.endpointer.clear();
        self.supervisor.arm();
        info!(%thread, "voice turn started");
        // Listening from here on: capture may still be spinning up (or being
        // revived after a failed first start), but the session is live.
        self.set_state(VoiceTurnState::Listening);
        self.start_capture().await;
    }

    /// Open a capture session and forward its events into the queue, tagged
    /// with a fresh generation.
    async fn start_capture(&mut self) {
        self.drop_capture();
        self.capture_gen += 1;
        let r#gen = self.capture_gen;
        match self.engine.start().await {
            Ok(mut events) => {
                let event_tx = self.event_tx.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if event_tx.send(Event::Capture { r#gen, event }).is_err() {
                            break;
                        }
                    }
                });
                self.capture = Some(Capture { r#gen, forwarder });
                if self.state != VoiceTurnState::AwaitingReply {
                    self.set_state(VoiceTurnState::Listening);
                } else {
                    self.publish();
                }
                self.arm_silence_timer();
            }
            Err(e) => {
                warn!("capture session failed to start: {e:#}");
                self.on_capture_gone().await;
            }
        }
    }

    async fn handle_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Started => {
                debug!("capture session live");
                self.arm_silence_timer();
            }
            CaptureEvent::Fragment { text, is_final } => {
                // Every fragment, interim or final, restarts the pause window.
                self.arm_silence_timer();
                if let Some(utterance) = self.endpointer.push_fragment(&text, is_final) {
                    self.submit_utterance(utterance);
                }
                self.publish();
            }
            CaptureEvent::Error(kind) => match self.supervisor.classify_error(&kind) {
                ErrorDisposition::Transient => {
                    debug!(%kind, "transient capture error ignored");
                }
                ErrorDisposition::Fatal(reason) => {
                    error!(%reason, "fatal capture error");
                    self.teardown(VoiceTurnState::Error, Some(reason)).await;
                }
            },
            CaptureEvent::Ended => {
                debug!("capture session ended");
                self.drop_capture();
                self.endpointer.clear();
                self.publish();
                if matches!(
                    self.state,
                    VoiceTurnState::Listening | VoiceTurnState::AwaitingReply
                ) {
                    self.on_capture_gone().await;
                }
            }
        }
    }

    /// Capture is supposed to be live but is not; consult the restart budget.
    async fn on_capture_gone(&mut self) {
        match self.supervisor.on_session_end() {
            EndDisposition::Ignore => {}
            EndDisposition::Restart { attempt } => {
                debug!(attempt, "scheduling capture revival");
                let epoch = self.epoch;
                if let Some(timer) = self.restart_timer.take() {
                    timer.abort();
                }
                let backoff = self.config.restart_backoff();
                self.restart_timer = Some(self.schedule(backoff, Event::RestartElapsed { epoch }));
            }
            EndDisposition::Exhausted => {
                error!("capture unavailable, restart budget exhausted");
                let reason = FatalReason::RestartsExhausted(self.config.max_restarts);
                self.teardown(VoiceTurnState::Error, Some(reason)).await;
            }
        }
    }

    /// The pause window elapsed with no engine-final result.
    async fn on_silence(&mut self) {
        if let Some(utterance) = self.endpointer.flush() {
            self.submit_utterance(utterance);
        }
        self.publish();
        // Stop the engine after a flush; its end event drives the supervisor,
        // which brings capture back for the next turn.
        if self.capture.is_some() {
            self.engine.stop().await;
        }
    }

    /// Hand a finished utterance to the backend. Dropped when the
    /// conversation is closed or the machine is not in a capturing state.
    fn submit_utterance(&mut self, text: String) {
        if !self.conversation_open {
            debug!("utterance dropped, conversation closed");
            return;
        }
        if !matches!(
            self.state,
            VoiceTurnState::Listening | VoiceTurnState::AwaitingReply
        ) {
            debug!(state = ?self.state, "utterance dropped, not capturing");
            return;
        }
        let Some(thread) = self.thread else {
            return;
        };
        info!(chars = text.len(), "submitting utterance");
        self.set_state(VoiceTurnState::AwaitingReply);
        self.arm_idle_timer();

        let backend = Arc::clone(&self.backend);
        let event_tx = self.event_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = backend.submit_utterance(thread, &text).await;
            let _ = event_tx.send(Event::ReplyArrived { epoch, outcome });
        });
    }

    async fn handle_reply(&mut self, epoch: u64, outcome: anyhow::Result<TurnReply>) {
        if epoch != self.epoch {
            debug!("reply from a previous voice session dropped");
            return;
        }
        match outcome {
            Ok(reply) => {
                if reply.thread_closed {
                    info!("conversation closed by backend");
                    self.conversation_open = false;
                }
                if self.last_spoken.is_some_and(|last| reply.reply_id <= last) {
                    debug!(reply = %reply.reply_id, "duplicate reply ignored");
                    self.settle_without_narration().await;
                    return;
                }
                if reply.replies.is_empty() {
                    debug!("reply carried no text");
                    self.settle_without_narration().await;
                    return;
                }
                self.last_spoken = Some(reply.reply_id);
                let audio = Arc::clone(&self.audio);
                let event_tx = self.event_tx.clone();
                let epoch = self.epoch;
                let reply_id = reply.reply_id;
                tokio::spawn(async move {
                    let outcome = audio.fetch_audio(reply_id).await;
                    let _ = event_tx.send(Event::AudioReady {
                        epoch,
                        reply: reply_id,
                        outcome,
                    });
                });
            }
            Err(e) => {
                // A flaky backend must not freeze the conversation: skip the
                // reply and keep listening.
                warn!("utterance submission failed: {e:#}");
                self.resume_capture_soon(false).await;
            }
        }
    }

    async fn handle_audio(
        &mut self,
        epoch: u64,
        reply: ReplyId,
        outcome: Result<Bytes, AudioFetchError>,
    ) {
        if epoch != self.epoch {
            return;
        }
        if self.last_spoken != Some(reply) {
            debug!(%reply, "audio for a superseded reply dropped");
            return;
        }
        match outcome {
            Ok(audio) => {
                info!(%reply, bytes = audio.len(), "reply audio ready");
                // The gate stops the engine itself; dropping the forwarder
                // first keeps the session's end event from reaching the
                // supervisor as an unexpected death.
                self.drop_capture();
                self.endpointer.clear();
                let token = self.gate.play(audio).await;
                debug!(token, "speaking reply");
                self.is_playing = true;
                self.set_state(VoiceTurnState::Speaking);
                self.arm_idle_timer();
            }
            Err(e) => {
                // No narration for this turn, but the conversation goes on.
                warn!(%reply, "skipping narration: {e}");
                self.resume_capture_soon(false).await;
            }
        }
    }

    async fn handle_playback(&mut self, report: PlaybackFinished) {
        if !self.gate.acknowledge(&report) {
            debug!(token = report.token, "stale playback report ignored");
            return;
        }
        debug!(token = report.token, success = report.success, "playback finished");
        self.is_playing = false;
        if !self.supervisor.is_desired() {
            // An explicit stop raced with the completion; teardown handles
            // the rest.
            self.publish();
            return;
        }
        self.resume_capture_soon(report.success).await;
    }

    /// Get back to listening (immediately if capture is still live, after
    /// the settle delay otherwise), or to idle when the conversation closed.
    async fn resume_capture_soon(&mut self, after_success: bool) {
        if !self.supervisor.is_desired() {
            return;
        }
        if !self.conversation_open {
            self.teardown(VoiceTurnState::Idle, None).await;
            return;
        }
        if self.capture.is_some() {
            self.set_state(VoiceTurnState::Listening);
            return;
        }
        let epoch = self.epoch;
        if let Some(timer) = self.resume_timer.take() {
            timer.abort();
        }
        let delay = self.gate.resume_delay(after_success);
        self.resume_timer = Some(self.schedule(delay, Event::ResumeElapsed { epoch }));
        self.publish();
    }

    /// A reply arrived but there is nothing to say (duplicate or empty).
    async fn settle_without_narration(&mut self) {
        if !self.conversation_open {
            if self.state != VoiceTurnState::Speaking {
                self.teardown(VoiceTurnState::Idle, None).await;
            }
            return;
        }
        if self.state == VoiceTurnState::AwaitingReply {
            self.resume_capture_soon(true).await;
        }
    }

    /// Release every resource and timer, then land in `next`. Nothing owned
    /// by the machine outlives this call.
    async fn teardown(&mut self, next: VoiceTurnState, fatal: Option<FatalReason>) {
        self.epoch += 1;
        self.supervisor.stand_down();
        let had_capture = self.capture.is_some();
        self.drop_capture();
        if had_capture {
            self.engine.stop().await;
        }
        self.cancel_silence_timer();
        self.cancel_idle_timer();
        if let Some(timer) = self.restart_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.resume_timer.take() {
            timer.abort();
        }
        self.gate.cancel();
        self.endpointer.clear();
        self.thread = None;
        self.last_spoken = None;
        self.is_playing = false;
        self.conversation_open = false;
        self.fatal = fatal;
        self.set_state(next);
    }

    /// Abort the capture forwarder and forget the session. Does not ask the
    /// engine to stop; callers decide that.
    fn drop_capture(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.forwarder.abort();
        }
        self.cancel_silence_timer();
    }

    fn arm_silence_timer(&mut self) {
        self.silence_gen += 1;
        let r#gen = self.silence_gen;
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
        self.silence_timer =
            Some(self.schedule(self.config.silence_window(), Event::SilenceElapsed { r#gen }));
    }

    fn cancel_silence_timer(&mut self) {
        self.silence_gen += 1;
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
    }

    fn arm_idle_timer(&mut self) {
        self.idle_gen += 1;
        let r#gen = self.idle_gen;
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
        self.idle_timer =
            Some(self.schedule(self.config.idle_timeout(), Event::IdleElapsed { r#gen }));
    }

    fn cancel_idle_timer(&mut self) {
        self.idle_gen += 1;
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }

    fn schedule(&self, delay: Duration, event: Event) -> JoinHandle<()> {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = event_tx.send(event);
        })
    }

    fn set_state(&mut self, state: VoiceTurnState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "state transition");
            self.state = state;
        }
        self.publish();
    }

    fn publish(&self) {
        let _ = self.status_tx.send(VoiceStatus {
            state: self.state,
            interim_text: self.endpointer.interim().to_string(),
            is_playing: self.is_playing,
            fatal: self.fatal.clone(),
        });
    }
}
