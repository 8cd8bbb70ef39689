//! Exclusive ownership of the audio-output device.
//!
//! The microphone and the speaker are mutually exclusive: reply audio never
//! plays while capture is open. The gate stops capture before starting
//! playback and hands completion back to the orchestrator, which reopens
//! the microphone after a short settle delay.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::VoiceTurnConfig;
use crate::traits::{RecognitionEngine, SpeechPlayer};

/// Completion report for one playback token. Reports for superseded tokens
/// are discarded by [`AudioPlaybackGate::acknowledge`].
#[derive(Debug, Clone, Copy)]
pub struct PlaybackFinished {
    pub token: u64,
    pub success: bool,
}

/// Exclusive handle on one in-progress reply playback.
struct PlaybackToken {
    id: u64,
    task: JoinHandle<()>,
}

/// Arbiter of who may use the audio device: at most one playback token is
/// live at any time, and starting a new one supersedes the previous one
/// synchronously so a stale clip can no longer trigger anything.
pub struct AudioPlaybackGate {
    engine: Arc<dyn RecognitionEngine>,
    player: Arc<dyn SpeechPlayer>,
    done_tx: UnboundedSender<PlaybackFinished>,
    current: Option<PlaybackToken>,
    next_token: u64,
    resume_after_playback: Duration,
    resume_after_error: Duration,
}

impl AudioPlaybackGate {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        player: Arc<dyn SpeechPlayer>,
        done_tx: UnboundedSender<PlaybackFinished>,
        config: &VoiceTurnConfig,
    ) -> Self {
        Self {
            engine,
            player,
            done_tx,
            current: None,
            next_token: 0,
            resume_after_playback: config.resume_after_playback(),
            resume_after_error: config.resume_after_error(),
        }
    }

    /// Stop capture, supersede any previous token, start playing `audio`.
    /// Capture-stop failures never block playback.
    pub async fn play(&mut self, audio: Bytes) -> u64 {
        self.engine.stop().await;
        self.cancel();

        self.next_token += 1;
        let id = self.next_token;
        let player = Arc::clone(&self.player);
        let done_tx = self.done_tx.clone();
        let task = tokio::spawn(async move {
            let result = player.play(audio).await;
            if let Err(ref e) = result {
                warn!(token = id, "reply playback failed: {e:#}");
            }
            let _ = done_tx.send(PlaybackFinished {
                token: id,
                success: result.is_ok(),
            });
        });
        debug!(token = id, "playback token acquired");
        self.current = Some(PlaybackToken { id, task });
        id
    }

    /// Abort the in-flight playback, if any. Aborting drops the player
    /// future, which stops output; any completion report it already sent is
    /// stale and will not be acknowledged.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            debug!(token = token.id, "playback token cancelled");
            token.task.abort();
        }
    }

    /// True when `report` belongs to the current token; releases it.
    pub fn acknowledge(&mut self, report: &PlaybackFinished) -> bool {
        match &self.current {
            Some(token) if token.id == report.token => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// How long to wait before reopening the microphone. Longer after a
    /// clean finish than after an error so the output device can release.
    pub fn resume_delay(&self, success: bool) -> Duration {
        if success {
            self.resume_after_playback
        } else {
            self.resume_after_error
        }
    }
}
