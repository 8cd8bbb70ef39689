use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::AudioFetchError;
use crate::types::{CaptureEvent, ReplyId, ThreadId, TurnReply};

/// Live speech recognition over the microphone.
///
/// At most one capture session is live at a time; the orchestrator is the
/// only caller of `start`/`stop`. Permission problems are reported as
/// `CaptureEvent::Error(CaptureErrorKind::PermissionDenied)` on the event
/// channel; an `Err` from `start` is treated as a transient session failure
/// and retried against the restart budget.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Whether capture can work at all on this device/build.
    fn is_supported(&self) -> bool {
        true
    }

    /// Begin a capture session. Fragment/error/end events arrive on the
    /// returned channel until the session ends on its own or `stop` is
    /// called; a stopped session still emits `Ended` before the channel
    /// closes.
    async fn start(&self) -> Result<UnboundedReceiver<CaptureEvent>>;

    /// Ask the active session to stop. Best-effort and idempotent; a no-op
    /// when no session is live.
    async fn stop(&self);
}

/// The conversation service: turns a finalized utterance into the
/// counterpart's reply.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    async fn submit_utterance(&self, thread: ThreadId, text: &str) -> Result<TurnReply>;
}

/// Synthesized speech for a reply, as playable audio bytes.
#[async_trait]
pub trait SpeechAudioSource: Send + Sync {
    async fn fetch_audio(&self, reply: ReplyId) -> std::result::Result<Bytes, AudioFetchError>;
}

/// The audio-output device.
///
/// `play` decodes and plays one clip and resolves when it finishes. The
/// future must be cancel-safe: dropping it stops output, which is how a
/// superseded playback is cut off.
#[async_trait]
pub trait SpeechPlayer: Send + Sync {
    async fn play(&self, audio: Bytes) -> Result<()>;
}
