use serde::{Deserialize, Serialize};

use crate::error::{CaptureErrorKind, FatalReason};

/// Identifier of one consultation thread on the backend service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub u64);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one counterpart reply. Ids increase monotonically within a
/// thread, which is what makes duplicate and out-of-order delivery detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplyId(pub u64);

impl std::fmt::Display for ReplyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the orchestrator is in the turn cycle. Single source of truth:
/// exactly one capture session may exist in `Listening`, exactly one playback
/// may exist in `Speaking`, never both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceTurnState {
    #[default]
    Idle,
    /// Microphone open, waiting for the user to finish an utterance.
    Listening,
    /// An utterance was submitted; waiting for the counterpart's reply.
    AwaitingReply,
    /// Reply audio is playing; the microphone is closed.
    Speaking,
    /// A fatal capture failure ended the session. Requires an explicit
    /// restart by the user.
    Error,
}

/// Events emitted by a live capture session.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The underlying recognition session is up and listening.
    Started,
    /// An incremental transcript fragment. Interim fragments are cumulative
    /// revisions of the current utterance; a final fragment closes it.
    Fragment { text: String, is_final: bool },
    /// The engine reported an error. The session may still end on its own
    /// afterwards with `Ended`.
    Error(CaptureErrorKind),
    /// The session ended, expectedly or not.
    Ended,
}

/// Reply to one submitted utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// Counterpart reply texts, oldest first.
    pub replies: Vec<String>,
    /// Id of the newest reply, used for speech fetch and duplicate detection.
    pub reply_id: ReplyId,
    /// The backend closed the conversation with this reply.
    pub thread_closed: bool,
}

/// Read-only snapshot published for rendering (orb animation, captions,
/// status text).
#[derive(Debug, Clone, Default)]
pub struct VoiceStatus {
    pub state: VoiceTurnState,
    /// Live, non-authoritative transcript of the utterance in progress.
    pub interim_text: String,
    pub is_playing: bool,
    /// Set while `state` is `Error`.
    pub fatal: Option<FatalReason>,
}
