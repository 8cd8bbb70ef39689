//! Voice turn-taking orchestration for bedside
//!
//! This crate decides, at any instant, whether the microphone is capturing,
//! the system is waiting for the counterpart's reply, or reply audio is
//! playing, and manages the handoffs between those:
//! - Pause-based utterance segmentation ([`SilenceEndpointer`])
//! - Capture revival across engine hiccups ([`RestartSupervisor`])
//! - Microphone/speaker mutual exclusion ([`AudioPlaybackGate`])
//! - The orchestrating state machine and its public handle ([`VoiceTurn`])
//!
//! Recognition, the conversation service, speech synthesis, and rendering
//! are collaborators behind the traits in [`traits`].

pub mod config;
pub mod endpointer;
pub mod error;
pub mod machine;
pub mod playback;
pub mod supervisor;
pub mod traits;
pub mod types;

pub use config::VoiceTurnConfig;
pub use endpointer::SilenceEndpointer;
pub use error::{AudioFetchError, CaptureErrorKind, FatalReason};
pub use machine::VoiceTurn;
pub use playback::AudioPlaybackGate;
pub use supervisor::RestartSupervisor;
pub use traits::{ConversationBackend, RecognitionEngine, SpeechAudioSource, SpeechPlayer};
pub use types::{CaptureEvent, ReplyId, ThreadId, TurnReply, VoiceStatus, VoiceTurnState};
