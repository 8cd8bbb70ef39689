//! REST collaborators for the bedside voice orchestrator.
//!
//! Talks to the consultation service (threads, messages, reply speech) and
//! implements the `bedside-voice` collaborator contracts:
//! - [`ConsultationService`] as `ConversationBackend` and `SpeechAudioSource`
//! - [`Settings`] for the service endpoint, auth token, and voice tuning

pub mod api;
pub mod backend;
pub mod client;
pub mod settings;

pub use api::{MessageRow, Role, ThreadMeta, ThreadStatus};
pub use backend::ConsultationService;
pub use client::{Client, StatusError};
pub use settings::Settings;
