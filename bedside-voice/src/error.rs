use thiserror::Error;

/// Classification of errors reported by a recognition engine.
///
/// Only `PermissionDenied` is fatal; everything else is the engine being
/// glitchy after a pause and is absorbed without a state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureErrorKind {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no speech detected")]
    NoSpeech,
    #[error("audio capture glitch")]
    AudioCapture,
    #[error("capture error: {0}")]
    Other(String),
}

/// Why a voice session ended in the error state. Voice mode stays off until
/// the user explicitly starts it again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalReason {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("capture unavailable after {0} restart attempts")]
    RestartsExhausted(u32),
}

/// Speech audio could not be fetched for a reply.
#[derive(Debug, Clone, Error)]
#[error("speech fetch failed: {message}")]
pub struct AudioFetchError {
    /// HTTP status when the service answered with a non-success code.
    pub status: Option<u16>,
    pub message: String,
}

impl AudioFetchError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}
