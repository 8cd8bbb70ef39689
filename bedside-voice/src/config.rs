//! Tunables for the voice turn cycle.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and budget knobs for a voice session. The defaults are the
/// product's tuned values; everything is overridable from settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceTurnConfig {
    /// Pause length after which the accumulated interim text is flushed as a
    /// finished utterance.
    pub silence_window_ms: u64,
    /// How many times a capture session is revived after ending on its own
    /// before voice mode gives up.
    pub max_restarts: u32,
    /// Wait before reviving an ended capture session.
    pub restart_backoff_ms: u64,
    /// Wait before reopening the microphone after a reply finished playing.
    /// Longer than the error delay so the output device has time to release.
    pub resume_after_playback_ms: u64,
    /// Wait before reopening the microphone when playback failed or never
    /// started.
    pub resume_after_error_ms: u64,
    /// A turn stuck waiting on a reply for this long is abandoned and the
    /// session returns to idle.
    pub idle_timeout_ms: u64,
}

impl Default for VoiceTurnConfig {
    fn default() -> Self {
        Self {
            silence_window_ms: 3_500,
            max_restarts: 20,
            restart_backoff_ms: 100,
            resume_after_playback_ms: 1_000,
            resume_after_error_ms: 500,
            idle_timeout_ms: 20_000,
        }
    }
}

impl VoiceTurnConfig {
    pub fn silence_window(&self) -> Duration {
        Duration::from_millis(self.silence_window_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn resume_after_playback(&self) -> Duration {
        Duration::from_millis(self.resume_after_playback_ms)
    }

    pub fn resume_after_error(&self) -> Duration {
        Duration::from_millis(self.resume_after_error_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VoiceTurnConfig::default();
        assert_eq!(config.silence_window(), Duration::from_millis(3_500));
        assert_eq!(config.max_restarts, 20);
        assert_eq!(config.restart_backoff(), Duration::from_millis(100));
        assert!(config.resume_after_playback() > config.resume_after_error());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: VoiceTurnConfig =
            serde_json::from_str(r#"{"silence_window_ms": 1200}"#).unwrap();
        assert_eq!(config.silence_window_ms, 1_200);
        assert_eq!(config.max_restarts, 20);
        assert_eq!(config.idle_timeout_ms, 20_000);
    }
}
