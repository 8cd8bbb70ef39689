//! Pause-based utterance endpointing.
//!
//! Converts the engine's stream of revisable transcript fragments into
//! discrete finished utterances. An engine-final fragment finalizes
//! immediately; otherwise the orchestrator's silence timer expires and the
//! accumulated interim text is flushed as the utterance ("silence flush"),
//! so a turn counts even when the engine never produces a final result.

use tracing::debug;

/// Accumulates fragments for the utterance in progress.
///
/// Pure state: the silence timer itself lives in the state machine, which
/// re-arms it on every fragment and calls [`SilenceEndpointer::flush`] when
/// it fires.
#[derive(Debug, Default)]
pub struct SilenceEndpointer {
    interim: String,
}

impl SilenceEndpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Interim fragments are cumulative revisions and
    /// replace the accumulated text; a final fragment emits immediately and
    /// clears it. Empty or whitespace-only text emits nothing either way.
    pub fn push_fragment(&mut self, text: &str, is_final: bool) -> Option<String> {
        if is_final {
            self.interim.clear();
            let utterance = text.trim();
            if utterance.is_empty() {
                None
            } else {
                debug!(chars = utterance.len(), "utterance finalized by engine");
                Some(utterance.to_string())
            }
        } else {
            self.interim = text.to_string();
            None
        }
    }

    /// Silence flush: emit whatever interim text has accumulated, trimmed.
    pub fn flush(&mut self) -> Option<String> {
        let utterance = self.interim.trim().to_string();
        self.interim.clear();
        if utterance.is_empty() {
            None
        } else {
            debug!(chars = utterance.len(), "utterance flushed on silence");
            Some(utterance)
        }
    }

    /// Live transcript of the utterance in progress, for display only.
    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn clear(&mut self) {
        self.interim.clear();
    }
}
