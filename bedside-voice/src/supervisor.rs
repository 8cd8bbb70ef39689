//! Keeps capture effectively continuous across engine hiccups.
//!
//! Recognition sessions routinely end on their own after a pause without
//! that being a real end of the conversation. The supervisor swallows those
//! by reviving capture, bounded by a restart budget, while still surfacing
//! the states that genuinely cannot be recovered (permission denial, budget
//! exhaustion).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::error::{CaptureErrorKind, FatalReason};

/// What to do when a capture session ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDisposition {
    /// Revive capture after the backoff; `attempt` counts from 1.
    Restart { attempt: u32 },
    /// Budget spent. Voice mode is no longer desired.
    Exhausted,
    /// Voice mode was not desired anyway; nothing to do.
    Ignore,
}

/// What to do about an engine-reported error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// A normal pause or glitch. No state change, no escalation.
    Transient,
    /// Unrecoverable. Voice mode is no longer desired.
    Fatal(FatalReason),
}

/// Restart policy state for one voice session.
///
/// `desired` is shared with the session handle so an explicit stop can clear
/// it before the teardown command is processed; the counter lives here so
/// its lifetime is tied exactly to one voice session.
pub struct RestartSupervisor {
    desired: Arc<AtomicBool>,
    restart_count: u32,
    max_restarts: u32,
}

impl RestartSupervisor {
    pub fn new(desired: Arc<AtomicBool>, max_restarts: u32) -> Self {
        Self {
            desired,
            restart_count: 0,
            max_restarts,
        }
    }

    /// Fresh explicit start: voice mode is desired again and the budget
    /// resets.
    pub fn arm(&mut self) {
        self.desired.store(true, Ordering::SeqCst);
        self.restart_count = 0;
    }

    pub fn stand_down(&mut self) {
        self.desired.store(false, Ordering::SeqCst);
    }

    pub fn is_desired(&self) -> bool {
        self.desired.load(Ordering::SeqCst)
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// The underlying session ended without an explicit stop.
    pub fn on_session_end(&mut self) -> EndDisposition {
        if !self.is_desired() {
            return EndDisposition::Ignore;
        }
        if self.restart_count >= self.max_restarts {
            warn!(
                max_restarts = self.max_restarts,
                "capture restart budget exhausted"
            );
            self.stand_down();
            return EndDisposition::Exhausted;
        }
        self.restart_count += 1;
        debug!(attempt = self.restart_count, "capture session ended, reviving");
        EndDisposition::Restart {
            attempt: self.restart_count,
        }
    }

    /// Classify an engine error. Permission denial disables voice mode on
    /// the spot; everything else is a normal pause and the end handler takes
    /// care of any revival.
    pub fn classify_error(&mut self, kind: &CaptureErrorKind) -> ErrorDisposition {
        match kind {
            CaptureErrorKind::PermissionDenied => {
                self.stand_down();
                ErrorDisposition::Fatal(FatalReason::PermissionDenied)
            }
            CaptureErrorKind::NoSpeech
            | CaptureErrorKind::AudioCapture
            | CaptureErrorKind::Other(_) => ErrorDisposition::Transient,
        }
    }
}
