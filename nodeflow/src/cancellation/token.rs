//! Stop signal polled by [`PipelineExecutor`](crate::executor::PipelineExecutor).
//!
//! A caller shares one token with a running pipeline and flips it from any
//! thread or task. The executor looks at it before each step starts; once it
//! reads as cancelled the run ends with `EXECUTION_CANCELLED`, carrying the
//! reason given here, and no later step is invoked.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop flag for one or more pipeline runs.
///
/// A step that is already awaiting its runner is not interrupted; the
/// boundary check after it ends the run. The first reason
/// passed to [`cancel`](Self::cancel) is the one reported.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every run holding this token to stop at its next step boundary.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.reason.write();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        // Published after the reason so a run that sees the flag also sees it.
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the executor should stop before its next step.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The reason reported in the `EXECUTION_CANCELLED` error.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
