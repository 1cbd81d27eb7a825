//! # Reconcile Outcome
//!
//! What a reconciler returns to the engine when it did not fail outright.

use std::time::Duration;

/// When the engine should invoke the reconciler again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    Immediately,
    After(Duration),
    /// Terminal: only a change to the resource triggers another reconcile
    Never,
}

/// Result of one reconcile step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Desired state reached
    Done,
    /// Not there yet
    NotReady {
        reason: &'static str,
        message: Option<String>,
        requeue: Requeue,
    },
}

impl ReconcileOutcome {
    pub fn requeue_after(reason: &'static str, after: Duration) -> Self {
        Self::NotReady {
            reason,
            message: None,
            requeue: Requeue::After(after),
        }
    }

    pub fn requeue_now(reason: &'static str) -> Self {
        Self::NotReady {
            reason,
            message: None,
            requeue: Requeue::Immediately,
        }
    }

    pub fn no_requeue(reason: &'static str, message: Option<String>) -> Self {
        Self::NotReady {
            reason,
            message,
            requeue: Requeue::Never,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Done => None,
            Self::NotReady { reason, .. } => Some(reason),
        }
    }

    pub fn requeue(&self) -> Option<Requeue> {
        match self {
            Self::Done => None,
            Self::NotReady { requeue, .. } => Some(*requeue),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
