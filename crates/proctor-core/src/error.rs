//! Error taxonomy for the session engine.
//!
//! Every failure a caller must branch on is a typed, representable value:
//! guard violations never leave a session in an undefined phase, and
//! dispatch/observation failures carry enough context to retry.

use thiserror::Error;

use crate::model::{EvaluationStatus, Phase};

/// Response-bounds violations, checked only at the review transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("response must be at least {min} words (currently {actual})")]
    TooShort { min: usize, actual: usize },

    #[error("response must be at most {max} words (currently {actual})")]
    TooLong { max: usize, actual: usize },
}

/// Phase-guard violations of the session state machine.
///
/// A rejected transition always leaves the prior phase intact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while in {phase} phase")]
    InvalidPhase { phase: Phase, action: &'static str },

    #[error("choice index {index} out of range ({available} options)")]
    InvalidChoice { index: usize, available: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failures of the submission dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The durable store rejected or timed out the save.
    #[error("failed to persist submission: {0}")]
    PersistenceFailed(String),

    /// The submission is safely persisted but the evaluation request was
    /// not accepted; re-dispatching re-enqueues without a duplicate record.
    #[error("failed to enqueue evaluation: {0}")]
    EnqueueFailed(String),

    /// Dispatch was invoked before the session reached review.
    #[error("session is in {0} phase, nothing to dispatch")]
    NotReviewable(Phase),
}

impl DispatchError {
    /// Returns `true` if re-invoking `dispatch` with the same session is a
    /// sensible recovery.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            DispatchError::PersistenceFailed(_) | DispatchError::EnqueueFailed(_)
        )
    }
}

/// Failures while observing an evaluation's status stream.
#[derive(Debug, Error)]
pub enum ObservationError {
    /// The backend emitted a value outside the known lifecycle.
    #[error("unrecognized evaluation status {0:?} from backend")]
    UnknownStatus(String),

    /// The backend emitted a status earlier than one already seen.
    #[error("evaluation status regressed from {from} to {to}")]
    ProtocolViolation {
        from: EvaluationStatus,
        to: EvaluationStatus,
    },

    /// Status reached Completed but the report payload could not be read;
    /// the fetch alone can be retried without re-running evaluation.
    #[error("evaluation completed but the report could not be fetched: {0}")]
    ResultFetchFailed(String),

    /// The status stream closed before a terminal status was seen.
    #[error("status stream ended before evaluation reached a terminal state")]
    StreamEnded,
}

/// Failures of the durable store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
}
