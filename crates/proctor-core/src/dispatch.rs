//! Freezes a session into an immutable submission and hands it to the
//! evaluation pipeline.
//!
//! The submission id is derived deterministically from the session id, so
//! retrying after a partial failure addresses the same record: a persisted
//! submission whose enqueue failed is re-enqueued, never re-created.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::model::{Phase, Submission};
use crate::session::Session;
use crate::traits::{AccountService, EvaluationQueue, SubmissionStore};

/// Packages and dispatches completed sessions, exactly once per session.
pub struct SubmissionDispatcher {
    store: Arc<dyn SubmissionStore>,
    queue: Arc<dyn EvaluationQueue>,
    accounts: Arc<dyn AccountService>,
    call_timeout: Duration,
}

impl SubmissionDispatcher {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        queue: Arc<dyn EvaluationQueue>,
        accounts: Arc<dyn AccountService>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            accounts,
            call_timeout,
        }
    }

    /// Persist the session snapshot and enqueue its evaluation.
    ///
    /// Idempotent by submission id: the same session always yields the same
    /// id, an already-persisted record is not saved again, and the queue
    /// accepts repeated enqueues for one id without duplicating the job.
    /// Both failure kinds are retriable by calling `dispatch` again.
    pub async fn dispatch(&self, session: &Session) -> Result<Uuid, DispatchError> {
        if !matches!(session.phase(), Phase::Review | Phase::Submitted) {
            return Err(DispatchError::NotReviewable(session.phase()));
        }
        let Some(selection) = session.selection() else {
            return Err(DispatchError::NotReviewable(session.phase()));
        };

        let submission_id = Submission::derived_id(session.session_id());

        let existing = tokio::time::timeout(
            self.call_timeout,
            self.store.load_submission(submission_id),
        )
        .await
        .map_err(|_| DispatchError::PersistenceFailed(self.timeout_reason()))?
        .map_err(|e| DispatchError::PersistenceFailed(e.to_string()))?;

        match existing {
            Some(_) => {
                tracing::debug!(%submission_id, "submission already persisted, re-enqueueing only");
            }
            None => {
                let submission = Submission {
                    submission_id,
                    session_id: session.session_id(),
                    user_id: session.user_id().to_string(),
                    test_kind: session.test_kind(),
                    choices: session.choices().to_vec(),
                    selection: selection.to_string(),
                    response_text: session.response_text().to_string(),
                    metric: session.metric(),
                    submitted_at: Utc::now(),
                    elapsed_seconds: session.elapsed_capture_seconds(),
                };
                tokio::time::timeout(self.call_timeout, self.store.save_submission(&submission))
                    .await
                    .map_err(|_| DispatchError::PersistenceFailed(self.timeout_reason()))?
                    .map_err(|e| DispatchError::PersistenceFailed(e.to_string()))?;
                tracing::info!(%submission_id, session_id = %session.session_id(), "submission persisted");
            }
        }

        tokio::time::timeout(self.call_timeout, self.queue.enqueue(submission_id))
            .await
            .map_err(|_| DispatchError::EnqueueFailed(self.timeout_reason()))?
            .map_err(|e| DispatchError::EnqueueFailed(format!("{e:#}")))?;
        tracing::info!(%submission_id, "evaluation enqueued");

        // Usage and sequence recordings are at-least-once bookkeeping; the
        // submission itself is safe, so failures here are logged only.
        if let Err(e) = self
            .accounts
            .record_usage(session.user_id(), session.test_kind(), submission_id)
            .await
        {
            tracing::warn!(%submission_id, error = %e, "failed to record test usage");
        }
        if let Err(e) = self
            .accounts
            .record_completion(session.user_id(), session.test_kind())
            .await
        {
            tracing::warn!(%submission_id, error = %e, "failed to record sequence completion");
        }

        Ok(submission_id)
    }

    fn timeout_reason(&self) -> String {
        format!("timed out after {}s", self.call_timeout.as_secs())
    }
}
