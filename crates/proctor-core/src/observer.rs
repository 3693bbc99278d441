//! Observes an external evaluation until it reaches a terminal state.
//!
//! The observer subscribes to the queue's raw status emissions and maps
//! them onto the closed [`EvaluationStatus`] lifecycle: duplicates are
//! collapsed, regressions are surfaced as protocol violations instead of
//! being re-accepted, and unknown backend values are a distinct error.
//! Dropping the stream stops observation only; the evaluation job itself
//! is independently owned and unaffected.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, Stream, StreamExt};
use uuid::Uuid;

use crate::error::ObservationError;
use crate::model::{EvaluationReport, EvaluationStatus};
use crate::traits::{EvaluationQueue, RawStatusStream, SubmissionStore};

/// One emission of the observation stream.
#[derive(Debug, Clone)]
pub enum Observation {
    /// The evaluation entered a new lifecycle state.
    Status(EvaluationStatus),
    /// The scoring payload, fetched exactly once after Completed.
    Report(EvaluationReport),
}

/// Lazy sequence of observations, terminating after Completed (and its
/// report fetch) or Failed.
pub type ObservationStream = Pin<Box<dyn Stream<Item = Result<Observation, ObservationError>> + Send>>;

/// Watches evaluation lifecycles on behalf of result screens.
pub struct ResultObserver {
    store: Arc<dyn SubmissionStore>,
    queue: Arc<dyn EvaluationQueue>,
}

struct ObserveState {
    submission_id: Uuid,
    raw: RawStatusStream,
    store: Arc<dyn SubmissionStore>,
    last: Option<EvaluationStatus>,
    pending: VecDeque<Result<Observation, ObservationError>>,
    done: bool,
}

impl ResultObserver {
    pub fn new(store: Arc<dyn SubmissionStore>, queue: Arc<dyn EvaluationQueue>) -> Self {
        Self { store, queue }
    }

    /// Subscribe to status transitions for a submission.
    ///
    /// Restartable: re-subscribing resumes from the backend's current
    /// state, not from Queued. The stream has no timeout by design;
    /// evaluation may legitimately take unbounded time and the caller
    /// decides how long to keep observing.
    pub async fn observe(&self, submission_id: Uuid) -> anyhow::Result<ObservationStream> {
        let raw = self.queue.subscribe(submission_id).await?;
        let state = ObserveState {
            submission_id,
            raw,
            store: Arc::clone(&self.store),
            last: None,
            pending: VecDeque::new(),
            done: false,
        };

        Ok(Box::pin(stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.pending.pop_front() {
                    return Some((item, st));
                }
                if st.done {
                    return None;
                }
                let Some(raw_status) = st.raw.next().await else {
                    st.done = true;
                    if !st.last.is_some_and(|s| s.is_terminal()) {
                        st.pending.push_back(Err(ObservationError::StreamEnded));
                    }
                    continue;
                };
                let status = match raw_status.parse::<EvaluationStatus>() {
                    Ok(status) => status,
                    Err(_) => {
                        tracing::warn!(
                            submission_id = %st.submission_id,
                            raw = %raw_status,
                            "unrecognized status from evaluation backend"
                        );
                        st.pending
                            .push_back(Err(ObservationError::UnknownStatus(raw_status)));
                        continue;
                    }
                };

                // Collapse duplicates; this is a transition stream.
                if st.last == Some(status) {
                    continue;
                }
                if let Some(prev) = st.last {
                    if status.rank() < prev.rank() {
                        tracing::warn!(
                            submission_id = %st.submission_id,
                            %prev,
                            %status,
                            "evaluation status regressed; keeping last valid state"
                        );
                        st.pending.push_back(Err(ObservationError::ProtocolViolation {
                            from: prev,
                            to: status,
                        }));
                        continue;
                    }
                }

                st.last = Some(status);
                st.pending.push_back(Ok(Observation::Status(status)));

                match status {
                    EvaluationStatus::Completed => {
                        let item = match st.store.load_report(st.submission_id).await {
                            Ok(Some(report)) => Ok(Observation::Report(report)),
                            Ok(None) => Err(ObservationError::ResultFetchFailed(
                                "report not available despite completed status".into(),
                            )),
                            Err(e) => Err(ObservationError::ResultFetchFailed(e.to_string())),
                        };
                        st.pending.push_back(item);
                        st.done = true;
                    }
                    EvaluationStatus::Failed => st.done = true,
                    _ => {}
                }
            }
        })))
    }

    /// Fetch the report payload alone, e.g. to retry after a
    /// `ResultFetchFailed` without re-running evaluation.
    pub async fn fetch_report(
        &self,
        submission_id: Uuid,
    ) -> Result<EvaluationReport, ObservationError> {
        match self.store.load_report(submission_id).await {
            Ok(Some(report)) => Ok(report),
            Ok(None) => Err(ObservationError::ResultFetchFailed(
                "report not available yet".into(),
            )),
            Err(e) => Err(ObservationError::ResultFetchFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::error::StoreError;
    use crate::model::Submission;

    struct ScriptedQueue {
        statuses: Mutex<Vec<String>>,
    }

    impl ScriptedQueue {
        fn emitting(statuses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl EvaluationQueue for ScriptedQueue {
        async fn enqueue(&self, _submission_id: Uuid) -> anyhow::Result<()> {
            Ok(())
        }

        async fn subscribe(&self, _submission_id: Uuid) -> anyhow::Result<RawStatusStream> {
            let statuses = self.statuses.lock().unwrap().clone();
            Ok(Box::pin(stream::iter(statuses)))
        }
    }

    struct ReportStore {
        report: Option<EvaluationReport>,
        fail: bool,
    }

    impl ReportStore {
        fn with_report(submission_id: Uuid) -> Arc<Self> {
            Arc::new(Self {
                report: Some(EvaluationReport {
                    submission_id,
                    scores: serde_json::json!({"overall": 7}),
                    summary: Some("solid".into()),
                    computed_at: Utc::now(),
                }),
                fail: false,
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self {
                report: None,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                report: None,
                fail: true,
            })
        }
    }

    #[async_trait]
    impl SubmissionStore for ReportStore {
        async fn save_submission(&self, _submission: &Submission) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_submission(&self, _id: Uuid) -> Result<Option<Submission>, StoreError> {
            Ok(None)
        }

        async fn save_report(&self, _report: &EvaluationReport) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_report(&self, _id: Uuid) -> Result<Option<EvaluationReport>, StoreError> {
            if self.fail {
                return Err(StoreError::Unavailable("store offline".into()));
            }
            Ok(self.report.clone())
        }
    }

    async fn collect(
        store: Arc<ReportStore>,
        queue: Arc<ScriptedQueue>,
        submission_id: Uuid,
    ) -> Vec<Result<Observation, ObservationError>> {
        let observer = ResultObserver::new(store, queue);
        let stream = observer.observe(submission_id).await.unwrap();
        stream.collect().await
    }

    fn statuses(items: &[Result<Observation, ObservationError>]) -> Vec<EvaluationStatus> {
        items
            .iter()
            .filter_map(|item| match item {
                Ok(Observation::Status(status)) => Some(*status),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn completed_lifecycle_yields_report_and_terminates() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::with_report(id),
            ScriptedQueue::emitting(&["queued", "in_progress", "completed"]),
            id,
        )
        .await;

        assert_eq!(
            statuses(&items),
            vec![
                EvaluationStatus::Queued,
                EvaluationStatus::InProgress,
                EvaluationStatus::Completed,
            ]
        );
        assert!(matches!(
            items.last(),
            Some(Ok(Observation::Report(report))) if report.submission_id == id
        ));
        assert_eq!(items.len(), 4);
    }

    #[tokio::test]
    async fn failed_is_terminal_without_report_fetch() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::empty(),
            ScriptedQueue::emitting(&["queued", "in_progress", "failed"]),
            id,
        )
        .await;

        assert_eq!(
            statuses(&items),
            vec![
                EvaluationStatus::Queued,
                EvaluationStatus::InProgress,
                EvaluationStatus::Failed,
            ]
        );
        // Terminal Failed; no report item, no fetch error.
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_statuses_collapse() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::empty(),
            ScriptedQueue::emitting(&["queued", "queued", "in_progress", "in_progress", "failed"]),
            id,
        )
        .await;
        assert_eq!(
            statuses(&items),
            vec![
                EvaluationStatus::Queued,
                EvaluationStatus::InProgress,
                EvaluationStatus::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn resubscription_resumes_from_current_state() {
        let id = Uuid::new_v4();
        // Backend already past the early states; the stream starts where
        // the evaluation actually is.
        let items = collect(
            ReportStore::with_report(id),
            ScriptedQueue::emitting(&["completed"]),
            id,
        )
        .await;
        assert_eq!(statuses(&items), vec![EvaluationStatus::Completed]);
        assert!(matches!(items.last(), Some(Ok(Observation::Report(_)))));
    }

    #[tokio::test]
    async fn regression_is_a_protocol_violation_not_a_new_state() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::with_report(id),
            ScriptedQueue::emitting(&["in_progress", "queued", "completed"]),
            id,
        )
        .await;

        assert!(items.iter().any(|item| matches!(
            item,
            Err(ObservationError::ProtocolViolation {
                from: EvaluationStatus::InProgress,
                to: EvaluationStatus::Queued,
            })
        )));
        // The regressed value is never re-emitted as a status.
        assert_eq!(
            statuses(&items),
            vec![EvaluationStatus::InProgress, EvaluationStatus::Completed]
        );
    }

    #[tokio::test]
    async fn unknown_status_is_surfaced_and_skipped() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::empty(),
            ScriptedQueue::emitting(&["queued", "archived", "failed"]),
            id,
        )
        .await;

        assert!(items.iter().any(|item| matches!(
            item,
            Err(ObservationError::UnknownStatus(raw)) if raw == "archived"
        )));
        assert_eq!(
            statuses(&items),
            vec![EvaluationStatus::Queued, EvaluationStatus::Failed]
        );
    }

    #[tokio::test]
    async fn missing_report_after_completed_is_fetch_failure() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::empty(),
            ScriptedQueue::emitting(&["completed"]),
            id,
        )
        .await;

        assert!(matches!(
            items.last(),
            Some(Err(ObservationError::ResultFetchFailed(_)))
        ));

        // The fetch alone is retriable without re-observing.
        let observer = ResultObserver::new(
            ReportStore::with_report(id),
            ScriptedQueue::emitting(&[]),
        );
        let report = observer.fetch_report(id).await.unwrap();
        assert_eq!(report.submission_id, id);
    }

    #[tokio::test]
    async fn store_failure_during_report_fetch_is_distinct() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::failing(),
            ScriptedQueue::emitting(&["completed"]),
            id,
        )
        .await;
        assert!(matches!(
            items.last(),
            Some(Err(ObservationError::ResultFetchFailed(reason))) if reason.contains("offline")
        ));
    }

    #[tokio::test]
    async fn premature_stream_end_is_reported() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::empty(),
            ScriptedQueue::emitting(&["queued", "in_progress"]),
            id,
        )
        .await;
        assert!(matches!(
            items.last(),
            Some(Err(ObservationError::StreamEnded))
        ));
    }

    #[tokio::test]
    async fn exactly_one_terminal_status_per_stream() {
        let id = Uuid::new_v4();
        let items = collect(
            ReportStore::with_report(id),
            ScriptedQueue::emitting(&["queued", "in_progress", "completed", "failed", "queued"]),
            id,
        )
        .await;
        let terminal: Vec<EvaluationStatus> = statuses(&items)
            .into_iter()
            .filter(EvaluationStatus::is_terminal)
            .collect();
        assert_eq!(terminal, vec![EvaluationStatus::Completed]);
    }
}
