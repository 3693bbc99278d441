//! The caller-facing session engine.
//!
//! Wires the eligibility gate, state machine, timing controller,
//! dispatcher, and result observer together behind the surface UI layers
//! consume: start a session, drive its phases, submit, observe the result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dispatch::SubmissionDispatcher;
use crate::error::{DispatchError, SessionError, StoreError};
use crate::gate::{EligibilityGate, EligibilityOutcome, SequenceProgress};
use crate::model::{EntitlementTier, Phase, Submission, TestKind};
use crate::observer::{ObservationStream, ResultObserver};
use crate::session::{AdvanceTrigger, Effect, Session};
use crate::timer::{TimerEvent, TimingController};
use crate::traits::{AccountService, EvaluationQueue, SubmissionStore, TopicSource};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionEngineConfig {
    /// Bound on gate, topic, store, and queue calls. The result observer
    /// is deliberately unbounded.
    pub call_timeout: Duration,
    /// Countdown tick period; production is one second.
    pub tick_period: Duration,
}

impl Default for SessionEngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            tick_period: Duration::from_secs(1),
        }
    }
}

/// Outcome of a start request. No session object exists on refusal.
pub enum StartOutcome {
    Started(ActiveSession),
    Refused(EligibilityOutcome),
}

/// Update posted back to the caller's context by the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    Tick { remaining: u32 },
    /// The timer expired and the session auto-advanced to review.
    AutoAdvanced,
}

/// The reusable per-test-kind session engine.
pub struct SessionEngine {
    topics: Arc<dyn TopicSource>,
    store: Arc<dyn SubmissionStore>,
    gate: EligibilityGate,
    dispatcher: Arc<SubmissionDispatcher>,
    observer: ResultObserver,
    config: SessionEngineConfig,
}

impl SessionEngine {
    pub fn new(
        topics: Arc<dyn TopicSource>,
        accounts: Arc<dyn AccountService>,
        store: Arc<dyn SubmissionStore>,
        queue: Arc<dyn EvaluationQueue>,
        config: SessionEngineConfig,
    ) -> Self {
        let gate = EligibilityGate::new(Arc::clone(&accounts), config.call_timeout);
        let dispatcher = Arc::new(SubmissionDispatcher::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            accounts,
            config.call_timeout,
        ));
        let observer = ResultObserver::new(Arc::clone(&store), queue);
        Self {
            topics,
            store,
            gate,
            dispatcher,
            observer,
            config,
        }
    }

    /// Check eligibility and, if allowed, create a session with a fixed
    /// choice set. A refusal returns the gate's outcome without creating
    /// any session state.
    pub async fn start_session(
        &self,
        kind: TestKind,
        user_id: &str,
    ) -> anyhow::Result<StartOutcome> {
        let outcome = self.gate.check(kind, user_id).await;
        let EligibilityOutcome::Eligible { user_id, tier } = outcome else {
            tracing::info!(%kind, "session start refused");
            return Ok(StartOutcome::Refused(outcome));
        };

        let count = kind.params().choice_count;
        let choices = tokio::time::timeout(
            self.config.call_timeout,
            self.topics.fetch_choices(kind, count),
        )
        .await
        .context("topic fetch timed out")?
        .context("failed to fetch topic choices")?;
        anyhow::ensure!(!choices.is_empty(), "topic source returned no choices");

        let session = Session::new(user_id, kind, choices);
        tracing::info!(session_id = %session.session_id(), %kind, "session started");
        Ok(StartOutcome::Started(ActiveSession {
            session,
            tier,
            timer: TimingController::with_tick_period(self.config.tick_period),
            events: None,
            dispatcher: Arc::clone(&self.dispatcher),
        }))
    }

    /// Re-check eligibility without starting anything, e.g. for list
    /// screens that grey out locked tests.
    pub async fn check_eligibility(&self, kind: TestKind, user_id: &str) -> EligibilityOutcome {
        self.gate.check(kind, user_id).await
    }

    /// Progress through the sequential test chain.
    pub async fn progress(&self, user_id: &str) -> anyhow::Result<SequenceProgress> {
        self.gate.progress(user_id).await
    }

    /// Observe an evaluation's lifecycle. Independent of any live session;
    /// callable again after leaving and re-entering a result screen.
    pub async fn observe_result(&self, submission_id: Uuid) -> anyhow::Result<ObservationStream> {
        self.observer.observe(submission_id).await
    }

    /// Retry the report fetch alone after a `ResultFetchFailed`.
    pub async fn fetch_report(
        &self,
        submission_id: Uuid,
    ) -> Result<crate::model::EvaluationReport, crate::error::ObservationError> {
        self.observer.fetch_report(submission_id).await
    }

    /// Load a dispatched submission for display.
    pub async fn load_submission(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<Submission>, StoreError> {
        self.store.load_submission(submission_id).await
    }
}

/// A live session owned by one caller context.
///
/// The countdown runs as an independent task and posts events back here;
/// only this type's methods mutate the underlying session, so two phases
/// can never race on it.
pub struct ActiveSession {
    session: Session,
    tier: EntitlementTier,
    timer: TimingController,
    events: Option<mpsc::Receiver<TimerEvent>>,
    dispatcher: Arc<SubmissionDispatcher>,
}

impl ActiveSession {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tier(&self) -> EntitlementTier {
        self.tier
    }

    /// `Instructions → Selection`.
    pub fn begin_selection(&mut self) -> Result<(), SessionError> {
        let effects = self.session.begin_selection()?;
        self.apply(effects);
        Ok(())
    }

    /// `Selection → TimedCapture`; arms the countdown.
    pub fn select_choice(&mut self, index: usize) -> Result<(), SessionError> {
        let effects = self.session.select_choice(index)?;
        self.apply(effects);
        Ok(())
    }

    pub fn update_response(&mut self, text: &str) -> Result<(), SessionError> {
        self.session.update_response(text)
    }

    /// Manual `TimedCapture → Review`; enforces response bounds.
    pub fn advance(&mut self) -> Result<Phase, SessionError> {
        let effects = self.session.advance(AdvanceTrigger::Manual)?;
        self.apply(effects);
        Ok(self.session.phase())
    }

    /// `Review → TimedCapture`; the countdown resumes from where it was.
    pub fn resume_capture(&mut self) -> Result<(), SessionError> {
        let effects = self.session.resume_capture()?;
        self.apply(effects);
        Ok(())
    }

    /// Dispatch the session. On success the phase becomes Submitted; on
    /// failure it stays in Review and `submit` may simply be called again.
    pub async fn submit(&mut self) -> Result<Uuid, DispatchError> {
        let submission_id = self.dispatcher.dispatch(&self.session).await?;
        if self.session.phase() == Phase::Review {
            match self.session.mark_submitted(submission_id) {
                Ok(effects) => self.apply(effects),
                Err(e) => tracing::error!(error = %e, "submitted session refused the mark"),
            }
        }
        Ok(submission_id)
    }

    /// Await the next countdown update on the caller's context.
    ///
    /// Ticks fold into the session's remaining time; expiry performs the
    /// forced advance to review right here, never on the timer task.
    /// Returns `None` when no countdown is armed.
    pub async fn next_signal(&mut self) -> Option<SessionSignal> {
        let events = self.events.as_mut()?;
        match events.recv().await? {
            TimerEvent::Tick(remaining) => {
                self.session.record_tick(remaining);
                Some(SessionSignal::Tick { remaining })
            }
            TimerEvent::Expired => match self.session.advance(AdvanceTrigger::TimerExpired) {
                Ok(effects) => {
                    self.apply(effects);
                    self.events = None;
                    Some(SessionSignal::AutoAdvanced)
                }
                // The session already left capture; a stale expiry is moot.
                Err(_) => None,
            },
        }
    }

    /// Abandon the session: the countdown stops immediately, but an
    /// already-dispatched evaluation keeps running independently.
    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.events = None;
        tracing::info!(session_id = %self.session.session_id(), "session cancelled");
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ArmTimer { seconds } => {
                    self.events = Some(self.timer.arm(seconds));
                }
                Effect::CancelTimer => {
                    self.timer.cancel();
                    self.events = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use crate::error::ValidationError;
    use crate::model::{EvaluationReport, Submission};
    use crate::traits::{QuotaSnapshot, RawStatusStream};

    struct FixedTopics;

    #[async_trait]
    impl TopicSource for FixedTopics {
        async fn fetch_choices(&self, _kind: TestKind, count: usize) -> anyhow::Result<Vec<String>> {
            Ok((1..=count).map(|i| format!("Topic {i}")).collect())
        }
    }

    struct FixedAccounts {
        quota: QuotaSnapshot,
    }

    impl FixedAccounts {
        fn eligible() -> Arc<Self> {
            Arc::new(Self {
                quota: QuotaSnapshot {
                    tier: EntitlementTier::Pro,
                    used: 0,
                    limit: None,
                },
            })
        }

        fn exhausted() -> Arc<Self> {
            Arc::new(Self {
                quota: QuotaSnapshot {
                    tier: EntitlementTier::Free,
                    used: 3,
                    limit: Some(3),
                },
            })
        }
    }

    #[async_trait]
    impl AccountService for FixedAccounts {
        async fn quota(&self, _user_id: &str, _kind: TestKind) -> anyhow::Result<QuotaSnapshot> {
            Ok(self.quota)
        }

        async fn completed(&self, _user_id: &str) -> anyhow::Result<Vec<TestKind>> {
            Ok(TestKind::SEQUENCE.to_vec())
        }

        async fn record_usage(
            &self,
            _user_id: &str,
            _kind: TestKind,
            _submission_id: Uuid,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn record_completion(&self, _user_id: &str, _kind: TestKind) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MapStore {
        submissions: Mutex<HashMap<Uuid, Submission>>,
    }

    #[async_trait]
    impl SubmissionStore for MapStore {
        async fn save_submission(&self, submission: &Submission) -> Result<(), StoreError> {
            self.submissions
                .lock()
                .unwrap()
                .insert(submission.submission_id, submission.clone());
            Ok(())
        }

        async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
            Ok(self.submissions.lock().unwrap().get(&id).cloned())
        }

        async fn save_report(&self, _report: &EvaluationReport) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_report(&self, _id: Uuid) -> Result<Option<EvaluationReport>, StoreError> {
            Ok(None)
        }
    }

    struct NullQueue;

    #[async_trait]
    impl EvaluationQueue for NullQueue {
        async fn enqueue(&self, _submission_id: Uuid) -> anyhow::Result<()> {
            Ok(())
        }

        async fn subscribe(&self, _submission_id: Uuid) -> anyhow::Result<RawStatusStream> {
            Ok(Box::pin(stream::empty()))
        }
    }

    fn engine_with(accounts: Arc<FixedAccounts>) -> SessionEngine {
        SessionEngine::new(
            Arc::new(FixedTopics),
            accounts,
            Arc::new(MapStore::default()),
            Arc::new(NullQueue),
            SessionEngineConfig::default(),
        )
    }

    async fn started(engine: &SessionEngine) -> ActiveSession {
        match engine
            .start_session(TestKind::Lecturette, "user-1")
            .await
            .unwrap()
        {
            StartOutcome::Started(active) => active,
            StartOutcome::Refused(outcome) => panic!("unexpected refusal: {outcome:?}"),
        }
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[tokio::test]
    async fn quota_refusal_creates_no_session() {
        let engine = engine_with(FixedAccounts::exhausted());
        match engine
            .start_session(TestKind::Lecturette, "user-1")
            .await
            .unwrap()
        {
            StartOutcome::Refused(EligibilityOutcome::QuotaExceeded(_)) => {}
            StartOutcome::Refused(other) => panic!("wrong refusal: {other:?}"),
            StartOutcome::Started(_) => panic!("session should not start"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn manual_path_submits_and_retires_the_session() {
        let engine = engine_with(FixedAccounts::eligible());
        let mut active = started(&engine).await;
        assert_eq!(active.session().choices().len(), 4);

        active.begin_selection().unwrap();
        active.select_choice(0).unwrap();
        assert!(active.timer_armed());

        active.update_response(&words(120)).unwrap();
        assert_eq!(active.advance().unwrap(), Phase::Review);
        assert!(!active.timer_armed());

        let submission_id = active.submit().await.unwrap();
        assert_eq!(active.session().phase(), Phase::Submitted);
        assert_eq!(active.session().submission_id(), Some(submission_id));

        let stored = engine.load_submission(submission_id).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_auto_advances_despite_short_response() {
        let engine = engine_with(FixedAccounts::eligible());
        let mut active = started(&engine).await;
        active.begin_selection().unwrap();
        active.select_choice(0).unwrap();
        active.update_response(&words(10)).unwrap();

        loop {
            match active.next_signal().await {
                Some(SessionSignal::Tick { .. }) => continue,
                Some(SessionSignal::AutoAdvanced) => break,
                None => panic!("timer vanished before expiry"),
            }
        }

        assert_eq!(active.session().phase(), Phase::Review);
        assert_eq!(active.session().remaining_seconds(), 0);

        // Undersized response still submits; evaluation scores it.
        let submission_id = active.submit().await.unwrap();
        let stored = engine
            .load_submission(submission_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metric.word_count, 10);
        assert_eq!(stored.elapsed_seconds, 180);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_advance_below_minimum_keeps_capturing() {
        let engine = engine_with(FixedAccounts::eligible());
        let mut active = started(&engine).await;
        active.begin_selection().unwrap();
        active.select_choice(0).unwrap();
        active.update_response(&words(10)).unwrap();

        let err = active.advance().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::TooShort { .. })
        ));
        assert_eq!(active.session().phase(), Phase::TimedCapture);
        assert!(active.timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_rearms_with_remaining_time() {
        let engine = engine_with(FixedAccounts::eligible());
        let mut active = started(&engine).await;
        active.begin_selection().unwrap();
        active.select_choice(0).unwrap();

        // Let some time burn before reviewing.
        for _ in 0..30 {
            active.next_signal().await;
        }
        active.update_response(&words(120)).unwrap();
        active.advance().unwrap();
        assert_eq!(active.session().remaining_seconds(), 150);

        active.resume_capture().unwrap();
        assert!(active.timer_armed());
        match active.next_signal().await {
            Some(SessionSignal::Tick { remaining }) => assert_eq!(remaining, 149),
            other => panic!("expected a tick, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_countdown() {
        let engine = engine_with(FixedAccounts::eligible());
        let mut active = started(&engine).await;
        active.begin_selection().unwrap();
        active.select_choice(0).unwrap();

        active.cancel();
        assert!(!active.timer_armed());
        assert!(active.next_signal().await.is_none());
    }
}
