//! In-process backend for tests, demos, and offline runs.
//!
//! Implements every collaborator trait without IO. The queue carries its
//! own evaluation worker: enqueue spawns a task that walks the submission
//! through `queued → in_progress → completed|failed`, writing the report
//! into the shared store before flipping to completed. Status fan-out uses
//! a watch channel, so late subscribers resume from the current state
//! rather than replaying from the beginning.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use tokio::sync::watch;
use uuid::Uuid;

use proctor_core::error::StoreError;
use proctor_core::model::{
    EntitlementTier, EvaluationReport, Submission, TestKind,
};
use proctor_core::traits::{
    AccountService, EvaluationQueue, QuotaSnapshot, RawStatusStream, SubmissionStore, TopicSource,
};

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// Fixed topic banks keyed by test kind.
///
/// The same leading slice is returned for every fetch, so a session's
/// choice set never reshuffles underneath it.
#[derive(Default)]
pub struct StaticTopics {
    banks: HashMap<TestKind, Vec<String>>,
}

impl StaticTopics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in banks, enough for one session of each kind.
    pub fn defaults() -> Self {
        let mut topics = Self::new();
        topics.set_bank(
            TestKind::GroupDiscussion,
            [
                "Social media does more harm than good to public discourse",
                "Should space exploration be funded over social programs",
                "Artificial intelligence will create more jobs than it destroys",
                "Universal basic income is the answer to automation",
            ],
        );
        topics.set_bank(
            TestKind::GroupPlanning,
            [
                "A flash flood has cut off three villages from the district hospital",
                "A chemical tanker has overturned near a crowded weekly market",
                "A forest fire is advancing on a hillside school during exams",
                "A bridge collapse has stranded two buses across a gorge",
            ],
        );
        topics.set_bank(
            TestKind::Lecturette,
            [
                "Leadership in the digital age",
                "Climate change and national security",
                "The role of discipline in success",
                "Self-reliance in defence manufacturing",
            ],
        );
        topics
    }

    pub fn set_bank(
        &mut self,
        kind: TestKind,
        topics: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.banks
            .insert(kind, topics.into_iter().map(Into::into).collect());
    }
}

#[async_trait]
impl TopicSource for StaticTopics {
    async fn fetch_choices(&self, kind: TestKind, count: usize) -> anyhow::Result<Vec<String>> {
        let bank = self
            .banks
            .get(&kind)
            .ok_or_else(|| anyhow::anyhow!("no topic bank for {kind}"))?;
        anyhow::ensure!(!bank.is_empty(), "topic bank for {kind} is empty");
        Ok(bank.iter().take(count).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// In-memory account state: tier, per-kind usage, sequence completions.
///
/// Usage is keyed by submission id, which makes `record_usage` naturally
/// idempotent under the dispatcher's at-least-once delivery.
pub struct MemoryAccounts {
    tier: EntitlementTier,
    limit: Option<u32>,
    usage: Mutex<HashMap<(String, TestKind), HashSet<Uuid>>>,
    completed: Mutex<HashMap<String, HashSet<TestKind>>>,
}

impl MemoryAccounts {
    /// Free tier with a per-kind attempt allowance.
    pub fn free(limit: u32) -> Self {
        Self {
            tier: EntitlementTier::Free,
            limit: Some(limit),
            usage: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Pro tier, unlimited attempts.
    pub fn pro() -> Self {
        Self {
            tier: EntitlementTier::Pro,
            limit: None,
            usage: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-mark kinds as completed, e.g. to unlock later sequence entries.
    pub fn grant_completed(&self, user_id: &str, kinds: impl IntoIterator<Item = TestKind>) {
        let mut completed = self.completed.lock().expect("accounts state poisoned");
        completed
            .entry(user_id.to_string())
            .or_default()
            .extend(kinds);
    }

    pub fn usage_count(&self, user_id: &str, kind: TestKind) -> u32 {
        let usage = self.usage.lock().expect("accounts state poisoned");
        usage
            .get(&(user_id.to_string(), kind))
            .map_or(0, |set| set.len() as u32)
    }
}

#[async_trait]
impl AccountService for MemoryAccounts {
    async fn quota(&self, user_id: &str, kind: TestKind) -> anyhow::Result<QuotaSnapshot> {
        Ok(QuotaSnapshot {
            tier: self.tier,
            used: self.usage_count(user_id, kind),
            limit: self.limit,
        })
    }

    async fn completed(&self, user_id: &str) -> anyhow::Result<Vec<TestKind>> {
        let completed = self.completed.lock().expect("accounts state poisoned");
        Ok(completed
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn record_usage(
        &self,
        user_id: &str,
        kind: TestKind,
        submission_id: Uuid,
    ) -> anyhow::Result<()> {
        let mut usage = self.usage.lock().expect("accounts state poisoned");
        usage
            .entry((user_id.to_string(), kind))
            .or_default()
            .insert(submission_id);
        Ok(())
    }

    async fn record_completion(&self, user_id: &str, kind: TestKind) -> anyhow::Result<()> {
        let mut completed = self.completed.lock().expect("accounts state poisoned");
        completed.entry(user_id.to_string()).or_default().insert(kind);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory durable store.
#[derive(Default)]
pub struct MemoryStore {
    submissions: Mutex<HashMap<Uuid, Submission>>,
    reports: Mutex<HashMap<Uuid, EvaluationReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().expect("store state poisoned").len()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn save_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        self.submissions
            .lock()
            .expect("store state poisoned")
            .insert(submission.submission_id, submission.clone());
        Ok(())
    }

    async fn load_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self
            .submissions
            .lock()
            .expect("store state poisoned")
            .get(&id)
            .cloned())
    }

    async fn save_report(&self, report: &EvaluationReport) -> Result<(), StoreError> {
        self.reports
            .lock()
            .expect("store state poisoned")
            .insert(report.submission_id, report.clone());
        Ok(())
    }

    async fn load_report(&self, id: Uuid) -> Result<Option<EvaluationReport>, StoreError> {
        Ok(self
            .reports
            .lock()
            .expect("store state poisoned")
            .get(&id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Queue + evaluation worker
// ---------------------------------------------------------------------------

/// Scoring function run by the in-process worker. The payload is opaque to
/// the engine; only the worker and result screens interpret it.
pub type Evaluator = dyn Fn(&Submission) -> anyhow::Result<serde_json::Value> + Send + Sync;

/// In-process evaluation queue with a built-in worker.
pub struct MemoryQueue {
    store: Arc<dyn SubmissionStore>,
    evaluator: Arc<Evaluator>,
    stage_delay: Duration,
    channels: Mutex<HashMap<Uuid, watch::Sender<String>>>,
    jobs: Mutex<HashSet<Uuid>>,
    enqueue_calls: AtomicU32,
}

impl MemoryQueue {
    pub fn new(store: Arc<dyn SubmissionStore>) -> Self {
        Self {
            store,
            evaluator: Arc::new(default_evaluator),
            stage_delay: Duration::from_millis(200),
            channels: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashSet::new()),
            enqueue_calls: AtomicU32::new(0),
        }
    }

    /// Delay between worker stage transitions.
    pub fn with_stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    /// Replace the scoring function, e.g. to inject failures in tests.
    pub fn with_evaluator(
        mut self,
        evaluator: impl Fn(&Submission) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Distinct evaluation jobs accepted so far.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().expect("queue state poisoned").len()
    }

    /// Raw enqueue calls, including deduplicated ones.
    pub fn enqueue_calls(&self) -> u32 {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    fn channel(&self, submission_id: Uuid) -> watch::Sender<String> {
        let mut channels = self.channels.lock().expect("queue state poisoned");
        channels
            .entry(submission_id)
            .or_insert_with(|| watch::channel("queued".to_string()).0)
            .clone()
    }
}

#[async_trait]
impl EvaluationQueue for MemoryQueue {
    async fn enqueue(&self, submission_id: Uuid) -> anyhow::Result<()> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut jobs = self.jobs.lock().expect("queue state poisoned");
            if !jobs.insert(submission_id) {
                tracing::debug!(%submission_id, "evaluation already queued, ignoring duplicate");
                return Ok(());
            }
        }

        let status = self.channel(submission_id);
        let store = Arc::clone(&self.store);
        let evaluator = Arc::clone(&self.evaluator);
        let delay = self.stage_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            status.send_replace("in_progress".to_string());

            tokio::time::sleep(delay).await;
            let submission = match store.load_submission(submission_id).await {
                Ok(Some(submission)) => submission,
                Ok(None) => {
                    tracing::warn!(%submission_id, "submission vanished before evaluation");
                    status.send_replace("failed".to_string());
                    return;
                }
                Err(e) => {
                    tracing::warn!(%submission_id, error = %e, "could not load submission");
                    status.send_replace("failed".to_string());
                    return;
                }
            };

            match evaluator(&submission) {
                Ok(scores) => {
                    let report = EvaluationReport {
                        submission_id,
                        scores,
                        summary: Some(summary_for(&submission)),
                        computed_at: Utc::now(),
                    };
                    if let Err(e) = store.save_report(&report).await {
                        tracing::warn!(%submission_id, error = %e, "failed to save report");
                        status.send_replace("failed".to_string());
                    } else {
                        status.send_replace("completed".to_string());
                    }
                }
                Err(e) => {
                    tracing::warn!(%submission_id, error = %e, "evaluation failed");
                    status.send_replace("failed".to_string());
                }
            }
        });

        Ok(())
    }

    async fn subscribe(&self, submission_id: Uuid) -> anyhow::Result<RawStatusStream> {
        let rx = self.channel(submission_id).subscribe();
        Ok(watch_stream(rx))
    }
}

/// Current value first, then every change until the sender goes away.
fn watch_stream(rx: watch::Receiver<String>) -> RawStatusStream {
    Box::pin(stream::unfold((rx, true), |(mut rx, first)| async move {
        if first {
            let current = rx.borrow_and_update().clone();
            return Some((current, (rx, false)));
        }
        match rx.changed().await {
            Ok(()) => {
                let current = rx.borrow_and_update().clone();
                Some((current, (rx, false)))
            }
            Err(_) => None,
        }
    }))
}

fn default_evaluator(submission: &Submission) -> anyhow::Result<serde_json::Value> {
    let params = submission.test_kind.params();
    let coverage =
        (submission.metric.word_count as f64 / params.min_words as f64).clamp(0.0, 1.0);
    let overall = 2.0 + 8.0 * coverage;
    Ok(serde_json::json!({
        "overall": (overall * 10.0).round() / 10.0,
        "completeness": (coverage * 100.0).round(),
        "word_count": submission.metric.word_count,
        "elapsed_seconds": submission.elapsed_seconds,
    }))
}

fn summary_for(submission: &Submission) -> String {
    format!(
        "{} response on \"{}\": {} words in {}s",
        submission.test_kind.display_name(),
        submission.selection,
        submission.metric.word_count,
        submission.elapsed_seconds
    )
}
