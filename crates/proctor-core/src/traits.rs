//! Collaborator trait definitions.
//!
//! These async traits are the seams to the external services the engine
//! consumes: topic content, account/quota state, durable storage, and the
//! evaluation pipeline. Implementations live in `proctor-backend`.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{EntitlementTier, EvaluationReport, Submission, TestKind};

// ---------------------------------------------------------------------------
// Topic source
// ---------------------------------------------------------------------------

/// Source of the candidate-facing options offered at selection.
///
/// The returned set must be stable for the duration of one session; the
/// engine fetches once and never re-asks mid-session.
#[async_trait]
pub trait TopicSource: Send + Sync {
    async fn fetch_choices(&self, kind: TestKind, count: usize) -> anyhow::Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Account / quota service
// ---------------------------------------------------------------------------

/// Remaining-quota snapshot for one user and test kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub tier: EntitlementTier,
    /// Attempts consumed in the current period.
    pub used: u32,
    /// Attempt allowance for the period; `None` means unlimited.
    pub limit: Option<u32>,
}

impl QuotaSnapshot {
    /// Attempts left, or `None` if the tier is unlimited.
    pub fn remaining(&self) -> Option<u32> {
        self.limit.map(|limit| limit.saturating_sub(self.used))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }
}

/// Account-side queries and recordings consumed by the gate and dispatcher.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Quota snapshot for a user and kind. Read-only.
    async fn quota(&self, user_id: &str, kind: TestKind) -> anyhow::Result<QuotaSnapshot>;

    /// Test kinds the user has already completed, for prerequisite checks.
    async fn completed(&self, user_id: &str) -> anyhow::Result<Vec<TestKind>>;

    /// Record a consumed attempt. Keyed by submission id; must be
    /// idempotent since the dispatcher delivers at-least-once.
    async fn record_usage(
        &self,
        user_id: &str,
        kind: TestKind,
        submission_id: Uuid,
    ) -> anyhow::Result<()>;

    /// Mark a kind completed in the sequential-access chain.
    async fn record_completion(&self, user_id: &str, kind: TestKind) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Durable store
// ---------------------------------------------------------------------------

/// Durable storage for submissions and evaluation reports.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn save_submission(&self, submission: &Submission) -> Result<(), StoreError>;

    async fn load_submission(&self, submission_id: Uuid) -> Result<Option<Submission>, StoreError>;

    async fn save_report(&self, report: &EvaluationReport) -> Result<(), StoreError>;

    async fn load_report(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<EvaluationReport>, StoreError>;
}

// ---------------------------------------------------------------------------
// Evaluation queue
// ---------------------------------------------------------------------------

/// Raw status emissions from the evaluation backend, in emission order.
///
/// Values are backend strings; the result observer maps them onto the
/// closed [`EvaluationStatus`](crate::model::EvaluationStatus) lifecycle.
pub type RawStatusStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Hand-off to the externally-owned evaluation pipeline.
///
/// `enqueue` is at-least-once; the evaluator must be idempotent per
/// submission id. Whether `subscribe` pushes or polls underneath is an
/// implementation detail hidden behind the stream.
#[async_trait]
pub trait EvaluationQueue: Send + Sync {
    async fn enqueue(&self, submission_id: Uuid) -> anyhow::Result<()>;

    /// Subscribe to status emissions for one submission, starting from the
    /// backend's current state (not replayed from the beginning).
    async fn subscribe(&self, submission_id: Uuid) -> anyhow::Result<RawStatusStream>;
}
