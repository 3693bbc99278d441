//! Pre-session eligibility: quota, tier, and sequential prerequisites.
//!
//! All outcomes are expected business states, so they are enum variants
//! rather than errors. The gate is read-only against the account service
//! and safe to call repeatedly, e.g. on screen re-entry.

use std::sync::Arc;
use std::time::Duration;

use crate::model::{EntitlementTier, TestKind};
use crate::traits::AccountService;

/// Result of the pre-session authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityOutcome {
    Eligible {
        user_id: String,
        tier: EntitlementTier,
    },
    /// The tier's attempt allowance for this kind is used up.
    QuotaExceeded(String),
    /// An earlier test in the sequence has not been completed.
    PrerequisiteNotMet(String),
    /// Network or backend failure; the caller may retry.
    TransientError(String),
}

/// Progress through the sequential test chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceProgress {
    pub completed: Vec<TestKind>,
    pub next: Option<TestKind>,
    pub total: usize,
    pub completion_percent: f32,
}

impl SequenceProgress {
    pub fn is_complete(&self) -> bool {
        self.next.is_none()
    }
}

/// The pre-session authorization check.
pub struct EligibilityGate {
    accounts: Arc<dyn AccountService>,
    call_timeout: Duration,
}

impl EligibilityGate {
    pub fn new(accounts: Arc<dyn AccountService>, call_timeout: Duration) -> Self {
        Self {
            accounts,
            call_timeout,
        }
    }

    /// Classify whether `user_id` may start a `kind` session right now.
    ///
    /// Prerequisites are checked before quota so a locked test reports the
    /// sequence problem even when the allowance is also spent.
    pub async fn check(&self, kind: TestKind, user_id: &str) -> EligibilityOutcome {
        let completed = match self.bounded(self.accounts.completed(user_id)).await {
            Ok(completed) => completed,
            Err(reason) => {
                tracing::warn!(user_id, %kind, reason, "eligibility check failed");
                return EligibilityOutcome::TransientError(reason);
            }
        };

        let missing: Vec<TestKind> = kind
            .prerequisites()
            .iter()
            .filter(|k| !completed.contains(k))
            .copied()
            .collect();
        if !missing.is_empty() {
            return EligibilityOutcome::PrerequisiteNotMet(denial_message(kind, &missing));
        }

        let quota = match self.bounded(self.accounts.quota(user_id, kind)).await {
            Ok(quota) => quota,
            Err(reason) => {
                tracing::warn!(user_id, %kind, reason, "quota check failed");
                return EligibilityOutcome::TransientError(reason);
            }
        };

        if quota.is_exhausted() {
            let limit = quota.limit.unwrap_or(0);
            return EligibilityOutcome::QuotaExceeded(format!(
                "You have used all {limit} {} attempts for this period",
                kind.display_name()
            ));
        }

        EligibilityOutcome::Eligible {
            user_id: user_id.to_string(),
            tier: quota.tier,
        }
    }

    /// The first kind in the sequence the user has not completed.
    pub async fn next_in_sequence(&self, user_id: &str) -> anyhow::Result<Option<TestKind>> {
        let completed = self.accounts.completed(user_id).await?;
        Ok(TestKind::SEQUENCE
            .iter()
            .find(|k| !completed.contains(k))
            .copied())
    }

    /// Completion progress through the sequential chain.
    pub async fn progress(&self, user_id: &str) -> anyhow::Result<SequenceProgress> {
        let completed_all = self.accounts.completed(user_id).await?;
        let completed: Vec<TestKind> = TestKind::SEQUENCE
            .iter()
            .filter(|k| completed_all.contains(k))
            .copied()
            .collect();
        let next = TestKind::SEQUENCE
            .iter()
            .find(|k| !completed.contains(k))
            .copied();
        let total = TestKind::SEQUENCE.len();
        Ok(SequenceProgress {
            completion_percent: completed.len() as f32 / total as f32 * 100.0,
            completed,
            next,
            total,
        })
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("account service error: {e:#}")),
            Err(_) => Err(format!(
                "account service timed out after {}s",
                self.call_timeout.as_secs()
            )),
        }
    }
}

/// Human-readable denial listing the missing prerequisites in order.
fn denial_message(kind: TestKind, missing: &[TestKind]) -> String {
    let names: Vec<&str> = missing.iter().map(|k| k.display_name()).collect();
    let list = match names.as_slice() {
        [one] => (*one).to_string(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
        [] => String::new(),
    };
    format!("Complete {list} before starting {}", kind.display_name())
}
