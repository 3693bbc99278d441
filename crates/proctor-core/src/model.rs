//! Core data model types for proctor.
//!
//! These are the fundamental types the entire system uses to represent
//! test variants, session phases, frozen submissions, and the observed
//! evaluation lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metric::ResponseMetric;

/// Namespace for deriving submission ids from session ids (UUID v5).
///
/// Deriving rather than generating makes `dispatch` idempotent: retrying
/// with the same session always addresses the same submission record.
const SUBMISSION_NAMESPACE: Uuid = Uuid::from_u128(0x8f3c_a1d4_92e7_4b06_b1fa_5c2d_09e8_7a41);

/// The timed-test variant being run.
///
/// Each kind fixes the capture duration, the response word bounds, the
/// number of options offered at selection, and its position in the
/// sequential-access chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestKind {
    GroupDiscussion,
    GroupPlanning,
    Lecturette,
}

/// Timing and validation parameters for one test kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TestParams {
    /// Seconds allotted to the timed-capture phase.
    pub capture_seconds: u32,
    /// Minimum words required for a manual advance to review.
    pub min_words: usize,
    /// Maximum words accepted at review.
    pub max_words: usize,
    /// Number of options presented at selection.
    pub choice_count: usize,
}

impl TestKind {
    /// All kinds in sequential-access order.
    pub const SEQUENCE: [TestKind; 3] = [
        TestKind::GroupDiscussion,
        TestKind::GroupPlanning,
        TestKind::Lecturette,
    ];

    /// Timing and validation parameters for this kind.
    pub fn params(&self) -> TestParams {
        match self {
            TestKind::GroupDiscussion => TestParams {
                capture_seconds: 1200,
                min_words: 300,
                max_words: 5000,
                choice_count: 4,
            },
            TestKind::GroupPlanning => TestParams {
                capture_seconds: 600,
                min_words: 150,
                max_words: 5000,
                choice_count: 4,
            },
            TestKind::Lecturette => TestParams {
                capture_seconds: 180,
                min_words: 100,
                max_words: 2000,
                choice_count: 4,
            },
        }
    }

    /// Kinds that must be completed before this one may start.
    pub fn prerequisites(&self) -> &'static [TestKind] {
        match self {
            TestKind::GroupDiscussion => &[],
            TestKind::GroupPlanning => &[TestKind::GroupDiscussion],
            TestKind::Lecturette => &[TestKind::GroupDiscussion, TestKind::GroupPlanning],
        }
    }

    /// Human-readable name for messages and table output.
    pub fn display_name(&self) -> &'static str {
        match self {
            TestKind::GroupDiscussion => "Group Discussion",
            TestKind::GroupPlanning => "Group Planning Exercise",
            TestKind::Lecturette => "Lecturette",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::GroupDiscussion => write!(f, "group-discussion"),
            TestKind::GroupPlanning => write!(f, "group-planning"),
            TestKind::Lecturette => write!(f, "lecturette"),
        }
    }
}

impl FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "group-discussion" | "gd" => Ok(TestKind::GroupDiscussion),
            "group-planning" | "gpe" => Ok(TestKind::GroupPlanning),
            "lecturette" => Ok(TestKind::Lecturette),
            other => Err(format!("unknown test kind: {other}")),
        }
    }
}

/// One discrete state of the session state machine.
///
/// `Submitted` is terminal; everything after it belongs to the result
/// observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Instructions,
    Selection,
    TimedCapture,
    Review,
    Submitted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Instructions => write!(f, "instructions"),
            Phase::Selection => write!(f, "selection"),
            Phase::TimedCapture => write!(f, "timed_capture"),
            Phase::Review => write!(f, "review"),
            Phase::Submitted => write!(f, "submitted"),
        }
    }
}

/// Subscription tier of the account taking the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementTier {
    Free,
    Pro,
}

/// The immutable frozen record of a completed session.
///
/// Created once by the dispatcher, never edited, referenced by
/// `submission_id` for all result queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: Uuid,
    /// Lineage back to the session that produced this record.
    pub session_id: Uuid,
    pub user_id: String,
    pub test_kind: TestKind,
    /// The options that were presented, in presentation order.
    pub choices: Vec<String>,
    pub selection: String,
    pub response_text: String,
    pub metric: ResponseMetric,
    pub submitted_at: DateTime<Utc>,
    /// Capture time consumed, in seconds.
    pub elapsed_seconds: u32,
}

impl Submission {
    /// Derive the submission id for a session.
    ///
    /// The same session id always yields the same submission id.
    pub fn derived_id(session_id: Uuid) -> Uuid {
        Uuid::new_v5(&SUBMISSION_NAMESPACE, session_id.as_bytes())
    }
}

/// Observed lifecycle state of an external evaluation.
///
/// Transitions are monotonic; a regression is a protocol violation, not a
/// state this type can silently re-enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl EvaluationStatus {
    /// Position in the monotonic lifecycle; later statuses rank higher.
    pub fn rank(&self) -> u8 {
        match self {
            EvaluationStatus::Queued => 0,
            EvaluationStatus::InProgress => 1,
            EvaluationStatus::Completed => 2,
            EvaluationStatus::Failed => 2,
        }
    }

    /// Whether this status ends the observation stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStatus::Completed | EvaluationStatus::Failed)
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationStatus::Queued => write!(f, "queued"),
            EvaluationStatus::InProgress => write!(f, "in_progress"),
            EvaluationStatus::Completed => write!(f, "completed"),
            EvaluationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for EvaluationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" | "pending" => Ok(EvaluationStatus::Queued),
            "in_progress" | "analyzing" => Ok(EvaluationStatus::InProgress),
            "completed" => Ok(EvaluationStatus::Completed),
            "failed" => Ok(EvaluationStatus::Failed),
            other => Err(format!("unknown evaluation status: {other}")),
        }
    }
}

/// The scoring artifact produced by the external evaluator.
///
/// The payload is opaque to this engine beyond an existence check; callers
/// render or post-process it as they see fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub submission_id: Uuid,
    /// Structured scoring payload, passed through untouched.
    pub scores: serde_json::Value,
    /// Optional one-paragraph performance summary.
    #[serde(default)]
    pub summary: Option<String>,
    pub computed_at: DateTime<Utc>,
}
