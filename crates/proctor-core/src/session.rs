//! The session state machine.
//!
//! Phases run `Instructions → Selection → TimedCapture → Review →
//! Submitted`. Transitions are guarded synchronous methods: they mutate the
//! session only when the guard passes and return the side-effect requests
//! (arm timer, cancel timer) for the runtime to perform. The session itself
//! never spawns tasks or touches collaborators, which keeps every
//! transition independently testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SessionError, ValidationError};
use crate::metric::ResponseMetric;
use crate::model::{Phase, TestKind};

/// Remaining seconds under which the UI should warn the candidate.
const TIME_LOW_SECONDS: u32 = 30;

/// What caused a `TimedCapture → Review` advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceTrigger {
    /// User action; response bounds are enforced.
    Manual,
    /// Timer expiry; always advances, the candidate lost available time
    /// and downstream evaluation scores the short response accordingly.
    TimerExpired,
}

/// Side-effect request returned by a transition for the runtime to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ArmTimer { seconds: u32 },
    CancelTimer,
}

/// One candidate's in-flight test session.
///
/// Ephemeral and owned exclusively by the active flow; only the transition
/// methods below mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    session_id: Uuid,
    user_id: String,
    test_kind: TestKind,
    phase: Phase,
    choices: Vec<String>,
    selection: Option<String>,
    response_text: String,
    remaining_seconds: u32,
    started_at: DateTime<Utc>,
    phase_entered_at: DateTime<Utc>,
    submission_id: Option<Uuid>,
}

impl Session {
    /// Create a session in the Instructions phase with a fixed choice set.
    pub fn new(user_id: impl Into<String>, test_kind: TestKind, choices: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            test_kind,
            phase: Phase::Instructions,
            choices,
            selection: None,
            response_text: String::new(),
            remaining_seconds: test_kind.params().capture_seconds,
            started_at: now,
            phase_entered_at: now,
            submission_id: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn test_kind(&self) -> TestKind {
        self.test_kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn response_text(&self) -> &str {
        &self.response_text
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn phase_entered_at(&self) -> DateTime<Utc> {
        self.phase_entered_at
    }

    /// Set once the session is dispatched.
    pub fn submission_id(&self) -> Option<Uuid> {
        self.submission_id
    }

    /// Live metrics of the response buffer.
    pub fn metric(&self) -> ResponseMetric {
        ResponseMetric::of(&self.response_text)
    }

    /// Capture time consumed so far, in seconds.
    pub fn elapsed_capture_seconds(&self) -> u32 {
        self.test_kind
            .params()
            .capture_seconds
            .saturating_sub(self.remaining_seconds)
    }

    /// Whether the countdown is in its final stretch.
    pub fn is_time_low(&self) -> bool {
        self.remaining_seconds > 0 && self.remaining_seconds < TIME_LOW_SECONDS
    }

    /// Remaining time as `M:SS` for display.
    pub fn formatted_remaining(&self) -> String {
        format!(
            "{}:{:02}",
            self.remaining_seconds / 60,
            self.remaining_seconds % 60
        )
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// `Instructions → Selection`, unconditional, user-triggered.
    pub fn begin_selection(&mut self) -> Result<Vec<Effect>, SessionError> {
        self.require_phase(Phase::Instructions, "begin selection")?;
        self.enter(Phase::Selection);
        Ok(Vec::new())
    }

    /// `Selection → TimedCapture`: fixes the selection, resets the response
    /// buffer, and requests the timer be armed with the kind's full
    /// allotment. The deadline clock begins here, not before.
    pub fn select_choice(&mut self, index: usize) -> Result<Vec<Effect>, SessionError> {
        self.require_phase(Phase::Selection, "select a choice")?;
        let Some(choice) = self.choices.get(index) else {
            return Err(SessionError::InvalidChoice {
                index,
                available: self.choices.len(),
            });
        };
        self.selection = Some(choice.clone());
        self.response_text.clear();
        self.remaining_seconds = self.test_kind.params().capture_seconds;
        self.enter(Phase::TimedCapture);
        Ok(vec![Effect::ArmTimer {
            seconds: self.remaining_seconds,
        }])
    }

    /// Replace the response buffer. Permitted only while capturing; bounds
    /// are never enforced mid-typing.
    pub fn update_response(&mut self, text: &str) -> Result<(), SessionError> {
        self.require_phase(Phase::TimedCapture, "edit the response")?;
        self.response_text = text.to_string();
        Ok(())
    }

    /// Record a countdown tick. Clamped so the value never increases; ticks
    /// arriving outside the capture phase are ignored.
    pub fn record_tick(&mut self, seconds: u32) {
        if self.phase == Phase::TimedCapture {
            self.remaining_seconds = seconds.min(self.remaining_seconds);
        }
    }

    /// `TimedCapture → Review`. A manual advance enforces the word bounds
    /// and rejects without changing phase; timer expiry always advances.
    pub fn advance(&mut self, trigger: AdvanceTrigger) -> Result<Vec<Effect>, SessionError> {
        self.require_phase(Phase::TimedCapture, "advance to review")?;
        match trigger {
            AdvanceTrigger::Manual => {
                self.validate_response()?;
                self.enter(Phase::Review);
                Ok(vec![Effect::CancelTimer])
            }
            AdvanceTrigger::TimerExpired => {
                self.remaining_seconds = 0;
                self.enter(Phase::Review);
                Ok(Vec::new())
            }
        }
    }

    /// `Review → TimedCapture`: return to edit. The timer resumes with the
    /// previously remaining seconds, not a fresh allotment; the total time
    /// budget is fixed per session.
    pub fn resume_capture(&mut self) -> Result<Vec<Effect>, SessionError> {
        self.require_phase(Phase::Review, "resume capture")?;
        self.enter(Phase::TimedCapture);
        Ok(vec![Effect::ArmTimer {
            seconds: self.remaining_seconds,
        }])
    }

    /// `Review → Submitted`, applied only after the dispatcher succeeded.
    /// A dispatch failure leaves the session in Review for a retry.
    pub fn mark_submitted(&mut self, submission_id: Uuid) -> Result<Vec<Effect>, SessionError> {
        self.require_phase(Phase::Review, "submit")?;
        self.submission_id = Some(submission_id);
        self.enter(Phase::Submitted);
        Ok(vec![Effect::CancelTimer])
    }

    /// Check the response against the kind's word bounds.
    pub fn validate_response(&self) -> Result<(), ValidationError> {
        let params = self.test_kind.params();
        let words = self.metric().word_count;
        if words < params.min_words {
            return Err(ValidationError::TooShort {
                min: params.min_words,
                actual: words,
            });
        }
        if words > params.max_words {
            return Err(ValidationError::TooLong {
                max: params.max_words,
                actual: words,
            });
        }
        Ok(())
    }

    fn require_phase(&self, expected: Phase, action: &'static str) -> Result<(), SessionError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidPhase {
                phase: self.phase,
                action,
            })
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(session_id = %self.session_id, prev = %self.phase, next = %phase, "phase transition");
        self.phase = phase;
        self.phase_entered_at = Utc::now();
    }
}
