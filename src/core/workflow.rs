//! Workflow state machine for a single agent task.
//!
//! One [`Session`] at a time moves through
//! `PLANNING -> EXECUTING <-> DEBUGGING -> CLOSED`. The transition table is
//! the total function [`next_state`]; every mutating method checks it first
//! and leaves the machine untouched when the trigger is rejected.
//!
//! `end_job` is split in two so the caller can persist the closing record
//! before the session is discarded: [`WorkflowStateMachine::closing_record`]
//! validates and builds the record, [`WorkflowStateMachine::close`] commits.

use crate::core::error::HandoffError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fmt;

const STATE_RECORD_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    NoSession,
    Planning,
    Executing,
    Debugging,
    Closed,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::NoSession => "NO_SESSION",
            WorkflowState::Planning => "PLANNING",
            WorkflowState::Executing => "EXECUTING",
            WorkflowState::Debugging => "DEBUGGING",
            WorkflowState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    StartWork,
    PlanSetup,
    Proceed,
    ReportIssue,
    EndJob,
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::StartWork => "start_work",
            Trigger::PlanSetup => "plan_setup",
            Trigger::Proceed => "proceed",
            Trigger::ReportIssue => "report_issue",
            Trigger::EndJob => "end_job",
        }
    }
}

/// Transition table. `None` means the trigger is not allowed from `state`.
pub fn next_state(state: WorkflowState, trigger: Trigger) -> Option<WorkflowState> {
    use Trigger::*;
    use WorkflowState::*;
    match (state, trigger) {
        (NoSession | Closed, StartWork) => Some(Planning),
        (Planning, PlanSetup) => Some(Executing),
        (Executing | Debugging, Proceed) => Some(Executing),
        (Executing, ReportIssue) => Some(Debugging),
        (Executing | Debugging, EndJob) => Some(Closed),
        _ => None,
    }
}

/// What the agent should call next from `state`.
pub fn expected_next(state: WorkflowState) -> &'static [&'static str] {
    match state {
        WorkflowState::NoSession | WorkflowState::Closed => &["start_work"],
        WorkflowState::Planning => &["plan_setup"],
        WorkflowState::Executing => &["proceed", "report_issue", "end_job"],
        WorkflowState::Debugging => &["proceed", "end_job"],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted_solutions: Option<String>,
    /// Plan step the issue was raised against.
    pub step: usize,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub note: String,
    /// Step index after this proceed.
    pub step: usize,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub goal: String,
    pub state: WorkflowState,
    #[serde(default)]
    pub plan: Vec<String>,
    pub current_step: usize,
    #[serde(default)]
    pub progress: Vec<ProgressRecord>,
    #[serde(default)]
    pub issue_log: Vec<IssueRecord>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_ref: Option<String>,
}

impl Session {
    pub fn current_step_text(&self) -> Option<&str> {
        self.plan.get(self.current_step).map(String::as_str)
    }

    pub fn plan_complete(&self) -> bool {
        !self.plan.is_empty() && self.current_step >= self.plan.len()
    }
}

/// Immutable record persisted at `end_job`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub schema_version: String,
    pub session_id: String,
    pub goal: String,
    pub plan: Vec<String>,
    pub steps_completed: usize,
    pub progress: Vec<ProgressRecord>,
    pub issue_log: Vec<IssueRecord>,
    pub summary: String,
    pub started_at: String,
    pub closed_at: String,
}

/// Result of a `proceed` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProceedOutcome {
    pub completed: Option<String>,
    pub next: Option<String>,
    pub current_step: usize,
    pub total_steps: usize,
}

#[derive(Debug, Default)]
pub struct WorkflowStateMachine {
    session: Option<Session>,
    last_closed: Option<String>,
    require_complete_plan: bool,
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, `end_job` is refused until every plan step is done.
    pub fn with_complete_plan_required(mut self, required: bool) -> Self {
        self.require_complete_plan = required;
        self
    }

    pub fn state(&self) -> WorkflowState {
        match (&self.session, &self.last_closed) {
            (Some(s), _) => s.state,
            (None, Some(_)) => WorkflowState::Closed,
            (None, None) => WorkflowState::NoSession,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Id of the most recently closed session, if any.
    pub fn last_closed(&self) -> Option<&str> {
        self.last_closed.as_deref()
    }

    /// Reject `trigger` if it is not legal from the current state, or if
    /// `claimed_id` names a session other than the active one.
    pub fn check(&self, trigger: Trigger, claimed_id: Option<&str>) -> Result<WorkflowState, HandoffError> {
        let state = self.state();
        let Some(next) = next_state(state, trigger) else {
            return Err(violation(state, trigger));
        };
        if let (Some(claimed), Some(active)) = (claimed_id, self.session.as_ref()) {
            if claimed != active.id {
                return Err(HandoffError::workflow(
                    format!(
                        "session_id '{}' does not match the active session '{}'",
                        claimed, active.id
                    ),
                    "Use the session_id returned by start_work, or omit it",
                ));
            }
        }
        Ok(next)
    }

    pub fn start_work(&mut self, goal: &str) -> Result<&Session, HandoffError> {
        let next = self.check(Trigger::StartWork, None)?;
        let session = Session {
            id: time::new_event_id(),
            goal: goal.to_string(),
            state: next,
            plan: Vec::new(),
            current_step: 0,
            progress: Vec::new(),
            issue_log: Vec::new(),
            started_at: time::now_epoch_z(),
            history_ref: None,
        };
        Ok(self.session.insert(session))
    }

    pub fn plan_setup(
        &mut self,
        steps: Vec<String>,
        claimed_id: Option<&str>,
    ) -> Result<&Session, HandoffError> {
        let next = self.check(Trigger::PlanSetup, claimed_id)?;
        if steps.is_empty() || steps.iter().any(|s| s.trim().is_empty()) {
            return Err(HandoffError::InvalidInput(
                "plan_steps must be a non-empty list of non-blank strings".to_string(),
            ));
        }
        let session = self.active_mut()?;
        session.plan = steps;
        session.current_step = 0;
        session.state = next;
        Ok(session)
    }

    pub fn proceed(
        &mut self,
        note: &str,
        claimed_id: Option<&str>,
    ) -> Result<ProceedOutcome, HandoffError> {
        let next = self.check(Trigger::Proceed, claimed_id)?;
        let session = self.active_mut()?;
        let completed = session.current_step_text().map(str::to_string);
        if session.current_step < session.plan.len() {
            session.current_step += 1;
        }
        session.state = next;
        session.progress.push(ProgressRecord {
            note: note.to_string(),
            step: session.current_step,
            ts: time::now_epoch_z(),
        });
        Ok(ProceedOutcome {
            completed,
            next: session.current_step_text().map(str::to_string),
            current_step: session.current_step,
            total_steps: session.plan.len(),
        })
    }

    pub fn report_issue(
        &mut self,
        description: &str,
        attempted_solutions: Option<&str>,
        claimed_id: Option<&str>,
    ) -> Result<&Session, HandoffError> {
        let next = self.check(Trigger::ReportIssue, claimed_id)?;
        if description.trim().is_empty() {
            return Err(HandoffError::InvalidInput(
                "issue_description must not be empty".to_string(),
            ));
        }
        let session = self.active_mut()?;
        session.issue_log.push(IssueRecord {
            description: description.to_string(),
            attempted_solutions: attempted_solutions
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            step: session.current_step,
            ts: time::now_epoch_z(),
        });
        session.state = next;
        Ok(session)
    }

    /// Validate `end_job` and build the record to persist. Does not mutate.
    pub fn closing_record(
        &self,
        summary: &str,
        claimed_id: Option<&str>,
    ) -> Result<SessionRecord, HandoffError> {
        self.check(Trigger::EndJob, claimed_id)?;
        let session = self.active()?;
        if self.require_complete_plan && !session.plan_complete() {
            return Err(HandoffError::workflow(
                format!(
                    "Cannot end job with incomplete plan: {}/{} steps completed",
                    session.current_step,
                    session.plan.len()
                ),
                "Report the remaining steps with proceed before calling end_job",
            ));
        }
        Ok(SessionRecord {
            schema_version: STATE_RECORD_VERSION.to_string(),
            session_id: session.id.clone(),
            goal: session.goal.clone(),
            plan: session.plan.clone(),
            steps_completed: session.current_step,
            progress: session.progress.clone(),
            issue_log: session.issue_log.clone(),
            summary: summary.to_string(),
            started_at: session.started_at.clone(),
            closed_at: time::now_epoch_z(),
        })
    }

    /// Commit `end_job` after the record was persisted as `history_ref`.
    pub fn close(&mut self, history_ref: String) -> Result<Session, HandoffError> {
        let next = self.check(Trigger::EndJob, None)?;
        let mut session = self.session.take().ok_or_else(no_session)?;
        session.state = next;
        session.history_ref = Some(history_ref);
        self.last_closed = Some(session.id.clone());
        Ok(session)
    }

    fn active(&self) -> Result<&Session, HandoffError> {
        self.session.as_ref().ok_or_else(no_session)
    }

    fn active_mut(&mut self) -> Result<&mut Session, HandoffError> {
        self.session.as_mut().ok_or_else(no_session)
    }
}

fn no_session() -> HandoffError {
    HandoffError::workflow("No active work session", "Call start_work first")
}

fn violation(state: WorkflowState, trigger: Trigger) -> HandoffError {
    let message = match (state, trigger) {
        (WorkflowState::Planning | WorkflowState::Executing | WorkflowState::Debugging, Trigger::StartWork) => {
            format!("A work session is already active (state {state}); only one session is allowed")
        }
        (WorkflowState::NoSession | WorkflowState::Closed, _) => {
            format!("No active work session; {} is not allowed in state {state}", trigger.name())
        }
        _ => format!("{} is not allowed in state {state}", trigger.name()),
    };
    let suggestion = format!("Next allowed: {}", expected_next(state).join(", "));
    HandoffError::workflow(message, suggestion)
}
