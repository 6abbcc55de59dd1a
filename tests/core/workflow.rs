use handoff::core::error::HandoffError;
use handoff::core::workflow::{Trigger, WorkflowState, WorkflowStateMachine};

fn steps(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn fire(m: &mut WorkflowStateMachine, trigger: Trigger) -> Result<(), HandoffError> {
    match trigger {
        Trigger::StartWork => m.start_work("goal").map(|_| ()),
        Trigger::PlanSetup => m.plan_setup(steps(&["step A", "step B"]), None).map(|_| ()),
        Trigger::Proceed => m.proceed("done", None).map(|_| ()),
        Trigger::ReportIssue => m.report_issue("it broke", None, None).map(|_| ()),
        Trigger::EndJob => {
            m.closing_record("summary", None)?;
            m.close("history/session.json".to_string()).map(|_| ())
        }
    }
}

fn snapshot(m: &WorkflowStateMachine) -> (WorkflowState, Option<String>, usize, usize) {
    match m.session() {
        Some(s) => (s.state, Some(s.id.clone()), s.current_step, s.issue_log.len()),
        None => (m.state(), None, 0, 0),
    }
}

// Legal moves written out by hand, independent of the machine's own table.
fn allowed(state: WorkflowState, trigger: Trigger) -> bool {
    matches!(
        (state, trigger),
        (WorkflowState::NoSession, Trigger::StartWork)
            | (WorkflowState::Closed, Trigger::StartWork)
            | (WorkflowState::Planning, Trigger::PlanSetup)
            | (WorkflowState::Executing, Trigger::Proceed)
            | (WorkflowState::Executing, Trigger::ReportIssue)
            | (WorkflowState::Executing, Trigger::EndJob)
            | (WorkflowState::Debugging, Trigger::Proceed)
            | (WorkflowState::Debugging, Trigger::EndJob)
    )
}

#[test]
fn happy_path_walks_every_state() {
    let mut m = WorkflowStateMachine::new();
    assert_eq!(m.state(), WorkflowState::NoSession);

    let id = m.start_work("ship login").unwrap().id.clone();
    assert_eq!(m.state(), WorkflowState::Planning);

    m.plan_setup(steps(&["design", "build"]), Some(&id)).unwrap();
    assert_eq!(m.state(), WorkflowState::Executing);

    let out = m.proceed("designed", Some(&id)).unwrap();
    assert_eq!(out.completed.as_deref(), Some("design"));
    assert_eq!(out.next.as_deref(), Some("build"));

    m.report_issue("tests fail", Some("reran"), Some(&id)).unwrap();
    assert_eq!(m.state(), WorkflowState::Debugging);
    m.proceed("fixed", None).unwrap();
    assert_eq!(m.state(), WorkflowState::Executing);

    let record = m.closing_record("all done", Some(&id)).unwrap();
    assert_eq!(record.session_id, id);
    assert_eq!(record.goal, "ship login");
    assert_eq!(record.steps_completed, 2);
    assert_eq!(record.issue_log.len(), 1);
    assert_eq!(record.issue_log[0].attempted_solutions.as_deref(), Some("reran"));
    assert_eq!(record.progress.len(), 2);

    let closed = m.close("history/x.json".to_string()).unwrap();
    assert_eq!(closed.state, WorkflowState::Closed);
    assert_eq!(closed.history_ref.as_deref(), Some("history/x.json"));
    assert_eq!(m.state(), WorkflowState::Closed);
    assert_eq!(m.last_closed(), Some(id.as_str()));
    assert!(m.session().is_none());
}

#[test]
fn second_start_work_is_rejected_and_changes_nothing() {
    let mut m = WorkflowStateMachine::new();
    let id = m.start_work("first").unwrap().id.clone();

    let err = m.start_work("second").unwrap_err();
    assert_eq!(err.code(), "WORKFLOW_VIOLATION");
    assert!(err.suggestion().unwrap().contains("plan_setup"));

    let s = m.session().unwrap();
    assert_eq!(s.id, id);
    assert_eq!(s.goal, "first");
    assert_eq!(s.state, WorkflowState::Planning);
}

#[test]
fn every_sequence_up_to_length_five_matches_the_grammar() {
    let triggers = [
        Trigger::StartWork,
        Trigger::PlanSetup,
        Trigger::Proceed,
        Trigger::ReportIssue,
        Trigger::EndJob,
    ];
    let total = triggers.len().pow(5);

    for n in 0..total {
        let mut seq = Vec::new();
        let mut k = n;
        for _ in 0..5 {
            seq.push(triggers[k % triggers.len()]);
            k /= triggers.len();
        }

        let mut m = WorkflowStateMachine::new();
        for trigger in &seq {
            let before = snapshot(&m);
            let legal = allowed(m.state(), *trigger);
            let result = fire(&mut m, *trigger);
            if legal {
                assert!(result.is_ok(), "{seq:?}: {trigger:?} should pass from {:?}", before.0);
            } else {
                let err = result.unwrap_err();
                assert_eq!(err.code(), "WORKFLOW_VIOLATION", "{seq:?}");
                assert_eq!(snapshot(&m), before, "{seq:?}: rejected {trigger:?} mutated state");
                break;
            }
        }
    }
}

#[test]
fn proceed_saturates_at_plan_length() {
    let mut m = WorkflowStateMachine::new();
    m.start_work("g").unwrap();
    m.plan_setup(steps(&["step A", "step B"]), None).unwrap();

    assert_eq!(m.proceed("", None).unwrap().current_step, 1);
    assert_eq!(m.proceed("", None).unwrap().current_step, 2);
    let third = m.proceed("extra", None).unwrap();
    assert_eq!(third.current_step, 2);
    assert_eq!(third.completed, None);
    assert_eq!(third.next, None);
    assert!(m.session().unwrap().plan_complete());
}

#[test]
fn invalid_plan_is_rejected_and_state_stays_planning() {
    let mut m = WorkflowStateMachine::new();
    m.start_work("g").unwrap();

    let err = m.plan_setup(Vec::new(), None).unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    let err = m.plan_setup(steps(&["ok", "  "]), None).unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
    assert_eq!(m.state(), WorkflowState::Planning);

    m.plan_setup(steps(&["ok"]), None).unwrap();
    assert_eq!(m.state(), WorkflowState::Executing);
}

#[test]
fn blank_issue_is_rejected() {
    let mut m = WorkflowStateMachine::new();
    m.start_work("g").unwrap();
    m.plan_setup(steps(&["a"]), None).unwrap();
    assert_eq!(m.report_issue("   ", None, None).unwrap_err().code(), "INVALID_INPUT");
    assert_eq!(m.state(), WorkflowState::Executing);
}

#[test]
fn mismatched_session_id_is_a_violation() {
    let mut m = WorkflowStateMachine::new();
    m.start_work("g").unwrap();

    let err = m.plan_setup(steps(&["a"]), Some("01NOTTHESESSION")).unwrap_err();
    assert_eq!(err.code(), "WORKFLOW_VIOLATION");
    assert_eq!(m.state(), WorkflowState::Planning);
    assert!(m.session().unwrap().plan.is_empty());
}

#[test]
fn complete_plan_requirement_blocks_early_end_job() {
    let mut m = WorkflowStateMachine::new().with_complete_plan_required(true);
    m.start_work("g").unwrap();
    m.plan_setup(steps(&["a", "b"]), None).unwrap();
    m.proceed("", None).unwrap();

    let err = m.closing_record("early", None).unwrap_err();
    assert_eq!(err.code(), "WORKFLOW_VIOLATION");
    assert!(err.to_string().contains("1/2"));

    m.proceed("", None).unwrap();
    assert!(m.closing_record("done", None).is_ok());
}

#[test]
fn closing_record_does_not_mutate() {
    let mut m = WorkflowStateMachine::new();
    m.start_work("g").unwrap();
    m.plan_setup(steps(&["a"]), None).unwrap();
    m.closing_record("s", None).unwrap();
    m.closing_record("s", None).unwrap();
    assert_eq!(m.state(), WorkflowState::Executing);
}

#[test]
fn restart_after_end_job_gets_a_new_id() {
    let mut m = WorkflowStateMachine::new();
    let first = m.start_work("one").unwrap().id.clone();
    m.plan_setup(steps(&["a"]), None).unwrap();
    m.closing_record("", None).unwrap();
    m.close("h".to_string()).unwrap();

    let second = m.start_work("two").unwrap().id.clone();
    assert_ne!(first, second);
    assert_eq!(m.state(), WorkflowState::Planning);
    assert_eq!(m.session().unwrap().goal, "two");
}
