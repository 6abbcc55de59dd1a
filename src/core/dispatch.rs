//! Tool dispatcher: the single entry point for agent tool calls.
//!
//! Tool names map onto the closed [`Tool`] enum. Workflow tools are gated by
//! the [`WorkflowStateMachine`]: the trigger is checked before any argument
//! is acted on, side effects (reading or persisting documents) run next, and
//! the transition is committed last. A failed side effect therefore leaves
//! the session exactly as it was. Knowledge tools need no session and go
//! straight to the [`KnowledgeStore`].

use crate::core::audit::AuditLog;
use crate::core::config::{self, HandoffConfig};
use crate::core::error::HandoffError;
use crate::core::history;
use crate::core::output;
use crate::core::path_guard::PathGuard;
use crate::core::rpc::{self, ToolDefinition, ToolResponse};
use crate::core::store::KnowledgeStore;
use crate::core::workflow::{Trigger, WorkflowState, WorkflowStateMachine, expected_next};
use serde_json::{Value, json};
use std::path::Path;
use std::str::FromStr;

pub const RECOMMENDED_PLAN: [&str; 8] = [
    "Confirm environment and check dependencies",
    "Read relevant docs and understand project structure",
    "Break the task down into sub-tasks",
    "Implement the change with tests",
    "Debug and confirm behaviour (call report_issue when something breaks)",
    "Clean up temporary files",
    "Organize documentation with the file tools",
    "Update the handoff document",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    StartWork,
    PlanSetup,
    Proceed,
    ReportIssue,
    EndJob,
    ReadFile,
    WriteFile,
    ListFiles,
    SearchFiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Gated by the workflow state machine.
    Stateful(Trigger),
    /// Knowledge-store access; no session required.
    Stateless,
}

impl Tool {
    pub const ALL: [Tool; 9] = [
        Tool::StartWork,
        Tool::PlanSetup,
        Tool::Proceed,
        Tool::ReportIssue,
        Tool::EndJob,
        Tool::ReadFile,
        Tool::WriteFile,
        Tool::ListFiles,
        Tool::SearchFiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::StartWork => "start_work",
            Tool::PlanSetup => "plan_setup",
            Tool::Proceed => "proceed",
            Tool::ReportIssue => "report_issue",
            Tool::EndJob => "end_job",
            Tool::ReadFile => "read_file",
            Tool::WriteFile => "write_file",
            Tool::ListFiles => "list_files",
            Tool::SearchFiles => "search_files",
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::StartWork => ToolKind::Stateful(Trigger::StartWork),
            Tool::PlanSetup => ToolKind::Stateful(Trigger::PlanSetup),
            Tool::Proceed => ToolKind::Stateful(Trigger::Proceed),
            Tool::ReportIssue => ToolKind::Stateful(Trigger::ReportIssue),
            Tool::EndJob => ToolKind::Stateful(Trigger::EndJob),
            Tool::ReadFile | Tool::WriteFile | Tool::ListFiles | Tool::SearchFiles => {
                ToolKind::Stateless
            }
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, input_schema) = match self {
            Tool::StartWork => (
                "MANDATORY FIRST STEP. Start a tracked work session and receive the project's handoff document. Call this before any development work.",
                json!({
                    "type": "object",
                    "properties": {
                        "user_goal": { "type": "string", "description": "The user's goal and requirements for this session" }
                    },
                    "required": ["user_goal"]
                }),
            ),
            Tool::PlanSetup => (
                "STEP 2. Submit the development plan as an ordered list of steps. Allowed once, right after start_work.",
                json!({
                    "type": "object",
                    "properties": {
                        "plan_steps": { "type": "array", "items": { "type": "string" }, "description": "Development steps in order" },
                        "session_id": { "type": "string", "description": "Session id from start_work (optional)" }
                    },
                    "required": ["plan_steps"]
                }),
            ),
            Tool::Proceed => (
                "STEP 3. Report the current plan step as done and move to the next one. Also resumes execution after report_issue.",
                json!({
                    "type": "object",
                    "properties": {
                        "completed_work": { "type": "string", "description": "What was completed" },
                        "session_id": { "type": "string", "description": "Session id from start_work (optional)" }
                    }
                }),
            ),
            Tool::ReportIssue => (
                "Report a problem hit while executing the plan. Switches the session into debugging until the next proceed.",
                json!({
                    "type": "object",
                    "properties": {
                        "issue_description": { "type": "string", "description": "Description of the issue" },
                        "attempted_solutions": { "type": "string", "description": "What was already tried" },
                        "session_id": { "type": "string", "description": "Session id from start_work (optional)" }
                    },
                    "required": ["issue_description"]
                }),
            ),
            Tool::EndJob => (
                "FINAL STEP. Close the session. Provide the complete updated handoff document (read it first with read_file) and a summary.",
                json!({
                    "type": "object",
                    "properties": {
                        "summary": { "type": "string", "description": "Summary of the work completed" },
                        "handoff_document": { "type": "string", "description": "Complete updated handoff document content" },
                        "session_id": { "type": "string", "description": "Session id from start_work (optional)" }
                    },
                    "required": ["handoff_document"]
                }),
            ),
            Tool::ReadFile => (
                "Read a file from the docs directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the docs directory" }
                    },
                    "required": ["path"]
                }),
            ),
            Tool::WriteFile => (
                "Write content to a file in the docs directory (overwrites).",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the docs directory" },
                        "content": { "type": "string", "description": "Full file content" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            Tool::ListFiles => (
                "List files and directories in the docs directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Directory relative to the docs directory (default: root)", "default": "" }
                    }
                }),
            ),
            Tool::SearchFiles => (
                "Case-sensitive text search across files in the docs directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Text to search for" },
                        "path": { "type": "string", "description": "Directory or file to search (default: root)", "default": "" },
                        "max_results": { "type": "integer", "minimum": 1, "description": "Stop after this many matches" }
                    },
                    "required": ["query"]
                }),
            ),
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

impl FromStr for Tool {
    type Err = HandoffError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Tool::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| HandoffError::UnknownTool(name.to_string()))
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    Tool::ALL.iter().map(Tool::definition).collect()
}

/// Owns the knowledge store and the one workflow session of this process.
pub struct ToolDispatcher {
    store: KnowledgeStore,
    workflow: WorkflowStateMachine,
    audit: AuditLog,
    handoff_document: String,
    history_dir: String,
}

impl ToolDispatcher {
    pub fn new(
        store: KnowledgeStore,
        workflow: WorkflowStateMachine,
        audit: AuditLog,
        handoff_document: &str,
        history_dir: &str,
    ) -> Self {
        Self {
            store,
            workflow,
            audit,
            handoff_document: handoff_document.to_string(),
            history_dir: history_dir.to_string(),
        }
    }

    /// Wire a dispatcher for `project_root`. The knowledge root must exist.
    pub fn from_config(project_root: &Path, cfg: &HandoffConfig) -> Result<Self, HandoffError> {
        let guard = PathGuard::new(&cfg.knowledge_root_path(project_root))?;
        Ok(Self::new(
            KnowledgeStore::new(guard, cfg.max_file_bytes),
            WorkflowStateMachine::new().with_complete_plan_required(cfg.require_complete_plan),
            AuditLog::new(&config::audit_log_path(project_root)),
            &cfg.handoff_document,
            &cfg.history_dir,
        ))
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn workflow(&self) -> &WorkflowStateMachine {
        &self.workflow
    }

    /// Run one tool call. Always yields exactly one response.
    pub fn call(&mut self, name: &str, args: &Value) -> ToolResponse {
        tracing::debug!(
            tool = name,
            args = %output::compact_line(&args.to_string(), 160),
            "tool call"
        );
        let result = self.try_call(name, args);

        let code = result.as_ref().err().map(HandoffError::code);
        match &result {
            Ok(_) => tracing::info!(tool = name, state = %self.workflow.state(), "tool call ok"),
            Err(e) => tracing::warn!(tool = name, code = e.code(), error = %e, "tool call rejected"),
        }
        let session_id = match &result {
            Ok(v) => v.get("session_id").and_then(Value::as_str).map(str::to_string),
            Err(_) => self.workflow.session().map(|s| s.id.clone()),
        };
        if let Err(e) = self.audit.record(name, session_id.as_deref(), code) {
            tracing::warn!(error = %e, "audit log write failed");
        }

        ToolResponse::from(result)
    }

    pub fn try_call(&mut self, name: &str, args: &Value) -> Result<Value, HandoffError> {
        let tool = Tool::from_str(name)?;
        let empty = json!({});
        let args = if args.is_null() { &empty } else { args };
        if !args.is_object() {
            return Err(HandoffError::InvalidInput(
                "arguments must be a JSON object".to_string(),
            ));
        }

        if let ToolKind::Stateful(trigger) = tool.kind() {
            let claimed = rpc::optional_str(args, "session_id")?;
            self.workflow.check(trigger, claimed)?;
        }

        match tool {
            Tool::StartWork => self.start_work(args),
            Tool::PlanSetup => self.plan_setup(args),
            Tool::Proceed => self.proceed(args),
            Tool::ReportIssue => self.report_issue(args),
            Tool::EndJob => self.end_job(args),
            Tool::ReadFile => self.read_file(args),
            Tool::WriteFile => self.write_file(args),
            Tool::ListFiles => self.list_files(args),
            Tool::SearchFiles => self.search_files(args),
        }
    }

    // ===== Workflow tools =====

    fn start_work(&mut self, args: &Value) -> Result<Value, HandoffError> {
        let goal = rpc::optional_str(args, "user_goal")?.unwrap_or_default();

        let handoff = match self.store.read(&self.handoff_document) {
            Ok(content) => Some(content),
            Err(HandoffError::NotFound(_)) => None,
            Err(HandoffError::UnsupportedContent(reason)) => {
                tracing::warn!(%reason, "handoff document unreadable; starting without it");
                None
            }
            Err(e) => return Err(e),
        };

        let session = self.workflow.start_work(goal)?;
        let context_note = if handoff.is_some() {
            format!("Read the handoff document ({}) included below before planning.", self.handoff_document)
        } else {
            "No handoff document exists yet; this looks like the first session.".to_string()
        };
        Ok(json!({
            "session_id": session.id,
            "state": session.state,
            "user_goal": session.goal,
            "next_action": expected_next(session.state),
            "handoff_document": {
                "path": self.handoff_document,
                "content": handoff,
            },
            "recommended_plan_steps": RECOMMENDED_PLAN,
            "instruction": format!(
                "Work session started. {}\n\nNEXT: call plan_setup with an ordered list of steps. \
                 The workflow is start_work -> plan_setup -> proceed/report_issue -> end_job; steps cannot be skipped.",
                context_note
            ),
        }))
    }

    fn plan_setup(&mut self, args: &Value) -> Result<Value, HandoffError> {
        let claimed = rpc::optional_str(args, "session_id")?;
        let steps = rpc::required_str_list(args, "plan_steps")?;
        let session = self.workflow.plan_setup(steps, claimed)?;
        let first = session.current_step_text().unwrap_or_default();
        Ok(json!({
            "session_id": session.id,
            "state": session.state,
            "total_steps": session.plan.len(),
            "current_step": session.current_step,
            "plan_steps": session.plan,
            "next_action": expected_next(session.state),
            "instruction": format!(
                "Plan recorded with {} steps:\n{}\n\nCurrent objective: {}\nCall proceed after finishing each step.",
                session.plan.len(),
                output::render_plan(&session.plan, session.current_step),
                first
            ),
        }))
    }

    fn proceed(&mut self, args: &Value) -> Result<Value, HandoffError> {
        let claimed = rpc::optional_str(args, "session_id")?;
        let note = rpc::optional_str(args, "completed_work")?.unwrap_or_default();
        let outcome = self.workflow.proceed(note, claimed)?;
        let session = self
            .workflow
            .session()
            .ok_or_else(|| HandoffError::workflow("No active work session", "Call start_work first"))?;

        let mut instruction = format!(
            "Progress recorded ({}/{} steps).",
            outcome.current_step, outcome.total_steps
        );
        if let Some(done) = &outcome.completed {
            instruction.push_str(&format!("\nJust completed: {}", done));
        }
        match &outcome.next {
            Some(next) => instruction.push_str(&format!("\nNext objective: {}", next)),
            None => instruction.push_str(
                "\nAll planned steps are done. Read the handoff document, update it, and call end_job.",
            ),
        }

        Ok(json!({
            "session_id": session.id,
            "state": session.state,
            "completed_work": note,
            "completed_step": outcome.completed,
            "current_step": outcome.current_step,
            "total_steps": outcome.total_steps,
            "next_step": outcome.next,
            "next_action": expected_next(session.state),
            "instruction": instruction,
        }))
    }

    fn report_issue(&mut self, args: &Value) -> Result<Value, HandoffError> {
        let claimed = rpc::optional_str(args, "session_id")?;
        let description = rpc::required_str(args, "issue_description")?;
        let attempted = rpc::optional_str(args, "attempted_solutions")?;
        let session = self.workflow.report_issue(description, attempted, claimed)?;
        Ok(json!({
            "session_id": session.id,
            "state": session.state,
            "issue_count": session.issue_log.len(),
            "current_step": session.current_step,
            "next_action": expected_next(session.state),
            "instruction": format!(
                "Issue logged: {}\nDebug it, then call proceed when resolved (or end_job to stop).",
                output::compact_line(description, 120)
            ),
        }))
    }

    fn end_job(&mut self, args: &Value) -> Result<Value, HandoffError> {
        let claimed = rpc::optional_str(args, "session_id")?;
        let summary = rpc::optional_str(args, "summary")?.unwrap_or_default();
        let document = rpc::required_str(args, "handoff_document")?;
        if document.trim().is_empty() {
            return Err(HandoffError::InvalidInput(
                "handoff_document must contain the complete updated document".to_string(),
            ));
        }

        let record = self.workflow.closing_record(summary, claimed)?;
        let history_path = history::record_path(&self.history_dir, &record.session_id);
        let record_json = serde_json::to_string_pretty(&record)?;

        // The overwrite goes first: it is idempotent, so a failure in the
        // create-only history write can be retried with the same session.
        let doc_receipt = self.store.write(&self.handoff_document, document)?;
        let history_receipt = self.store.write_new(&history_path, &record_json)?;
        let session = self.workflow.close(history_receipt.path.clone())?;

        Ok(json!({
            "session_id": session.id,
            "state": WorkflowState::Closed,
            "steps_completed": record.steps_completed,
            "total_steps": record.plan.len(),
            "issues_reported": record.issue_log.len(),
            "handoff_document": doc_receipt,
            "history_ref": history_receipt.path,
            "next_action": expected_next(WorkflowState::Closed),
            "instruction": format!(
                "Job completed ({}/{} steps). Handoff document saved to {}; session history saved to {}.",
                record.steps_completed,
                record.plan.len(),
                doc_receipt.path,
                history_receipt.path
            ),
        }))
    }

    // ===== Knowledge tools =====

    fn read_file(&self, args: &Value) -> Result<Value, HandoffError> {
        let path = rpc::required_str(args, "path")?;
        let content = self.store.read(path)?;
        Ok(json!({
            "path": path,
            "bytes": content.len(),
            "lines": content.lines().count(),
            "content": content,
        }))
    }

    fn write_file(&self, args: &Value) -> Result<Value, HandoffError> {
        let path = rpc::required_str(args, "path")?;
        let content = rpc::required_str(args, "content")?;
        self.ensure_outside_history(path)?;
        let receipt = self.store.write(path, content)?;
        Ok(json!({
            "path": receipt.path,
            "status": "written",
            "bytes": receipt.bytes,
            "sha256": receipt.sha256,
        }))
    }

    /// History records are create-only and belong to `end_job`. Both sides
    /// go through the guard, so in-root link aliases compare equal.
    fn ensure_outside_history(&self, path: &str) -> Result<(), HandoffError> {
        let guard = self.store.guard();
        // A history dir outside the root has nothing here to protect.
        let Ok(history) = guard.resolve(&self.history_dir) else {
            return Ok(());
        };
        if history == guard.root() {
            return Ok(());
        }
        if guard.resolve(path)?.starts_with(&history) {
            return Err(HandoffError::ProtectedPath(format!(
                "{} is inside the session history ({})",
                path, self.history_dir
            )));
        }
        Ok(())
    }

    fn list_files(&self, args: &Value) -> Result<Value, HandoffError> {
        let path = rpc::optional_str(args, "path")?.unwrap_or_default();
        let entries = self.store.list(path)?;
        Ok(json!({
            "path": path,
            "total": entries.len(),
            "entries": entries,
        }))
    }

    fn search_files(&self, args: &Value) -> Result<Value, HandoffError> {
        let query = rpc::required_str(args, "query")?;
        let scope = rpc::optional_str(args, "path")?.unwrap_or_default();
        let limit = match args.get("max_results") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_u64() {
                Some(n) if n > 0 => Some(n as usize),
                _ => {
                    return Err(HandoffError::InvalidInput(
                        "max_results must be a positive integer".to_string(),
                    ));
                }
            },
        };

        let mut matches = Vec::new();
        let mut truncated = false;
        for m in self.store.search(query, scope)? {
            if limit.is_some_and(|n| matches.len() >= n) {
                truncated = true;
                break;
            }
            matches.push(m);
        }

        Ok(json!({
            "query": query,
            "path": scope,
            "total_matches": matches.len(),
            "truncated": truncated,
            "matches": matches,
        }))
    }
}
