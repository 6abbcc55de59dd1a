use crate::core::error::HandoffError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL record of every tool call.
///
/// Lives outside the knowledge root so agents cannot read or rewrite it
/// through the file tools.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub ts: String,
    pub event_id: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AuditLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn record(
        &self,
        tool: &str,
        session_id: Option<&str>,
        code: Option<&str>,
    ) -> Result<(), HandoffError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(HandoffError::IoError)?;
        }

        let ev = AuditEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            tool: tool.to_string(),
            session_id: session_id.map(str::to_string),
            status: if code.is_some() { "error" } else { "success" }.to_string(),
            code: code.map(str::to_string),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(HandoffError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?).map_err(HandoffError::IoError)?;
        Ok(())
    }

    pub fn read_events(&self) -> Result<Vec<AuditEvent>, HandoffError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path).map_err(HandoffError::IoError)?;
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(HandoffError::from))
            .collect()
    }
}
