//! Project configuration from `.handoff/config.toml`.
//!
//! Every key is optional. A missing file means defaults. `HANDOFF_ROOT`
//! overrides `knowledge_root`; CLI flags override both (applied by the
//! caller).

use crate::core::error::HandoffError;
use crate::core::store::DEFAULT_MAX_FILE_BYTES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".handoff";
pub const CONFIG_FILE: &str = "config.toml";
pub const AUDIT_LOG: &str = "audit.events.jsonl";
pub const ROOT_ENV: &str = "HANDOFF_ROOT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// Knowledge root, relative to the project root unless absolute.
    pub knowledge_root: String,
    /// Handoff document, relative to the knowledge root.
    pub handoff_document: String,
    /// Session history directory, relative to the knowledge root.
    pub history_dir: String,
    pub max_file_bytes: u64,
    pub require_complete_plan: bool,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            knowledge_root: "docs".to_string(),
            handoff_document: "agentreadme.md".to_string(),
            history_dir: "history".to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            require_complete_plan: false,
        }
    }
}

impl HandoffConfig {
    pub fn knowledge_root_path(&self, project_root: &Path) -> PathBuf {
        let root = Path::new(&self.knowledge_root);
        if root.is_absolute() {
            root.to_path_buf()
        } else {
            project_root.join(root)
        }
    }

    /// Apply `HANDOFF_ROOT` if set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var(ROOT_ENV) {
            if !root.trim().is_empty() {
                self.knowledge_root = root;
            }
        }
        self
    }
}

pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join(CONFIG_FILE)
}

pub fn audit_log_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join(AUDIT_LOG)
}

pub fn load_config(project_root: &Path) -> Result<HandoffConfig, HandoffError> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(HandoffConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(HandoffError::IoError)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<HandoffConfig, HandoffError> {
    let config: HandoffConfig = toml::from_str(content)?;
    if config.max_file_bytes == 0 {
        return Err(HandoffError::InvalidInput(
            "max_file_bytes must be greater than zero".to_string(),
        ));
    }
    Ok(config)
}

/// Walk up from `start_dir` looking for a `.handoff` directory. Falls back to
/// `start_dir` itself when none is found.
pub fn find_project_root(start_dir: &Path) -> PathBuf {
    let mut current = start_dir.to_path_buf();
    loop {
        if current.join(CONFIG_DIR).is_dir() {
            return current;
        }
        if !current.pop() {
            return start_dir.to_path_buf();
        }
    }
}
