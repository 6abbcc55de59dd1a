//! Project scaffolding for `handoff init`.
//!
//! Creates the knowledge root with its four topic directories, the handoff
//! document, the history directory, `.handoff/config.toml` and an MCP client
//! entry in `.vscode/mcp.json`. Existing files are kept unless `force` is
//! set; `dry_run` only reports.

use crate::core::assets;
use crate::core::config::{self, HandoffConfig};
use crate::core::error::HandoffError;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

/// Project-relative location of the MCP client config.
pub const CLIENT_CONFIG: &str = ".vscode/mcp.json";

/// MCP client entry that launches `handoff serve` inside `project_root`.
pub fn client_config(project_root: &Path) -> Value {
    json!({
        "servers": {
            "handoff": {
                "type": "stdio",
                "command": "handoff",
                "args": ["serve"],
                "cwd": project_root.display().to_string(),
            }
        },
        "inputs": []
    })
}

/// Scaffolding operation configuration.
pub struct ScaffoldOptions {
    /// Project root (the directory that will contain `.handoff/`).
    pub target_dir: PathBuf,
    /// Overwrite files that already exist.
    pub force: bool,
    /// Report what would happen without touching the disk.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Wrote,
    Overwrote,
    Skipped,
    WouldWrite,
    WouldSkip,
}

#[derive(Debug, Default)]
pub struct ScaffoldReport {
    pub directories: Vec<PathBuf>,
    pub files: Vec<(PathBuf, FileAction)>,
}

impl ScaffoldReport {
    pub fn count(&self, action: FileAction) -> usize {
        self.files.iter().filter(|(_, a)| *a == action).count()
    }
}

fn ensure_parent(path: &Path) -> Result<(), HandoffError> {
    if let Some(p) = path.parent() {
        fs::create_dir_all(p).map_err(HandoffError::IoError)?;
    }
    Ok(())
}

fn write_file(
    opts: &ScaffoldOptions,
    report: &mut ScaffoldReport,
    dest: PathBuf,
    content: &str,
) -> Result<(), HandoffError> {
    let exists = dest.exists();
    let action = match (exists, opts.force, opts.dry_run) {
        (true, false, true) => FileAction::WouldSkip,
        (true, false, false) => FileAction::Skipped,
        (_, _, true) => FileAction::WouldWrite,
        (true, true, false) => FileAction::Overwrote,
        (false, _, false) => FileAction::Wrote,
    };
    if matches!(action, FileAction::Wrote | FileAction::Overwrote) {
        ensure_parent(&dest)?;
        fs::write(&dest, content).map_err(HandoffError::IoError)?;
    }
    tracing::debug!(path = %dest.display(), ?action, "scaffold");
    report.files.push((dest, action));
    Ok(())
}

fn ensure_dir(opts: &ScaffoldOptions, report: &mut ScaffoldReport, dir: PathBuf) -> Result<(), HandoffError> {
    if !opts.dry_run {
        fs::create_dir_all(&dir).map_err(HandoffError::IoError)?;
    }
    report.directories.push(dir);
    Ok(())
}

fn template(name: &str) -> Result<String, HandoffError> {
    assets::get_template(name)
        .ok_or_else(|| HandoffError::NotFound(format!("embedded template {}", name)))
}

/// Lay out a project. `cfg` decides where the knowledge root, handoff
/// document and history directory go.
pub fn scaffold_project(opts: &ScaffoldOptions, cfg: &HandoffConfig) -> Result<ScaffoldReport, HandoffError> {
    let mut report = ScaffoldReport::default();
    let knowledge_root = cfg.knowledge_root_path(&opts.target_dir);

    ensure_dir(opts, &mut report, opts.target_dir.join(config::CONFIG_DIR))?;
    for rel in assets::list_doc_templates() {
        if let Some((dir, _)) = rel.split_once('/') {
            ensure_dir(opts, &mut report, knowledge_root.join(dir))?;
        }
    }
    ensure_dir(opts, &mut report, knowledge_root.join(&cfg.history_dir))?;
    let client_config_path = opts.target_dir.join(CLIENT_CONFIG);
    if let Some(dir) = client_config_path.parent() {
        ensure_dir(opts, &mut report, dir.to_path_buf())?;
    }

    write_file(
        opts,
        &mut report,
        config::config_path(&opts.target_dir),
        &template(assets::CONFIG_TEMPLATE)?,
    )?;
    write_file(
        opts,
        &mut report,
        knowledge_root.join(&cfg.handoff_document),
        &template(assets::HANDOFF_TEMPLATE)?,
    )?;
    let client = serde_json::to_string_pretty(&client_config(&opts.target_dir))? + "\n";
    write_file(opts, &mut report, client_config_path, &client)?;
    for rel in assets::list_doc_templates() {
        let content = template(&format!("{}{}", assets::DOCS_PREFIX, rel))?;
        write_file(opts, &mut report, knowledge_root.join(&rel), &content)?;
    }

    Ok(report)
}
