//! Handoff: a local tool server for AI coding agents.
//!
//! An agent connected over stdio gets two kinds of tools:
//!
//! - **Workflow tools** (`start_work`, `plan_setup`, `proceed`,
//!   `report_issue`, `end_job`) walk one task through a gated
//!   plan → execute → report → close sequence. Out-of-order calls are
//!   rejected with `WORKFLOW_VIOLATION` and change nothing.
//! - **Knowledge tools** (`read_file`, `write_file`, `list_files`,
//!   `search_files`) operate on the project's `docs/` tree and cannot reach
//!   outside it.
//!
//! At `end_job` the agent rewrites the handoff document (`docs/agentreadme.md`)
//! so the next session starts from where this one stopped, and the session
//! itself is archived under `docs/history/`.
//!
//! ```bash
//! handoff init          # lay out docs/ and .handoff/config.toml
//! handoff serve         # speak JSON-RPC on stdin/stdout
//! handoff status        # what the knowledge root currently holds
//! handoff history list  # archived sessions
//! handoff diagnose      # check the setup, print the MCP client config
//! ```
//!
//! # Crate Structure
//!
//! - [`core::workflow`]: the state machine
//! - [`core::path_guard`], [`core::store`]: sandboxed file access
//! - [`core::dispatch`], [`core::transport`]: tool calls and the stdio loop

pub mod core;

use crate::core::{
    audit::AuditLog,
    config::{self, HandoffConfig},
    dispatch::ToolDispatcher,
    error::HandoffError,
    history, output,
    path_guard::PathGuard,
    scaffold::{self, FileAction, ScaffoldOptions},
    store::{EntryKind, KnowledgeStore},
    time, transport,
};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the `tracing` filter directive.
pub const LOG_ENV: &str = "HANDOFF_LOG";

#[derive(Parser, Debug)]
#[clap(
    name = "handoff",
    version = env!("CARGO_PKG_VERSION"),
    about = "Workflow-gated documentation tools for AI coding agents"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the docs/ layout, handoff document and config file
    Init(InitCli),
    /// Serve tools over JSON-RPC on stdin/stdout
    Serve(ServeCli),
    /// Summarize the knowledge root and session history
    Status(StatusCli),
    /// Inspect archived sessions
    History(HistoryCli),
    /// Check the project setup and print the MCP client config
    Diagnose(DiagnoseCli),
}

#[derive(clap::Args, Debug)]
struct InitCli {
    /// Directory to initialize (defaults to current working directory).
    #[clap(short, long)]
    dir: Option<PathBuf>,
    /// Overwrite files that already exist.
    #[clap(long)]
    force: bool,
    /// Show what would change without writing files.
    #[clap(long)]
    dry_run: bool,
}

#[derive(clap::Args, Debug)]
struct ServeCli {
    /// Project directory (defaults to the nearest parent holding `.handoff/`).
    #[clap(short, long)]
    dir: Option<PathBuf>,
    /// Knowledge root, overriding config and HANDOFF_ROOT.
    #[clap(long)]
    root: Option<PathBuf>,
    /// Log at debug level.
    #[clap(short, long)]
    verbose: bool,
}

#[derive(clap::Args, Debug)]
struct StatusCli {
    #[clap(short, long)]
    dir: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    format: String,
}

#[derive(clap::Args, Debug)]
struct HistoryCli {
    #[clap(short, long)]
    dir: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    format: String,
    #[clap(subcommand)]
    command: HistoryCommand,
}

#[derive(clap::Args, Debug)]
struct DiagnoseCli {
    #[clap(short, long)]
    dir: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    format: String,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List archived sessions, oldest first
    List,
    /// Show one archived session
    Show {
        /// Session id as returned by start_work
        id: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // stdout carries the transport; diagnostics go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn validate_format(format: &str) -> Result<(), HandoffError> {
    match format {
        "text" | "json" => Ok(()),
        other => Err(HandoffError::InvalidInput(format!(
            "unknown format '{}': expected 'text' or 'json'",
            other
        ))),
    }
}

/// Project root for commands that operate on an existing project.
fn resolve_project_root(dir: Option<PathBuf>, current_dir: &Path) -> PathBuf {
    match dir {
        Some(d) if d.is_absolute() => d,
        Some(d) => current_dir.join(d),
        None => config::find_project_root(current_dir),
    }
}

fn load_effective_config(project_root: &Path) -> Result<HandoffConfig, HandoffError> {
    Ok(config::load_config(project_root)?.with_env_overrides())
}

fn open_store(project_root: &Path, cfg: &HandoffConfig) -> Result<KnowledgeStore, HandoffError> {
    let guard = PathGuard::new(&cfg.knowledge_root_path(project_root))?;
    Ok(KnowledgeStore::new(guard, cfg.max_file_bytes))
}

pub fn run() -> Result<(), HandoffError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;

    match cli.command {
        Command::Init(init) => {
            init_tracing(false);
            run_init(init, &current_dir)
        }
        Command::Serve(serve) => {
            init_tracing(serve.verbose);
            run_serve(serve, &current_dir)
        }
        Command::Status(status) => {
            init_tracing(false);
            validate_format(&status.format)?;
            let project_root = resolve_project_root(status.dir, &current_dir);
            run_status(&project_root, &status.format)
        }
        Command::History(hist) => {
            init_tracing(false);
            validate_format(&hist.format)?;
            let project_root = resolve_project_root(hist.dir, &current_dir);
            run_history(&project_root, hist.command, &hist.format)
        }
        Command::Diagnose(diag) => {
            init_tracing(false);
            validate_format(&diag.format)?;
            let project_root = resolve_project_root(diag.dir, &current_dir);
            run_diagnose(&project_root, &diag.format)
        }
    }
}

fn run_init(init: InitCli, current_dir: &Path) -> Result<(), HandoffError> {
    let target_dir = match init.dir {
        Some(d) if d.is_absolute() => d,
        Some(d) => current_dir.join(d),
        None => current_dir.to_path_buf(),
    };
    if !init.dry_run {
        fs::create_dir_all(&target_dir)?;
    }
    let target_dir = fs::canonicalize(&target_dir).unwrap_or(target_dir);
    let cfg = load_effective_config(&target_dir)?;

    println!(
        "{} {}",
        "Initializing handoff in".bold(),
        target_dir.display()
    );
    let opts = ScaffoldOptions {
        target_dir,
        force: init.force,
        dry_run: init.dry_run,
    };
    let report = scaffold::scaffold_project(&opts, &cfg)?;

    for dir in &report.directories {
        let shown = dir.strip_prefix(&opts.target_dir).unwrap_or(dir);
        println!("  {} {}/", "dir:".dimmed(), shown.display());
    }
    for (path, action) in &report.files {
        let shown = path.strip_prefix(&opts.target_dir).unwrap_or(path);
        let label = match action {
            FileAction::Wrote => "wrote:".green(),
            FileAction::Overwrote => "overwrote:".yellow(),
            FileAction::Skipped => "kept:".dimmed(),
            FileAction::WouldWrite => "would-write:".cyan(),
            FileAction::WouldSkip => "would-keep:".dimmed(),
        };
        println!("  {} {}", label, shown.display());
    }
    if report.count(FileAction::Skipped) > 0 {
        println!(
            "{}",
            "Existing files were kept; pass --force to overwrite them.".yellow()
        );
    }
    if !opts.dry_run {
        println!(
            "\n{} MCP clients reading {} will launch `handoff serve`; have the agent call start_work.",
            "Ready.".green().bold(),
            scaffold::CLIENT_CONFIG
        );
    }
    Ok(())
}

fn run_serve(serve: ServeCli, current_dir: &Path) -> Result<(), HandoffError> {
    let project_root = resolve_project_root(serve.dir, current_dir);
    let mut cfg = load_effective_config(&project_root)?;
    if let Some(root) = serve.root {
        let root = if root.is_absolute() { root } else { current_dir.join(root) };
        cfg.knowledge_root = root.to_string_lossy().into_owned();
    }

    let knowledge_root = cfg.knowledge_root_path(&project_root);
    if !knowledge_root.exists() {
        tracing::warn!(
            path = %knowledge_root.display(),
            "knowledge root missing; creating it (run `handoff init` for the full layout)"
        );
        fs::create_dir_all(&knowledge_root)?;
    }

    let mut dispatcher = ToolDispatcher::from_config(&project_root, &cfg)?;
    tracing::info!(
        project = %project_root.display(),
        knowledge_root = %dispatcher.store().root().display(),
        "handoff server starting"
    );
    let stdin = io::stdin();
    let stdout = io::stdout();
    transport::serve(&mut dispatcher, stdin.lock(), stdout.lock())
}

fn count_markdown(store: &KnowledgeStore, dir: &str) -> Result<usize, HandoffError> {
    let mut count = 0;
    for entry in store.list(dir)? {
        match entry.kind {
            EntryKind::Directory => count += count_markdown(store, &entry.path)?,
            EntryKind::File if entry.name.ends_with(".md") => count += 1,
            EntryKind::File => {}
        }
    }
    Ok(count)
}

fn run_status(project_root: &Path, format: &str) -> Result<(), HandoffError> {
    let cfg = load_effective_config(project_root)?;
    let knowledge_root = cfg.knowledge_root_path(project_root);
    if !knowledge_root.is_dir() {
        if format == "json" {
            let out = time::cli_envelope(
                "status",
                "uninitialized",
                serde_json::json!({ "knowledge_root": knowledge_root }),
            );
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            println!(
                "{} {} does not exist. Run: handoff init",
                "Not initialized:".red().bold(),
                knowledge_root.display()
            );
        }
        return Ok(());
    }

    let store = open_store(project_root, &cfg)?;
    let handoff_bytes = match store.read(&cfg.handoff_document) {
        Ok(content) => Some(content.len()),
        Err(HandoffError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };
    let docs = count_markdown(&store, "")?;
    let sessions = history::list_session_ids(&store, &cfg.history_dir)?;
    let audit_events = AuditLog::new(&config::audit_log_path(project_root))
        .read_events()?
        .len();

    if format == "json" {
        let out = time::cli_envelope(
            "status",
            "ok",
            serde_json::json!({
                "project_root": project_root,
                "knowledge_root": store.root(),
                "handoff_document": { "path": cfg.handoff_document, "bytes": handoff_bytes },
                "markdown_documents": docs,
                "sessions": sessions,
                "audit_events": audit_events,
            }),
        );
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", "Handoff status".bold());
    println!("  project:        {}", project_root.display());
    println!("  knowledge root: {}", store.root().display());
    match handoff_bytes {
        Some(n) => println!("  {} {}: {} bytes", "✓".green(), cfg.handoff_document, n),
        None => println!("  {} {} does not exist", "!".yellow(), cfg.handoff_document),
    }
    println!("  {} markdown documents: {}", "✓".green(), docs);
    println!("  {} archived sessions: {}", "✓".green(), sessions.len());
    println!("  {} audit events: {}", "✓".green(), audit_events);
    if !sessions.is_empty() {
        println!("\n  Recent sessions:");
        for id in sessions.iter().rev().take(3) {
            println!("    - {}", id);
        }
    }
    Ok(())
}

fn run_history(project_root: &Path, command: HistoryCommand, format: &str) -> Result<(), HandoffError> {
    let cfg = load_effective_config(project_root)?;
    let store = open_store(project_root, &cfg)?;

    match command {
        HistoryCommand::List => {
            let mut records = Vec::new();
            for id in history::list_session_ids(&store, &cfg.history_dir)? {
                records.push(history::load_record(&store, &cfg.history_dir, &id)?);
            }
            if format == "json" {
                let out = time::cli_envelope(
                    "history.list",
                    "ok",
                    serde_json::json!({ "sessions": records }),
                );
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            if records.is_empty() {
                println!("No archived sessions.");
            }
            for r in &records {
                println!(
                    "{}  {}/{} steps  {}",
                    r.session_id.bold(),
                    r.steps_completed,
                    r.plan.len(),
                    output::compact_line(&r.goal, 60)
                );
            }
        }
        HistoryCommand::Show { id } => {
            let r = history::load_record(&store, &cfg.history_dir, &id)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&r)?);
                return Ok(());
            }
            println!("{} {}", "Session".bold(), r.session_id);
            println!("  goal:    {}", r.goal);
            println!("  started: {}  closed: {}", r.started_at, r.closed_at);
            println!("  plan ({}/{}):", r.steps_completed, r.plan.len());
            println!("{}", output::render_plan(&r.plan, r.steps_completed));
            if !r.issue_log.is_empty() {
                println!("  issues:");
                for issue in &r.issue_log {
                    println!("    - [step {}] {}", issue.step + 1, issue.description);
                }
            }
            println!("  summary: {}", r.summary);
        }
    }
    Ok(())
}

fn run_diagnose(project_root: &Path, format: &str) -> Result<(), HandoffError> {
    let cfg = load_effective_config(project_root)?;
    let knowledge_root = cfg.knowledge_root_path(project_root);
    let checks = [
        ("config file", config::config_path(project_root), true),
        ("knowledge root", knowledge_root.clone(), false),
        ("handoff document", knowledge_root.join(&cfg.handoff_document), true),
        ("MCP client config", project_root.join(scaffold::CLIENT_CONFIG), true),
    ];
    let present: Vec<bool> = checks
        .iter()
        .map(|(_, path, is_file)| if *is_file { path.is_file() } else { path.is_dir() })
        .collect();
    let healthy = present.iter().all(|ok| *ok);
    let executable = std::env::current_exe().ok();
    let client = scaffold::client_config(project_root);

    if format == "json" {
        let report: Vec<serde_json::Value> = checks
            .iter()
            .zip(&present)
            .map(|((name, path, _), ok)| serde_json::json!({ "check": name, "path": path, "ok": ok }))
            .collect();
        let out = time::cli_envelope(
            "diagnose",
            if healthy { "ok" } else { "attention" },
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "executable": executable,
                "project_root": project_root,
                "checks": report,
                "client_config": client,
            }),
        );
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", "Handoff diagnostics".bold());
    println!("  version:    {}", env!("CARGO_PKG_VERSION"));
    if let Some(exe) = &executable {
        println!("  executable: {}", exe.display());
    }
    println!("  project:    {}", project_root.display());
    for ((name, path, _), ok) in checks.iter().zip(&present) {
        let mark = if *ok { "✓".green() } else { "✗".red() };
        println!("  {} {}: {}", mark, name, path.display());
    }
    if !healthy {
        println!("\n{} handoff init", "Run:".yellow().bold());
    }
    println!("\nRecommended MCP client config:");
    println!("{}", serde_json::to_string_pretty(&client)?);
    Ok(())
}
