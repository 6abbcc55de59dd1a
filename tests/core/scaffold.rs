use handoff::core::config::{self, HandoffConfig};
use handoff::core::dispatch::ToolDispatcher;
use handoff::core::rpc::ToolResponse;
use handoff::core::scaffold::{CLIENT_CONFIG, FileAction, ScaffoldOptions, client_config, scaffold_project};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn opts(dir: &Path, force: bool, dry_run: bool) -> ScaffoldOptions {
    ScaffoldOptions {
        target_dir: dir.to_path_buf(),
        force,
        dry_run,
    }
}

#[test]
fn init_creates_the_documented_layout() {
    let tmp = tempdir().unwrap();
    let report = scaffold_project(&opts(tmp.path(), false, false), &HandoffConfig::default()).unwrap();

    for dir in [
        "docs/01_Goals_and_Status",
        "docs/02_Architecture_and_Usage",
        "docs/03_History_and_Lessons",
        "docs/04_User_Facing",
    ] {
        assert!(tmp.path().join(dir).join("README.md").is_file(), "{dir}");
    }
    assert!(tmp.path().join("docs/history").is_dir());
    assert!(tmp.path().join("docs/agentreadme.md").is_file());
    assert_eq!(report.count(FileAction::Wrote), 7);

    let cfg = config::load_config(tmp.path()).unwrap();
    assert_eq!(cfg, HandoffConfig::default());
}

#[test]
fn rerun_keeps_existing_files_unless_forced() {
    let tmp = tempdir().unwrap();
    let cfg = HandoffConfig::default();
    scaffold_project(&opts(tmp.path(), false, false), &cfg).unwrap();
    let readme = tmp.path().join("docs/agentreadme.md");
    fs::write(&readme, "# my notes\n").unwrap();

    let again = scaffold_project(&opts(tmp.path(), false, false), &cfg).unwrap();
    assert_eq!(again.count(FileAction::Skipped), 7);
    assert_eq!(fs::read_to_string(&readme).unwrap(), "# my notes\n");

    let forced = scaffold_project(&opts(tmp.path(), true, false), &cfg).unwrap();
    assert_eq!(forced.count(FileAction::Overwrote), 7);
    assert_ne!(fs::read_to_string(&readme).unwrap(), "# my notes\n");
}

#[test]
fn dry_run_writes_nothing() {
    let tmp = tempdir().unwrap();
    let target = tmp.path().join("fresh");
    let report = scaffold_project(&opts(&target, false, true), &HandoffConfig::default()).unwrap();
    assert_eq!(report.count(FileAction::WouldWrite), 7);
    assert!(!report.directories.is_empty());
    assert!(!target.exists());
    assert!(report.files.contains(&(target.join(CLIENT_CONFIG), FileAction::WouldWrite)));
}

#[test]
fn init_writes_mcp_client_config() {
    let tmp = tempdir().unwrap();
    scaffold_project(&opts(tmp.path(), false, false), &HandoffConfig::default()).unwrap();

    let path = tmp.path().join(".vscode/mcp.json");
    assert_eq!(path, tmp.path().join(CLIENT_CONFIG));
    let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let server = &written["servers"]["handoff"];
    assert_eq!(server["type"], "stdio");
    assert_eq!(server["command"], "handoff");
    assert_eq!(server["args"], json!(["serve"]));
    assert_eq!(server["cwd"], tmp.path().display().to_string());
    assert_eq!(written, client_config(tmp.path()));
}

#[test]
fn client_config_is_kept_unless_forced() {
    let tmp = tempdir().unwrap();
    let cfg = HandoffConfig::default();
    let path = tmp.path().join(CLIENT_CONFIG);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{\"servers\":{\"mine\":{}}}").unwrap();

    let report = scaffold_project(&opts(tmp.path(), false, false), &cfg).unwrap();
    assert!(report.files.contains(&(path.clone(), FileAction::Skipped)));
    assert!(fs::read_to_string(&path).unwrap().contains("mine"));

    let preview = scaffold_project(&opts(tmp.path(), true, true), &cfg).unwrap();
    assert!(preview.files.contains(&(path.clone(), FileAction::WouldWrite)));
    assert!(fs::read_to_string(&path).unwrap().contains("mine"));

    scaffold_project(&opts(tmp.path(), true, false), &cfg).unwrap();
    let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(written["servers"]["handoff"].is_object());
}

#[test]
fn layout_follows_configured_locations() {
    let tmp = tempdir().unwrap();
    let cfg = config::parse_config(
        "knowledge_root = \"kb\"\nhandoff_document = \"HANDOFF.md\"\nhistory_dir = \"sessions\"\n",
    )
    .unwrap();
    scaffold_project(&opts(tmp.path(), false, false), &cfg).unwrap();

    assert!(tmp.path().join("kb/HANDOFF.md").is_file());
    assert!(tmp.path().join("kb/sessions").is_dir());
    assert!(tmp.path().join("kb/04_User_Facing/README.md").is_file());
    assert!(!tmp.path().join("docs").exists());
}

#[test]
fn scaffolded_project_serves_its_handoff_document() {
    let tmp = tempdir().unwrap();
    let cfg = HandoffConfig::default();
    scaffold_project(&opts(tmp.path(), false, false), &cfg).unwrap();

    let mut d = ToolDispatcher::from_config(tmp.path(), &cfg).unwrap();
    let ToolResponse::Success(started) = d.call("start_work", &json!({ "user_goal": "first task" })) else {
        panic!("start_work failed");
    };
    let doc = started["handoff_document"]["content"].as_str().unwrap();
    assert!(doc.starts_with("# Agent README"));

    let ToolResponse::Success(listed) = d.call("list_files", &json!({})) else {
        panic!("list_files failed");
    };
    let names: Vec<&str> = listed["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "01_Goals_and_Status",
            "02_Architecture_and_Usage",
            "03_History_and_Lessons",
            "04_User_Facing",
            "agentreadme.md",
            "history",
        ]
    );
}
