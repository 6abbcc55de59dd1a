use handoff::core::audit::AuditLog;
use handoff::core::dispatch::ToolDispatcher;
use handoff::core::store::KnowledgeStore;
use handoff::core::transport::{self, PROTOCOL_VERSION};
use handoff::core::workflow::WorkflowStateMachine;
use serde_json::{Value, json};
use std::fs;
use std::io::Cursor;
use tempfile::{TempDir, tempdir};

fn dispatcher() -> (TempDir, ToolDispatcher) {
    let tmp = tempdir().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    let d = ToolDispatcher::new(
        KnowledgeStore::open(&docs).unwrap(),
        WorkflowStateMachine::new(),
        AuditLog::disabled(),
        "agentreadme.md",
        "history",
    );
    (tmp, d)
}

/// Feed `requests` (one per line) through the loop and parse every output line.
fn exchange(d: &mut ToolDispatcher, requests: &[String]) -> Vec<Value> {
    let input = requests.join("\n") + "\n";
    let mut out = Vec::new();
    transport::serve(d, Cursor::new(input.into_bytes()), &mut out).unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn call(id: u64, name: &str, arguments: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
    .to_string()
}

fn tool_payload(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[test]
fn handshake_and_discovery() {
    let (_tmp, mut d) = dispatcher();
    let responses = exchange(
        &mut d,
        &[
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }).to_string(),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }).to_string(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }).to_string(),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }).to_string(),
        ],
    );

    assert_eq!(responses.len(), 3, "notification must not be answered");
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "handoff");
    assert!(responses[0]["result"]["capabilities"]["tools"].is_object());

    let tools = responses[1]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 9);
    assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));

    assert_eq!(responses[2]["id"], 3);
    assert_eq!(responses[2]["result"], json!({}));
}

#[test]
fn tool_calls_carry_payload_or_envelope() {
    let (_tmp, mut d) = dispatcher();
    let responses = exchange(
        &mut d,
        &[
            call(1, "proceed", json!({})),
            call(2, "start_work", json!({ "user_goal": "g" })),
            call(3, "plan_setup", json!({ "plan_steps": ["only step"] })),
        ],
    );
    assert_eq!(responses.len(), 3);

    assert_eq!(responses[0]["result"]["isError"], true);
    let envelope = tool_payload(&responses[0]);
    assert_eq!(envelope["error"]["code"], "WORKFLOW_VIOLATION");
    assert!(envelope["error"]["message"].as_str().is_some());

    assert_eq!(responses[1]["result"]["isError"], false);
    let started = tool_payload(&responses[1]);
    assert!(started["session_id"].as_str().is_some());

    let planned = tool_payload(&responses[2]);
    assert_eq!(planned["session_id"], started["session_id"]);
    assert_eq!(planned["state"], "EXECUTING");
}

#[test]
fn protocol_faults_use_json_rpc_errors() {
    let (_tmp, mut d) = dispatcher();
    let responses = exchange(
        &mut d,
        &[
            "{ this is not json".to_string(),
            String::new(),
            json!({ "jsonrpc": "2.0", "id": 7, "method": "resources/list" }).to_string(),
            json!({ "jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {} }).to_string(),
            json!({ "jsonrpc": "2.0", "id": 9, "method": "ping" }).to_string(),
        ],
    );
    assert_eq!(responses.len(), 4);

    assert_eq!(responses[0]["error"]["code"], -32700);
    assert!(responses[0]["id"].is_null());
    assert_eq!(responses[1]["id"], 7);
    assert_eq!(responses[1]["error"]["code"], -32601);
    assert_eq!(responses[2]["error"]["code"], -32602);
    assert_eq!(responses[3]["id"], 9);
    assert!(responses[3].get("error").is_none());
}

#[test]
fn unknown_tool_is_a_tool_error_not_a_protocol_error() {
    let (_tmp, mut d) = dispatcher();
    let responses = exchange(&mut d, &[call(1, "format_disk", json!({}))]);
    assert_eq!(responses[0]["result"]["isError"], true);
    assert_eq!(tool_payload(&responses[0])["error"]["code"], "UNKNOWN_TOOL");
}

#[test]
fn string_ids_are_echoed() {
    let (_tmp, mut d) = dispatcher();
    let req = json!({ "jsonrpc": "2.0", "id": "abc-1", "method": "ping" }).to_string();
    let responses = exchange(&mut d, &[req]);
    assert_eq!(responses[0]["id"], "abc-1");
    assert_eq!(responses[0]["jsonrpc"], "2.0");
}

#[test]
fn non_utf8_line_is_answered_and_serving_continues() {
    let (_tmp, mut d) = dispatcher();
    let mut input = Vec::new();
    input.extend_from_slice(json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string().as_bytes());
    input.extend_from_slice(b"\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"p\xffng\"}\n");
    input.extend_from_slice(json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }).to_string().as_bytes());
    input.push(b'\n');

    let mut out = Vec::new();
    transport::serve(&mut d, Cursor::new(input), &mut out).unwrap();
    let responses: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["error"]["code"], -32700);
    assert!(responses[1]["id"].is_null());
    assert_eq!(responses[2]["id"], 3);
    assert_eq!(responses[2]["result"], json!({}));
}

#[test]
fn non_object_requests_are_invalid() {
    let (_tmp, mut d) = dispatcher();
    let responses = exchange(
        &mut d,
        &[
            "5".to_string(),
            json!([{ "jsonrpc": "2.0", "id": 1, "method": "ping" }]).to_string(),
            "\"ping\"".to_string(),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }).to_string(),
        ],
    );
    assert_eq!(responses.len(), 4);
    for r in &responses[..3] {
        assert_eq!(r["error"]["code"], -32600, "{r}");
        assert!(r["id"].is_null());
    }
    assert_eq!(responses[3]["id"], 2);
}

#[test]
fn last_line_without_newline_is_served() {
    let (_tmp, mut d) = dispatcher();
    let input = json!({ "jsonrpc": "2.0", "id": 4, "method": "ping" }).to_string();
    let mut out = Vec::new();
    transport::serve(&mut d, Cursor::new(input.into_bytes()), &mut out).unwrap();
    let response: Value = serde_json::from_slice(out.trim_ascii()).unwrap();
    assert_eq!(response["id"], 4);
}
