//! Line-delimited JSON-RPC 2.0 over a byte stream (stdio in production).
//!
//! One request per line in, one response per line out. Notifications get no
//! response. Tool results are wrapped as MCP text content; the dispatcher's
//! error envelope travels inside the result with `isError: true`, while
//! JSON-RPC errors are reserved for protocol faults.

use crate::core::dispatch::{ToolDispatcher, tool_definitions};
use crate::core::error::HandoffError;
use crate::core::rpc::{ToolCall, ToolResponse};
use serde_json::{Value, json};
use std::io::{BufRead, Write};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "handoff";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Serve until the reader hits EOF. Only stream I/O failures end the loop;
/// a bad request line gets an error response.
pub fn serve<R: BufRead, W: Write>(
    dispatcher: &mut ToolDispatcher,
    mut reader: R,
    mut writer: W,
) -> Result<(), HandoffError> {
    tracing::info!(protocol = PROTOCOL_VERSION, "transport ready");
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(dispatcher, line.trim()),
            Err(e) => {
                tracing::warn!(error = %e, "request line is not UTF-8");
                Some(rpc_error(&Value::Null, PARSE_ERROR, &format!("parse error: {e}")))
            }
        };
        if let Some(response) = response {
            writeln!(writer, "{}", serde_json::to_string(&response)?)?;
            writer.flush()?;
        }
    }
    tracing::info!("transport closed");
    Ok(())
}

/// Handle one raw request line. `None` means nothing is written back.
pub fn handle_line(dispatcher: &mut ToolDispatcher, line: &str) -> Option<Value> {
    let msg: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "unparsable request line");
            return Some(rpc_error(&Value::Null, PARSE_ERROR, &format!("parse error: {e}")));
        }
    };
    if !msg.is_object() {
        // Batches are not supported; neither are bare values.
        return Some(rpc_error(&Value::Null, INVALID_REQUEST, "request must be a JSON object"));
    }
    let id = msg.get("id").cloned();
    let Some(method) = msg.get("method").and_then(Value::as_str) else {
        return id.map(|id| rpc_error(&id, INVALID_REQUEST, "missing method"));
    };
    tracing::debug!(method, "request");

    let result = match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
        })),
        "notifications/initialized" | "initialized" => return None,
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tool_definitions() })),
        "tools/call" => call_tool(dispatcher, msg.get("params")),
        _ => Err((METHOD_NOT_FOUND, format!("method not found: {method}"))),
    };

    // Requests without an id are notifications.
    let id = id?;
    Some(match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => rpc_error(&id, code, &message),
    })
}

fn call_tool(dispatcher: &mut ToolDispatcher, params: Option<&Value>) -> Result<Value, (i64, String)> {
    let call: ToolCall = params
        .cloned()
        .and_then(|p| serde_json::from_value(p).ok())
        .ok_or_else(|| (INVALID_PARAMS, "tools/call requires params.name".to_string()))?;

    let response = dispatcher.call(&call.name, &call.arguments);
    Ok(tool_result(&response))
}

/// MCP content wrapper around a dispatcher response.
pub fn tool_result(response: &ToolResponse) -> Value {
    let body = response.to_value();
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": response.is_error(),
    })
}

fn rpc_error(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}
