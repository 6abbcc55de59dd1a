//! Tool-call envelopes.
//!
//! A call is a tool name plus an argument object. The answer is either the
//! tool's own payload or an [`ErrorEnvelope`]:
//!
//! ```json
//! { "error": { "code": "WORKFLOW_VIOLATION", "message": "...", "suggestion": "..." } }
//! ```
//!
//! Errors stay as [`HandoffError`] values inside the crate and are turned
//! into envelopes only here, at the edge.

use crate::core::error::HandoffError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One tool invocation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl From<&HandoffError> for ErrorEnvelope {
    fn from(err: &HandoffError) -> Self {
        ErrorEnvelope {
            error: ErrorBody {
                code: err.code().to_string(),
                message: err.to_string(),
                suggestion: err.suggestion(),
            },
        }
    }
}

/// Outcome of a tool call, ready for encoding.
#[derive(Debug, Clone)]
pub enum ToolResponse {
    Success(Value),
    Failure(ErrorEnvelope),
}

impl ToolResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResponse::Failure(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            ToolResponse::Success(v) => v.clone(),
            ToolResponse::Failure(env) => serde_json::to_value(env).unwrap_or_else(|_| {
                json!({ "error": { "code": env.error.code, "message": env.error.message } })
            }),
        }
    }
}

impl From<Result<Value, HandoffError>> for ToolResponse {
    fn from(result: Result<Value, HandoffError>) -> Self {
        match result {
            Ok(v) => ToolResponse::Success(v),
            Err(e) => ToolResponse::Failure(ErrorEnvelope::from(&e)),
        }
    }
}

/// Discovery entry for one tool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ===== Argument extraction =====

pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, HandoffError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HandoffError::InvalidInput(format!("missing string argument '{}'", key)))
}

pub fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, HandoffError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(HandoffError::InvalidInput(format!(
            "argument '{}' must be a string",
            key
        ))),
    }
}

pub fn required_str_list(args: &Value, key: &str) -> Result<Vec<String>, HandoffError> {
    let items = args
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| HandoffError::InvalidInput(format!("missing list argument '{}'", key)))?;
    items
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                HandoffError::InvalidInput(format!("every item of '{}' must be a string", key))
            })
        })
        .collect()
}
