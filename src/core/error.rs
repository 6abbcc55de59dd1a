use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("{message}")]
    WorkflowViolation {
        message: String,
        suggestion: Option<String>,
    },
    #[error("Path escapes the knowledge root: {0}")]
    InvalidPath(String),
    /// A file where a directory is needed, or the other way round.
    #[error("{0}")]
    PathKind(String),
    #[error("Path is read-only for tools: {0}")]
    ProtectedPath(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
}

impl HandoffError {
    pub fn workflow(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        HandoffError::WorkflowViolation {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Stable machine-readable code carried in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            HandoffError::WorkflowViolation { .. } => "WORKFLOW_VIOLATION",
            HandoffError::InvalidPath(_)
            | HandoffError::PathKind(_)
            | HandoffError::ProtectedPath(_) => "INVALID_PATH",
            HandoffError::NotFound(_) => "FILE_NOT_FOUND",
            HandoffError::InvalidInput(_) => "INVALID_INPUT",
            HandoffError::UnsupportedContent(_) => "UNSUPPORTED_CONTENT",
            HandoffError::UnknownTool(_) => "UNKNOWN_TOOL",
            HandoffError::IoError(_) | HandoffError::JsonError(_) | HandoffError::ConfigError(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            HandoffError::WorkflowViolation { suggestion, .. } => suggestion.clone(),
            HandoffError::InvalidPath(_) => {
                Some("Use paths relative to the knowledge root, without '..' segments".to_string())
            }
            HandoffError::PathKind(_) => {
                Some("Use list_files to see which entries are files and which are directories".to_string())
            }
            HandoffError::ProtectedPath(_) => {
                Some("Session history is written by end_job; keep notes elsewhere under the knowledge root".to_string())
            }
            HandoffError::NotFound(_) => Some("Use list_files to see what exists".to_string()),
            HandoffError::UnknownTool(_) => Some("Call tools/list for the available tools".to_string()),
            _ => None,
        }
    }
}
