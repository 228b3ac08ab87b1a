//! Results of toolkit operations

use crate::error::CloudError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a deploy did to a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackAction {
    /// The stack did not exist and was created
    Create,
    /// The stack existed and was updated
    Update,
    /// The stack already matched the template
    NoOp,
}

impl std::fmt::Display for StackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackAction::Create => write!(f, "create"),
            StackAction::Update => write!(f, "update"),
            StackAction::NoOp => write!(f, "no-op"),
        }
    }
}

/// A stack as it exists after deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedStack {
    pub stack_name: String,

    /// Provider-assigned stack identifier
    pub stack_id: String,

    pub action: StackAction,

    /// Stack outputs by key
    pub outputs: HashMap<String, String>,
}

impl DeployedStack {
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(|s| s.as_str())
    }
}

/// Result of deploying a selection of stacks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployResult {
    pub stacks: Vec<DeployedStack>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl DeployResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a deployed stack by name
    pub fn stack(&self, name: &str) -> Option<&DeployedStack> {
        self.stacks.iter().find(|s| s.stack_name == name)
    }
}

/// Result of destroying a single stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackDestroyOutcome {
    pub stack_name: String,

    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// Result of destroying a selection of stacks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestroyResult {
    pub destroyed: Vec<StackDestroyOutcome>,

    pub failed: Vec<StackDestroyOutcome>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl DestroyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, stack_name: String, message: String) {
        self.destroyed.push(StackDestroyOutcome {
            stack_name,
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, stack_name: String, error: String) {
        self.failed.push(StackDestroyOutcome {
            stack_name,
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }

    /// One line per failed stack, for error reporting
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    f.stack_name,
                    f.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Response of a synchronous function invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Transport-level status code (200 for a completed invocation)
    pub status_code: i32,

    /// Set when the function itself raised an error
    pub function_error: Option<String>,

    /// Parsed JSON response body
    pub payload: serde_json::Value,
}

impl InvokeResponse {
    /// The `status` field of the response body, if it is a string
    pub fn status_field(&self) -> Option<&str> {
        self.payload.get("status").and_then(|v| v.as_str())
    }

    /// Parse a raw response body
    ///
    /// An empty or non-JSON body is an invocation failure.
    pub fn parse_payload(body: &[u8]) -> crate::Result<serde_json::Value> {
        if body.is_empty() {
            return Err(CloudError::InvokeFailed(
                "empty response payload".to_string(),
            ));
        }
        serde_json::from_slice(body).map_err(|e| {
            CloudError::InvokeFailed(format!(
                "response is not JSON ({}): {}",
                e,
                String::from_utf8_lossy(body)
            ))
        })
    }
}
