//! Cloud toolkit error types

use thiserror::Error;

/// Errors raised while describing, synthesizing, deploying or destroying stacks
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid stack definition: {0}")]
    InvalidDefinition(String),

    #[error("Stack not found: {0}")]
    StackNotFound(String),

    #[error("No stacks match the selection: {0}")]
    NoStacksMatched(String),

    #[error("Invalid stack pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Deployment of {stack} failed ({status}): {reason}")]
    DeployFailed {
        stack: String,
        status: String,
        reason: String,
    },

    #[error("Destruction of {stack} failed ({status}): {reason}")]
    DestroyFailed {
        stack: String,
        status: String,
        reason: String,
    },

    #[error("Asset error: {0}")]
    AssetError(String),

    #[error("Function invocation failed: {0}")]
    InvokeFailed(String),

    #[error("Assembly error: {0}")]
    AssemblyError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
