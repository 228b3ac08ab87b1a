//! Toolkit and invoker trait definitions

use crate::assembly::{CloudAssembly, StackSelector};
use crate::error::Result;
use crate::result::{DeployResult, DestroyResult, InvokeResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Infrastructure toolkit abstraction
///
/// A toolkit takes a synthesized [`CloudAssembly`] and makes the selected
/// stacks exist (or stop existing) in a cloud account. Ordering, diffing and
/// rollback happen behind this trait.
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Returns the toolkit name (e.g., "cloudformation")
    fn name(&self) -> &str;

    /// Check that credentials are present and valid
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Deploy the selected stacks and wait for the result
    async fn deploy(
        &self,
        assembly: &CloudAssembly,
        selector: &StackSelector,
    ) -> Result<DeployResult>;

    /// Destroy the selected stacks and wait for the result
    async fn destroy(
        &self,
        assembly: &CloudAssembly,
        selector: &StackSelector,
    ) -> Result<DestroyResult>;

    /// Outputs of an already deployed stack, `None` if it does not exist
    async fn stack_outputs(&self, stack_name: &str) -> Result<Option<HashMap<String, String>>>;
}

/// Synchronous invocation of a deployed compute function
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Invoke `function` (name or ARN) with a JSON payload
    async fn invoke(&self, function: &str, payload: &serde_json::Value)
    -> Result<InvokeResponse>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// How long a toolkit waits for a stack operation to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between status checks
    pub poll_interval: Duration,

    /// Give up after this long
    pub timeout: Duration,
}

impl WaitConfig {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Number of status checks that fit in the timeout (at least one)
    pub fn max_polls(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let polls = self.timeout.as_nanos() / self.poll_interval.as_nanos();
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_polls_sub_millisecond_interval() {
        let config = WaitConfig::new(Duration::from_micros(500), Duration::from_secs(5));
        assert_eq!(config.max_polls(), 10_000);

        let config = WaitConfig::new(Duration::from_nanos(1), Duration::from_secs(60));
        assert_eq!(config.max_polls(), u32::MAX);
    }

    #[test]
    fn test_max_polls() {
        let config = WaitConfig::default();
        assert_eq!(config.max_polls(), 360);

        let config = WaitConfig::new(Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(config.max_polls(), 1);

        let config = WaitConfig::new(Duration::ZERO, Duration::from_secs(5));
        assert_eq!(config.max_polls(), 1);
    }

    #[test]
    fn test_auth_status() {
        let ok = AuthStatus::ok("123456789012");
        assert!(ok.authenticated);
        assert_eq!(ok.account_info.as_deref(), Some("123456789012"));

        let failed = AuthStatus::failed("no credentials");
        assert!(!failed.authenticated);
        assert_eq!(failed.error.as_deref(), Some("no credentials"));
    }
}
