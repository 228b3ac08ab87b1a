//! CloudFormation toolkit implementation

use crate::assets::AssetPublisher;
use crate::error::{AwsError, Result};
use crate::status::{
    EventRecord, PreDeploy, StackPhase, classify, delete_succeeded, deploy_succeeded, pre_deploy,
};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack};
use stackprobe_cloud::{
    AuthStatus, CloudAssembly, CloudError, DeployResult, DeployedStack, DestroyResult,
    StackAction, StackArtifact, StackSelector, Toolkit, WaitConfig,
};
use std::collections::HashMap;
use std::future::Future;
use tokio::time::sleep;

const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";
const MISSING_STACK_MESSAGE: &str = "does not exist";

/// Deploys cloud assemblies as CloudFormation stacks
pub struct CloudFormationToolkit {
    cfn: aws_sdk_cloudformation::Client,
    sts: aws_sdk_sts::Client,
    assets: AssetPublisher,
    wait: WaitConfig,
}

impl CloudFormationToolkit {
    pub fn new(config: &SdkConfig, asset_bucket: Option<String>, wait: WaitConfig) -> Self {
        Self {
            cfn: aws_sdk_cloudformation::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            assets: AssetPublisher::new(aws_sdk_s3::Client::new(config), asset_bucket),
            wait,
        }
    }

    /// Build from the shared AWS configuration (environment, profile, SSO, ...)
    pub async fn from_env(
        region: Option<String>,
        asset_bucket: Option<String>,
        wait: WaitConfig,
    ) -> Self {
        let config = crate::load_sdk_config(region).await;
        Self::new(&config, asset_bucket, wait)
    }

    /// Current state of a stack, `None` if it does not exist
    async fn describe(&self, stack: &str) -> Result<Option<Stack>> {
        tracing::debug!("DescribeStacks {}", stack);
        match self.cfn.describe_stacks().stack_name(stack).send().await {
            Ok(output) => Ok(output.stacks().first().cloned()),
            Err(e) if is_missing_stack(&e) => Ok(None),
            Err(e) => Err(cfn_error(e)),
        }
    }

    /// Poll until the stack leaves every `*_IN_PROGRESS` status
    async fn wait_until_settled(&self, stack: &str) -> Result<Option<Stack>> {
        poll_until_settled(&self.wait, stack, || self.describe(stack), stack_status).await
    }

    /// Most recent failure reason recorded in the stack events
    async fn failure_reason(&self, stack: &str, fallback: Option<&str>) -> String {
        let fallback = fallback.unwrap_or("no reason reported").to_string();
        let events = match self.cfn.describe_stack_events().stack_name(stack).send().await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Could not read events of {}: {}", stack, DisplayErrorContext(&e));
                return fallback;
            }
        };

        let records: Vec<EventRecord> = events
            .stack_events()
            .iter()
            .map(|event| EventRecord {
                logical_id: event.logical_resource_id().map(str::to_string),
                status: event.resource_status().map(|s| s.as_str().to_string()),
                reason: event.resource_status_reason().map(str::to_string),
            })
            .collect();
        crate::status::failure_reason(&records).unwrap_or(fallback)
    }

    async fn delete_and_wait(&self, stack_name: &str, stack_ref: &str) -> Result<()> {
        self.cfn
            .delete_stack()
            .stack_name(stack_ref)
            .send()
            .await
            .map_err(cfn_error)?;

        let settled = self.wait_until_settled(stack_ref).await?;
        let status = settled.as_ref().map(stack_status);
        if delete_succeeded(status.as_deref()) {
            return Ok(());
        }

        let reason = self
            .failure_reason(
                stack_ref,
                settled.as_ref().and_then(|s| s.stack_status_reason()),
            )
            .await;
        Err(AwsError::Cloud(CloudError::DestroyFailed {
            stack: stack_name.to_string(),
            status: status.unwrap_or_default(),
            reason,
        }))
    }

    async fn deploy_stack(&self, artifact: &StackArtifact) -> Result<DeployedStack> {
        let name = artifact.stack_name.as_str();

        let existing = self.describe(name).await?;
        let existing_status = existing.as_ref().map(stack_status);
        let mut plan = pre_deploy(existing_status.as_deref());
        match plan {
            PreDeploy::Busy => {
                return Err(AwsError::Cloud(CloudError::DeployFailed {
                    stack: name.to_string(),
                    status: existing_status.unwrap_or_default(),
                    reason: "another operation is in progress".to_string(),
                }));
            }
            PreDeploy::Recreate => {
                tracing::warn!(
                    "Stack {} is in {}, deleting before re-create",
                    name,
                    existing_status.as_deref().unwrap_or_default()
                );
                let stack_ref = existing
                    .as_ref()
                    .and_then(|s| s.stack_id())
                    .unwrap_or(name)
                    .to_string();
                self.delete_and_wait(name, &stack_ref).await?;
                plan = PreDeploy::Create;
            }
            PreDeploy::Create | PreDeploy::Update => {}
        }

        let parameters: Vec<Parameter> = self
            .assets
            .publish(name, &artifact.assets)
            .await?
            .into_iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect();
        let parameters = if parameters.is_empty() {
            None
        } else {
            Some(parameters)
        };
        let body = artifact.template_body()?;

        let action = if plan == PreDeploy::Create {
            tracing::info!("Creating stack {}", name);
            self.cfn
                .create_stack()
                .stack_name(name)
                .template_body(body)
                .capabilities(Capability::CapabilityIam)
                .set_parameters(parameters)
                .send()
                .await
                .map_err(cfn_error)?;
            StackAction::Create
        } else {
            tracing::info!("Updating stack {}", name);
            match self
                .cfn
                .update_stack()
                .stack_name(name)
                .template_body(body)
                .capabilities(Capability::CapabilityIam)
                .set_parameters(parameters)
                .send()
                .await
            {
                Ok(_) => StackAction::Update,
                Err(e) if error_message(&e).is_some_and(is_no_updates_message) => {
                    tracing::info!("Stack {} is up to date", name);
                    StackAction::NoOp
                }
                Err(e) => return Err(cfn_error(e)),
            }
        };

        let stack = self.wait_until_settled(name).await?.ok_or_else(|| {
            AwsError::Cloud(CloudError::StackNotFound(format!(
                "{} disappeared during deployment",
                name
            )))
        })?;

        let status = stack_status(&stack);
        if !deploy_succeeded(action, &status) {
            let reason = self.failure_reason(name, stack.stack_status_reason()).await;
            return Err(AwsError::Cloud(CloudError::DeployFailed {
                stack: name.to_string(),
                status,
                reason,
            }));
        }

        Ok(DeployedStack {
            stack_name: name.to_string(),
            stack_id: stack.stack_id().unwrap_or_default().to_string(),
            action,
            outputs: stack_outputs(&stack),
        })
    }

    async fn destroy_stack(&self, stack_name: &str) -> Result<String> {
        let Some(stack) = self.describe(stack_name).await? else {
            return Ok(format!("{} does not exist", stack_name));
        };

        tracing::info!("Deleting stack {}", stack_name);
        let stack_ref = stack.stack_id().unwrap_or(stack_name).to_string();
        self.delete_and_wait(stack_name, &stack_ref).await?;
        Ok(format!("{} deleted", stack_name))
    }
}

#[async_trait]
impl Toolkit for CloudFormationToolkit {
    fn name(&self) -> &str {
        "cloudformation"
    }

    async fn check_auth(&self) -> stackprobe_cloud::Result<AuthStatus> {
        match self.sts.get_caller_identity().send().await {
            Ok(identity) => {
                let account_info = format!(
                    "{} ({})",
                    identity.arn().unwrap_or("unknown"),
                    identity.account().unwrap_or("unknown")
                );
                Ok(AuthStatus::ok(account_info))
            }
            Err(e) => Ok(AuthStatus::failed(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn deploy(
        &self,
        assembly: &CloudAssembly,
        selector: &StackSelector,
    ) -> stackprobe_cloud::Result<DeployResult> {
        let mut result = DeployResult::new();
        let start = std::time::Instant::now();

        for artifact in assembly.select(selector)? {
            let deployed = self.deploy_stack(artifact).await?;
            tracing::info!("Stack {} deployed ({})", deployed.stack_name, deployed.action);
            result.stacks.push(deployed);
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn destroy(
        &self,
        assembly: &CloudAssembly,
        selector: &StackSelector,
    ) -> stackprobe_cloud::Result<DestroyResult> {
        let mut result = DestroyResult::new();
        let start = std::time::Instant::now();

        for artifact in assembly.select(selector)? {
            match self.destroy_stack(&artifact.stack_name).await {
                Ok(message) => result.add_success(artifact.stack_name.clone(), message),
                Err(e) => result.add_failure(artifact.stack_name.clone(), e.to_string()),
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn stack_outputs(
        &self,
        stack_name: &str,
    ) -> stackprobe_cloud::Result<Option<HashMap<String, String>>> {
        let stack = self.describe(stack_name).await?;
        Ok(stack.as_ref().map(stack_outputs))
    }
}

/// Describe `stack` until it is no longer in progress
///
/// Returns `None` once the stack is gone, or a timeout error after
/// `wait.max_polls()` attempts.
async fn poll_until_settled<T, F, Fut>(
    wait: &WaitConfig,
    stack: &str,
    mut describe: F,
    status_of: fn(&T) -> String,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let max_polls = wait.max_polls();
    for attempt in 0..max_polls {
        match describe().await? {
            None => return Ok(None),
            Some(current) => {
                let status = status_of(&current);
                if classify(&status) != StackPhase::InProgress {
                    return Ok(Some(current));
                }
                tracing::debug!("{} is {} (poll {}/{})", stack, status, attempt + 1, max_polls);
            }
        }

        if attempt + 1 < max_polls {
            sleep(wait.poll_interval).await;
        }
    }

    Err(AwsError::Cloud(CloudError::Timeout(format!(
        "stack {} did not settle within {}s",
        stack,
        wait.timeout.as_secs()
    ))))
}

fn stack_outputs(stack: &Stack) -> HashMap<String, String> {
    stack
        .outputs()
        .iter()
        .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value()?.to_string())))
        .collect()
}

fn stack_status(stack: &Stack) -> String {
    stack
        .stack_status()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default()
}

fn error_message<E, R>(error: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    error.as_service_error().and_then(|e| e.message())
}

fn is_missing_stack<E, R>(error: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    error_message(error).is_some_and(is_missing_stack_message)
}

fn is_missing_stack_message(message: &str) -> bool {
    message.contains(MISSING_STACK_MESSAGE)
}

fn is_no_updates_message(message: &str) -> bool {
    message.contains(NO_UPDATES_MESSAGE)
}

fn cfn_error<E, R>(error: SdkError<E, R>) -> AwsError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    AwsError::CloudFormation(DisplayErrorContext(&error).to_string())
}
