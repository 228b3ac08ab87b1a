//! Lambda function invoker

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use stackprobe_cloud::{CloudError, FunctionInvoker, InvokeResponse};

/// Invokes deployed functions synchronously (`RequestResponse`)
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
}

impl LambdaInvoker {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(config),
        }
    }
}

#[async_trait]
impl FunctionInvoker for LambdaInvoker {
    async fn invoke(
        &self,
        function: &str,
        payload: &serde_json::Value,
    ) -> stackprobe_cloud::Result<InvokeResponse> {
        let body = serde_json::to_vec(payload)?;
        tracing::debug!("Invoking {} with {} bytes", function, body.len());

        let output = self
            .client
            .invoke()
            .function_name(function)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(body))
            .send()
            .await
            .map_err(|e| CloudError::InvokeFailed(DisplayErrorContext(&e).to_string()))?;

        if let Some(error) = output.function_error() {
            tracing::warn!("{} returned a function error: {}", function, error);
        }

        let body: &[u8] = output.payload().map(|blob| blob.as_ref()).unwrap_or_default();
        let payload = InvokeResponse::parse_payload(body)?;

        Ok(InvokeResponse {
            status_code: output.status_code(),
            function_error: output.function_error().map(str::to_string),
            payload,
        })
    }
}
