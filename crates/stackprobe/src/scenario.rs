//! デプロイ → 呼び出し → 削除 の一連の流れ

use crate::utils::{self, error_log, success_log};
use colored::Colorize;
use stackprobe_cloud::{
    CloudAssembly, DeployedStack, FunctionInvoker, InvokeResponse, StackSelector, Toolkit,
};
use stackprobe_config::ProbeConfig;

/// 一回分のテスト内容
#[derive(Debug, Clone)]
pub struct Scenario {
    pub stack_name: String,
    /// 関数 ARN を出力しているスタック出力のキー
    pub output_key: String,
    pub payload: serde_json::Value,
    /// 応答の `status` がこの値ならテスト成功
    pub expected_status: String,
}

/// テスト結果
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// デプロイに使った Toolkit の名前
    pub toolkit: String,
    pub function_arn: String,
    pub response: InvokeResponse,
    pub passed: bool,
}

impl Scenario {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            stack_name: config.stack_name.clone(),
            output_key: config.test.output_key.clone(),
            payload: config.test.payload.clone(),
            expected_status: config.test.expected_status.clone(),
        }
    }

    pub fn selector(&self) -> StackSelector {
        StackSelector::must_match([self.stack_name.clone()])
    }

    /// 一連の流れを実行する
    ///
    /// 途中で失敗した場合はスタックの削除を一度だけ試みてから元のエラーを返す。
    /// アセンブリの生成に失敗した場合は削除するものがないのでそのまま返す。
    pub async fn run<F>(
        &self,
        toolkit: &dyn Toolkit,
        invoker: &dyn FunctionInvoker,
        build_assembly: F,
    ) -> anyhow::Result<ScenarioOutcome>
    where
        F: FnOnce() -> anyhow::Result<CloudAssembly>,
    {
        let assembly = match build_assembly() {
            Ok(assembly) => assembly,
            Err(e) => {
                error_log("テスト中にエラーが発生しました:");
                error_log(format!("{:#}", e));
                return Err(e);
            }
        };

        match self.exercise(toolkit, invoker, &assembly).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error_log("テスト中にエラーが発生しました:");
                error_log(format!("{:#}", e));

                if let Err(cleanup) = self.destroy(toolkit, &assembly).await {
                    error_log("エラー後のスタックのクリーンアップに失敗しました:");
                    error_log(format!("{:#}", cleanup));
                }
                Err(e)
            }
        }
    }

    async fn exercise(
        &self,
        toolkit: &dyn Toolkit,
        invoker: &dyn FunctionInvoker,
        assembly: &CloudAssembly,
    ) -> anyhow::Result<ScenarioOutcome> {
        let stack = self.deploy(toolkit, assembly).await?;
        let function_arn = self.function_arn(&stack)?;
        success_log(format!("Lambda 関数 ARN: {}", function_arn));

        let (response, passed) = self.invoke(invoker, &function_arn).await?;

        self.destroy(toolkit, assembly).await?;

        Ok(ScenarioOutcome {
            toolkit: toolkit.name().to_string(),
            function_arn,
            response,
            passed,
        })
    }

    /// スタックをデプロイし、デプロイ済みスタックの情報を返す
    pub async fn deploy(
        &self,
        toolkit: &dyn Toolkit,
        assembly: &CloudAssembly,
    ) -> anyhow::Result<DeployedStack> {
        println!(
            "{}",
            format!(
                "スタックをデプロイ中: {} ({})...",
                self.stack_name,
                toolkit.name()
            )
            .yellow()
        );
        let result = toolkit.deploy(assembly, &self.selector()).await?;

        let stack = result.stack(&self.stack_name).cloned().ok_or_else(|| {
            anyhow::anyhow!(
                "デプロイ後にスタック {} が見つかりません",
                self.stack_name
            )
        })?;
        tracing::debug!(
            "Deployed {} ({}) in {}ms",
            stack.stack_name,
            stack.action,
            result.duration_ms
        );
        success_log("デプロイが完了しました。");
        Ok(stack)
    }

    fn function_arn(&self, stack: &DeployedStack) -> anyhow::Result<String> {
        stack
            .output(&self.output_key)
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "スタック {} に出力 {} がありません",
                    stack.stack_name,
                    self.output_key
                )
            })
    }

    /// 関数を呼び出し、応答と判定結果を返す
    pub async fn invoke(
        &self,
        invoker: &dyn FunctionInvoker,
        function: &str,
    ) -> anyhow::Result<(InvokeResponse, bool)> {
        println!(
            "{}",
            "テスト用ペイロードで Lambda 関数を呼び出し中...".yellow()
        );
        let response = invoker.invoke(function, &self.payload).await?;

        if let Some(function_error) = &response.function_error {
            tracing::warn!("Function error: {}", function_error);
        }

        let passed = response.status_field() == Some(self.expected_status.as_str());
        if passed {
            success_log("テスト成功");
        } else {
            error_log("テスト失敗");
        }
        println!("応答:");
        println!("{}", utils::pretty_json(&response.payload));

        Ok((response, passed))
    }

    /// スタックを削除する
    pub async fn destroy(
        &self,
        toolkit: &dyn Toolkit,
        assembly: &CloudAssembly,
    ) -> anyhow::Result<()> {
        println!(
            "{}",
            format!(
                "スタックを削除中: {} ({})...",
                self.stack_name,
                toolkit.name()
            )
            .yellow()
        );

        let outcome = match toolkit.destroy(assembly, &self.selector()).await {
            Ok(result) if result.is_success() => Ok(()),
            Ok(result) => Err(anyhow::anyhow!(result.failure_summary())),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => {
                success_log("スタックを削除しました。");
                Ok(())
            }
            Err(e) => {
                error_log("スタック削除中にエラーが発生しました:");
                error_log(format!("{:#}", e));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_stack;
    use async_trait::async_trait;
    use serde_json::json;
    use stackprobe_cloud::{
        AuthStatus, CloudError, DeployResult, DestroyResult, StackAction,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    const ARN: &str = "arn:aws:lambda:ap-northeast-1:123456789012:function:TestLambda";

    /// 呼び出し履歴を記録する Toolkit
    #[derive(Default)]
    struct FakeToolkit {
        calls: Mutex<Vec<String>>,
        deploy_error: bool,
        omit_stack: bool,
        omit_output: bool,
        destroy_failures: Mutex<usize>,
    }

    impl FakeToolkit {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn failing_destroy(times: usize) -> Self {
            Self {
                destroy_failures: Mutex::new(times),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Toolkit for FakeToolkit {
        fn name(&self) -> &str {
            "fake"
        }

        async fn check_auth(&self) -> stackprobe_cloud::Result<AuthStatus> {
            Ok(AuthStatus::ok("test"))
        }

        async fn deploy(
            &self,
            assembly: &CloudAssembly,
            selector: &StackSelector,
        ) -> stackprobe_cloud::Result<DeployResult> {
            self.calls.lock().unwrap().push("deploy".to_string());
            if self.deploy_error {
                return Err(CloudError::DeployFailed {
                    stack: "TestFeatureStack".to_string(),
                    status: "ROLLBACK_COMPLETE".to_string(),
                    reason: "TestLambda: access denied".to_string(),
                });
            }

            let mut result = DeployResult::new();
            if self.omit_stack {
                return Ok(result);
            }
            for artifact in assembly.select(selector)? {
                let mut outputs = HashMap::new();
                if !self.omit_output {
                    outputs.insert("LambdaFunctionArn".to_string(), ARN.to_string());
                }
                result.stacks.push(DeployedStack {
                    stack_name: artifact.stack_name.clone(),
                    stack_id: format!("stack/{}", artifact.stack_name),
                    action: StackAction::Create,
                    outputs,
                });
            }
            Ok(result)
        }

        async fn destroy(
            &self,
            assembly: &CloudAssembly,
            selector: &StackSelector,
        ) -> stackprobe_cloud::Result<DestroyResult> {
            self.calls.lock().unwrap().push("destroy".to_string());
            let mut result = DestroyResult::new();
            let mut failures = self.destroy_failures.lock().unwrap();
            for artifact in assembly.select(selector)? {
                if *failures > 0 {
                    *failures -= 1;
                    result.add_failure(
                        artifact.stack_name.clone(),
                        "DELETE_FAILED: bucket not empty".to_string(),
                    );
                } else {
                    result.add_success(artifact.stack_name.clone(), "deleted".to_string());
                }
            }
            Ok(result)
        }

        async fn stack_outputs(
            &self,
            _stack_name: &str,
        ) -> stackprobe_cloud::Result<Option<HashMap<String, String>>> {
            Ok(None)
        }
    }

    /// 決まった応答本文を返す Invoker
    struct FakeInvoker {
        body: Option<Vec<u8>>,
        invoked: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl FakeInvoker {
        fn returning(payload: serde_json::Value) -> Self {
            Self::raw(payload.to_string().as_bytes())
        }

        fn raw(body: &[u8]) -> Self {
            Self {
                body: Some(body.to_vec()),
                invoked: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                body: None,
                invoked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FunctionInvoker for FakeInvoker {
        async fn invoke(
            &self,
            function: &str,
            payload: &serde_json::Value,
        ) -> stackprobe_cloud::Result<InvokeResponse> {
            self.invoked
                .lock()
                .unwrap()
                .push((function.to_string(), payload.clone()));
            match &self.body {
                Some(body) => Ok(InvokeResponse {
                    status_code: 200,
                    function_error: None,
                    payload: InvokeResponse::parse_payload(body)?,
                }),
                None => Err(CloudError::InvokeFailed("throttled".to_string())),
            }
        }
    }

    fn scenario() -> Scenario {
        Scenario::from_config(&ProbeConfig::default())
    }

    fn assembly() -> anyhow::Result<CloudAssembly> {
        let stack = demo_stack::build_demo_stack(&ProbeConfig::default())?;
        Ok(CloudAssembly::from_definitions(&[stack])?)
    }

    #[test]
    fn test_from_config_defaults() {
        let scenario = scenario();
        assert_eq!(scenario.stack_name, "TestFeatureStack");
        assert_eq!(scenario.output_key, "LambdaFunctionArn");
        assert_eq!(scenario.expected_status, "ok");
        assert_eq!(scenario.payload, json!({"payload": "test-successful"}));
    }

    #[tokio::test]
    async fn test_run_passes() {
        let toolkit = FakeToolkit::default();
        let invoker = FakeInvoker::returning(json!({"status": "ok"}));

        let outcome = scenario().run(&toolkit, &invoker, assembly).await.unwrap();

        assert!(outcome.passed);
        assert_eq!(outcome.toolkit, "fake");
        assert_eq!(outcome.function_arn, ARN);
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);

        let invoked = invoker.invoked.lock().unwrap();
        assert_eq!(invoked.len(), 1);
        assert_eq!(invoked[0].0, ARN);
        assert_eq!(invoked[0].1, json!({"payload": "test-successful"}));
    }

    #[tokio::test]
    async fn test_run_reports_failed_status_and_still_destroys() {
        let toolkit = FakeToolkit::default();
        let invoker = FakeInvoker::returning(json!({"status": "failed"}));

        let outcome = scenario().run(&toolkit, &invoker, assembly).await.unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.response.status_field(), Some("failed"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
    }

    #[tokio::test]
    async fn test_run_missing_status_is_failure() {
        let toolkit = FakeToolkit::default();
        let invoker = FakeInvoker::returning(json!("plain text"));

        let outcome = scenario().run(&toolkit, &invoker, assembly).await.unwrap();
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn test_deploy_error_triggers_cleanup() {
        let toolkit = FakeToolkit {
            deploy_error: true,
            ..Default::default()
        };
        let invoker = FakeInvoker::returning(json!({"status": "ok"}));

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("ROLLBACK_COMPLETE"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
        assert!(invoker.invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_stack_in_deploy_result() {
        let toolkit = FakeToolkit {
            omit_stack: true,
            ..Default::default()
        };
        let invoker = FakeInvoker::returning(json!({"status": "ok"}));

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("TestFeatureStack"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
    }

    #[tokio::test]
    async fn test_missing_output_triggers_cleanup() {
        let toolkit = FakeToolkit {
            omit_output: true,
            ..Default::default()
        };
        let invoker = FakeInvoker::returning(json!({"status": "ok"}));

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("LambdaFunctionArn"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
        assert!(invoker.invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_error_triggers_cleanup() {
        let toolkit = FakeToolkit::default();
        let invoker = FakeInvoker::failing();

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("throttled"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
    }

    #[tokio::test]
    async fn test_non_json_response_triggers_cleanup() {
        let toolkit = FakeToolkit::default();
        let invoker = FakeInvoker::raw(b"Internal Server Error");

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not JSON"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
    }

    #[tokio::test]
    async fn test_empty_response_triggers_cleanup() {
        let toolkit = FakeToolkit::default();
        let invoker = FakeInvoker::raw(b"");

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("empty response"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
    }

    #[tokio::test]
    async fn test_destroy_failure_is_retried_once() {
        let toolkit = FakeToolkit::failing_destroy(1);
        let invoker = FakeInvoker::returning(json!({"status": "ok"}));

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bucket not empty"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy", "destroy"]);
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_original_error() {
        let toolkit = FakeToolkit {
            omit_output: true,
            destroy_failures: Mutex::new(1),
            ..Default::default()
        };
        let invoker = FakeInvoker::returning(json!({"status": "ok"}));

        let err = scenario()
            .run(&toolkit, &invoker, assembly)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("LambdaFunctionArn"));
        assert_eq!(toolkit.calls(), vec!["deploy", "destroy"]);
    }

    #[tokio::test]
    async fn test_assembly_error_skips_cleanup() {
        let toolkit = FakeToolkit::default();
        let invoker = FakeInvoker::returning(json!({"status": "ok"}));

        let err = scenario()
            .run(&toolkit, &invoker, || {
                Err(anyhow::anyhow!("synthesis failed"))
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("synthesis failed"));
        assert!(toolkit.calls().is_empty());
    }
}
