use crate::demo_stack;
use colored::Colorize;
use stackprobe_cloud::{AssemblyStore, CloudAssembly, WaitConfig};
use stackprobe_cloud_aws::{CloudFormationToolkit, LambdaInvoker};
use stackprobe_config::ProbeConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// コマンドラインで指定された設定の上書き
#[derive(Debug, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub stack: Option<String>,
    pub out: Option<PathBuf>,
}

/// 各コマンドが共有する実行コンテキスト
pub struct Context {
    pub config: ProbeConfig,
    pub config_path: Option<PathBuf>,
}

/// AWS 向けの Toolkit と Invoker
pub struct AwsClients {
    pub toolkit: CloudFormationToolkit,
    pub invoker: LambdaInvoker,
}

impl Context {
    /// 設定ファイルを読み込み、コマンドラインの指定で上書きする
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Self> {
        let (config_path, mut config) = match config_path {
            Some(path) => (
                Some(path.to_path_buf()),
                stackprobe_config::load_config(path)?,
            ),
            None => stackprobe_config::discover()?,
        };

        if let Some(region) = overrides.region {
            config.region = Some(region);
        }
        if let Some(stack) = overrides.stack {
            config.stack_name = stack;
        }
        if let Some(out) = overrides.out {
            config.out_dir = out;
        }
        config.validate()?;

        Ok(Self {
            config,
            config_path,
        })
    }

    /// 読み込んだ設定ファイルを表示
    pub fn print_loaded_config(&self) {
        match &self.config_path {
            Some(path) => println!("📄 設定ファイル: {}", path.display().to_string().cyan()),
            None => println!("📄 設定ファイルなし（デフォルト設定を使用）"),
        }
        println!("スタック: {}", self.config.stack_name.cyan());
        if let Some(region) = &self.config.region {
            println!("リージョン: {}", region.cyan());
        }
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig::new(
            Duration::from_secs(self.config.wait.poll_interval_secs),
            Duration::from_secs(self.config.wait.timeout_secs),
        )
    }

    pub fn store(&self) -> AssemblyStore {
        AssemblyStore::new(&self.config.out_dir)
    }

    pub fn build_assembly(&self) -> stackprobe_cloud::Result<CloudAssembly> {
        CloudAssembly::from_builder(|| Ok(vec![demo_stack::build_demo_stack(&self.config)?]))
    }

    /// アセンブリを生成して出力ディレクトリに書き出す
    pub async fn synthesize(&self) -> anyhow::Result<CloudAssembly> {
        let assembly = self.build_assembly()?;
        self.store().save(&assembly).await?;
        tracing::debug!("Wrote assembly to {}", self.config.out_dir.display());
        Ok(assembly)
    }

    /// 削除対象のアセンブリ
    ///
    /// 前回書き出したアセンブリに対象スタックが含まれていればそれを使い、
    /// なければ現在の設定から生成し直す。
    pub async fn assembly_for_destroy(&self) -> anyhow::Result<CloudAssembly> {
        let store = self.store();
        if store.exists() {
            match store.load().await {
                Ok(assembly) if assembly.stack(&self.config.stack_name).is_some() => {
                    tracing::debug!("Using saved assembly in {}", store.out_dir().display());
                    return Ok(assembly);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Ignoring saved assembly: {}", e),
            }
        }
        self.synthesize().await
    }

    pub async fn aws(&self) -> AwsClients {
        let sdk_config = stackprobe_cloud_aws::load_sdk_config(self.config.region.clone()).await;
        AwsClients {
            toolkit: CloudFormationToolkit::new(
                &sdk_config,
                self.config.asset_bucket.clone(),
                self.wait_config(),
            ),
            invoker: LambdaInvoker::new(&sdk_config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("stackprobe.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_overrides_take_precedence() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(
            temp.path(),
            "stack_name: FileStack\nregion: us-east-1\n",
        );

        let ctx = Context::load(
            Some(&path),
            Overrides {
                region: Some("ap-northeast-1".to_string()),
                stack: Some("FlagStack".to_string()),
                out: Some(temp.path().join("out")),
            },
        )
        .unwrap();

        assert_eq!(ctx.config.stack_name, "FlagStack");
        assert_eq!(ctx.config.region.as_deref(), Some("ap-northeast-1"));
        assert_eq!(ctx.config.out_dir, temp.path().join("out"));
        assert_eq!(ctx.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_file_values_without_overrides() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(
            temp.path(),
            "stack_name: FileStack\nwait:\n  poll_interval_secs: 2\n  timeout_secs: 60\n",
        );

        let ctx = Context::load(Some(&path), Overrides::default()).unwrap();
        assert_eq!(ctx.config.stack_name, "FileStack");
        assert_eq!(
            ctx.wait_config(),
            WaitConfig::new(Duration::from_secs(2), Duration::from_secs(60))
        );
    }

    #[test]
    fn test_discovers_config_from_env() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(temp.path(), "stack_name: EnvStack\n");

        temp_env::with_var("STACKPROBE_CONFIG_PATH", Some(&path), || {
            let ctx = Context::load(None, Overrides::default()).unwrap();
            assert_eq!(ctx.config.stack_name, "EnvStack");
            assert_eq!(ctx.config_path.as_deref(), Some(path.as_path()));
        });
    }

    #[test]
    fn test_empty_stack_override_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(temp.path(), "");

        let result = Context::load(
            Some(&path),
            Overrides {
                stack: Some("  ".to_string()),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_synthesize_and_reuse_for_destroy() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(temp.path(), "");
        let ctx = Context::load(
            Some(&path),
            Overrides {
                out: Some(temp.path().join("stackprobe.out")),
                ..Default::default()
            },
        )
        .unwrap();

        let assembly = ctx.synthesize().await.unwrap();
        assert!(ctx.store().exists());
        assert!(
            temp.path()
                .join("stackprobe.out/TestFeatureStack.template.json")
                .exists()
        );

        let reused = ctx.assembly_for_destroy().await.unwrap();
        assert_eq!(reused.stacks[0].stack_name, "TestFeatureStack");
        assert_eq!(reused.stacks[0].template, assembly.stacks[0].template);
    }

    #[tokio::test]
    async fn test_destroy_resynthesizes_for_other_stack() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(temp.path(), "");
        let out = temp.path().join("stackprobe.out");

        let first = Context::load(
            Some(&path),
            Overrides {
                out: Some(out.clone()),
                ..Default::default()
            },
        )
        .unwrap();
        first.synthesize().await.unwrap();

        let second = Context::load(
            Some(&path),
            Overrides {
                stack: Some("OtherStack".to_string()),
                out: Some(out),
                ..Default::default()
            },
        )
        .unwrap();
        let assembly = second.assembly_for_destroy().await.unwrap();
        assert!(assembly.stack("OtherStack").is_some());
        assert!(assembly.stack("TestFeatureStack").is_none());
    }
}
