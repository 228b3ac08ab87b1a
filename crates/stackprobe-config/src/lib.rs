pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "STACKPROBE_CONFIG_PATH";
const CANDIDATES: [&str; 4] = [
    "stackprobe.local.yaml",
    ".stackprobe.local.yaml",
    "stackprobe.yaml",
    ".stackprobe.yaml",
];

/// stackprobe の設定
///
/// すべての項目にデフォルト値があるため、設定ファイルがなくても動作する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// デプロイするスタック名
    pub stack_name: String,
    /// AWS リージョン（省略時は SDK のデフォルトチェーン）
    pub region: Option<String>,
    /// コードアセットのアップロード先バケット
    pub asset_bucket: Option<String>,
    /// クラウドアセンブリの出力先
    pub out_dir: PathBuf,
    /// バケットとテーブルの削除ポリシー
    pub removal_policy: Removal,
    pub function: FunctionConfig,
    pub table: TableConfig,
    pub test: TestConfig,
    pub wait: WaitSettings,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            stack_name: "TestFeatureStack".to_string(),
            region: None,
            asset_bucket: None,
            out_dir: PathBuf::from("stackprobe.out"),
            removal_policy: Removal::default(),
            function: FunctionConfig::default(),
            table: TableConfig::default(),
            test: TestConfig::default(),
            wait: WaitSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    #[default]
    Retain,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionConfig {
    pub runtime: String,
    pub handler: String,
    /// コードのディレクトリ（省略時は組み込みのハンドラをインラインで使う）
    pub code_dir: Option<PathBuf>,
    pub memory_size: Option<u32>,
    pub timeout_secs: Option<u32>,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            runtime: "nodejs20.x".to_string(),
            handler: "index.handler".to_string(),
            code_dir: None,
            memory_size: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    pub partition_key: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            partition_key: "id".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    /// 関数に渡すペイロード
    pub payload: serde_json::Value,
    /// レスポンスの status がこの値なら成功
    pub expected_status: String,
    /// 関数 ARN を公開するスタック出力のキー
    pub output_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            payload: serde_json::json!({ "payload": "test-successful" }),
            expected_status: "ok".to_string(),
            output_key: "LambdaFunctionArn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitSettings {
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            timeout_secs: 30 * 60,
        }
    }
}

impl ProbeConfig {
    /// 設定値の整合性を確認
    pub fn validate(&self) -> Result<()> {
        if self.stack_name.trim().is_empty() {
            return Err(ConfigError::Invalid("stack_name が空です".to_string()));
        }
        if self.test.output_key.trim().is_empty() {
            return Err(ConfigError::Invalid("test.output_key が空です".to_string()));
        }
        if self.wait.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "wait.poll_interval_secs は 1 以上にしてください".to_string(),
            ));
        }
        if self.wait.timeout_secs < self.wait.poll_interval_secs {
            return Err(ConfigError::Invalid(
                "wait.timeout_secs は wait.poll_interval_secs 以上にしてください".to_string(),
            ));
        }
        Ok(())
    }

    /// code_dir の相対パスを設定ファイルのディレクトリ基準に解決
    fn resolve_paths(&mut self, base: &Path) {
        if let Some(code_dir) = &self.function.code_dir {
            if code_dir.is_relative() {
                self.function.code_dir = Some(base.join(code_dir));
            }
        }
    }
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 STACKPROBE_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stackprobe.local.yaml, .stackprobe.local.yaml, stackprobe.yaml, .stackprobe.yaml
/// 3. ./.stackprobe/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackprobe/stackprobe.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.stackprobe/ ディレクトリで検索
    let probe_dir = current_dir.join(".stackprobe");
    if probe_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = probe_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackprobe").join("stackprobe.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// 指定したファイルから設定を読み込む
pub fn load_config(path: &Path) -> Result<ProbeConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: ProbeConfig = if content.trim().is_empty() {
        ProbeConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?
    };

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;
    Ok(config)
}

/// 設定ファイルを探して読み込む。見つからなければデフォルト値を返す
pub fn discover() -> Result<(Option<PathBuf>, ProbeConfig)> {
    match find_config_file() {
        Ok(path) => {
            let config = load_config(&path)?;
            Ok((Some(path), config))
        }
        Err(ConfigError::ConfigFileNotFound) => Ok((None, ProbeConfig::default())),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.stack_name, "TestFeatureStack");
        assert_eq!(config.test.expected_status, "ok");
        assert_eq!(config.test.output_key, "LambdaFunctionArn");
        assert_eq!(
            config.test.payload,
            serde_json::json!({ "payload": "test-successful" })
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackprobe.yaml");
        fs::write(
            &path,
            "stack_name: MyProbe\n\
             removal_policy: destroy\n\
             function:\n  code_dir: lambda\n\
             test:\n  payload:\n    payload: test-failed\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.stack_name, "MyProbe");
        assert_eq!(config.removal_policy, Removal::Destroy);
        assert_eq!(config.function.runtime, "nodejs20.x");
        assert_eq!(
            config.function.code_dir,
            Some(temp_dir.path().join("lambda"))
        );
        assert_eq!(config.out_dir, PathBuf::from("stackprobe.out"));
        assert_eq!(
            config.test.payload,
            serde_json::json!({ "payload": "test-failed" })
        );
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackprobe.yaml");
        fs::write(&path, "").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.stack_name, "TestFeatureStack");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackprobe.yaml");
        fs::write(&path, "stak_name: Typo\n").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_wait_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackprobe.yaml");
        fs::write(&path, "wait:\n  poll_interval_secs: 0\n").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackprobe.yaml"), "# test").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();
        assert!(result.is_ok());
        assert!(result.unwrap().ends_with("stackprobe.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackprobe.yaml"), "# shared").unwrap();
        fs::write(temp_dir.path().join("stackprobe.local.yaml"), "# local").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file().unwrap();

        // stackprobe.local.yaml が優先される
        assert!(result.ends_with("stackprobe.local.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_probe_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let probe_dir = temp_dir.path().join(".stackprobe");
        fs::create_dir(&probe_dir).unwrap();
        fs::write(probe_dir.join("stackprobe.yaml"), "# in probe dir").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file().unwrap();
        assert!(result.ends_with(".stackprobe/stackprobe.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "# custom").unwrap();

        unsafe {
            std::env::set_var(CONFIG_ENV, config_path.to_str().unwrap());
        }

        let result = find_config_file().unwrap();
        assert_eq!(result, config_path);

        unsafe {
            std::env::remove_var(CONFIG_ENV);
        }
    }

    #[test]
    #[serial]
    fn test_discover_without_file_returns_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        // グローバル設定が存在する環境では検証できない
        let has_global = dirs::config_dir()
            .map(|d| d.join("stackprobe").join("stackprobe.yaml").exists())
            .unwrap_or(false);
        if !has_global {
            let (path, config) = discover().unwrap();
            assert!(path.is_none());
            assert_eq!(config, ProbeConfig::default());
        }

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_discover_leaves_home_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let home = temp_dir.path().join("home");
        fs::create_dir(&home).unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let original_home = std::env::var_os("HOME");
        let original_xdg = std::env::var_os("XDG_CONFIG_HOME");

        std::env::set_current_dir(temp_dir.path()).unwrap();
        unsafe {
            std::env::set_var("HOME", &home);
            std::env::remove_var("XDG_CONFIG_HOME");
            std::env::remove_var(CONFIG_ENV);
        }

        let result = discover();

        std::env::set_current_dir(original_dir).unwrap();
        unsafe {
            match original_home {
                Some(value) => std::env::set_var("HOME", value),
                None => std::env::remove_var("HOME"),
            }
            if let Some(value) = original_xdg {
                std::env::set_var("XDG_CONFIG_HOME", value);
            }
        }

        let (path, config) = result.unwrap();
        assert!(path.is_none());
        assert_eq!(config, ProbeConfig::default());
        assert_eq!(fs::read_dir(&home).unwrap().count(), 0);
    }
}
