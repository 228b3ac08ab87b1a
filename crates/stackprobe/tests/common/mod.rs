use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// 一時ディレクトリ上のテスト用プロジェクト
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        let path = self.root.path().join("stackprobe.yaml");
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_function_code(&self, dir: &str, file: &str, content: &str) {
        let dir = self.root.path().join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクト直下で実行する stackprobe コマンド
    ///
    /// ホームの設定ファイルや環境変数の影響を受けないようにしておく。
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("stackprobe").unwrap();
        cmd.current_dir(self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env("HOME", self.path())
            .env_remove("STACKPROBE_CONFIG_PATH")
            .env_remove("STACKPROBE_STACK")
            .env_remove("RUST_LOG");
        cmd
    }
}
