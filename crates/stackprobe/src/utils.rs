use colored::Colorize;
use std::fmt::Display;

/// 成功メッセージを表示（標準出力、緑の太字）
pub fn success_log(message: impl Display) {
    println!("{}", message.to_string().green().bold());
}

/// エラーメッセージを表示（標準エラー出力、赤の太字）
pub fn error_log(message: impl Display) {
    eprintln!("{}", message.to_string().red().bold());
}

/// コマンドラインで渡された JSON ペイロードを解析
pub fn parse_payload(raw: &str) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("ペイロードが JSON として解析できません: {}", e))
}

/// JSON を見やすく整形（失敗時はそのまま文字列化）
pub fn pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
