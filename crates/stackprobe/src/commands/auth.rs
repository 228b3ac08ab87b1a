use crate::context::Context;
use crate::utils;
use colored::Colorize;
use stackprobe_cloud::Toolkit;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "AWS 認証情報を確認中...".blue());

    let clients = ctx.aws().await;
    let status = clients.toolkit.check_auth().await?;

    if status.authenticated {
        utils::success_log(format!("✓ 認証済み ({})", clients.toolkit.name()));
        if let Some(account) = &status.account_info {
            println!("  アカウント: {}", account.cyan());
        }
        Ok(())
    } else {
        utils::error_log("✗ 認証されていません");
        Err(anyhow::anyhow!(
            "{}",
            status
                .error
                .unwrap_or_else(|| "認証情報が見つかりません".to_string())
        ))
    }
}
