use crate::context::Context;
use crate::utils;
use colored::Colorize;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "クラウドアセンブリを生成中...".yellow());
    ctx.print_loaded_config();

    let assembly = ctx.synthesize().await?;

    println!();
    println!(
        "{}",
        format!("スタック一覧 ({} 個):", assembly.stacks.len()).bold()
    );
    for stack in &assembly.stacks {
        println!(
            "  • {} → {}",
            stack.stack_name.cyan(),
            stack.template_file
        );
        for asset in &stack.assets {
            println!(
                "    ↳ アセット {} ({})",
                asset.logical_id,
                asset.source.display()
            );
        }
    }

    println!();
    utils::success_log(format!(
        "✓ {} に出力しました",
        ctx.config.out_dir.display()
    ));
    Ok(())
}
