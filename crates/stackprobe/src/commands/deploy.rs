use crate::context::Context;
use crate::scenario::Scenario;
use colored::Colorize;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    ctx.print_loaded_config();
    let scenario = Scenario::from_config(&ctx.config);

    let assembly = ctx.synthesize().await?;
    let clients = ctx.aws().await;
    let stack = scenario.deploy(&clients.toolkit, &assembly).await?;

    println!();
    println!("{}", "出力:".bold());
    let mut outputs: Vec<_> = stack.outputs.iter().collect();
    outputs.sort();
    for (key, value) in outputs {
        println!("  {} = {}", key.cyan(), value);
    }
    Ok(())
}
