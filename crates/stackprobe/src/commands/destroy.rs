use crate::context::Context;
use crate::scenario::Scenario;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    ctx.print_loaded_config();
    let scenario = Scenario::from_config(&ctx.config);

    let assembly = ctx.assembly_for_destroy().await?;
    let clients = ctx.aws().await;
    if scenario.destroy(&clients.toolkit, &assembly).await.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
