use crate::context::Context;
use crate::scenario::Scenario;
use crate::utils;

pub async fn handle(ctx: &Context, payload: Option<String>, strict: bool) -> anyhow::Result<()> {
    let mut scenario = Scenario::from_config(&ctx.config);
    if let Some(raw) = payload {
        scenario.payload = utils::parse_payload(&raw)?;
    }
    ctx.print_loaded_config();
    println!();

    let clients = ctx.aws().await;
    let assembly = ctx.synthesize().await;

    match scenario
        .run(&clients.toolkit, &clients.invoker, move || assembly)
        .await
    {
        Ok(outcome) => {
            if strict && !outcome.passed {
                utils::error_log(format!(
                    "status が {} ではありませんでした (--strict)",
                    scenario.expected_status
                ));
                std::process::exit(1);
            }
            Ok(())
        }
        // エラー内容は表示済み
        Err(_) => std::process::exit(1),
    }
}
