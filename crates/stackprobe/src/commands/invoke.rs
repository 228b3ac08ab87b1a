use crate::context::Context;
use crate::scenario::Scenario;
use crate::utils;
use stackprobe_cloud::Toolkit;

pub async fn handle(
    ctx: &Context,
    function: Option<String>,
    payload: Option<String>,
) -> anyhow::Result<()> {
    let mut scenario = Scenario::from_config(&ctx.config);
    if let Some(raw) = payload {
        scenario.payload = utils::parse_payload(&raw)?;
    }

    let clients = ctx.aws().await;

    // 関数が指定されていなければデプロイ済みスタックの出力から取得
    let function = match function {
        Some(function) => function,
        None => {
            let outputs = clients
                .toolkit
                .stack_outputs(&scenario.stack_name)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "スタック {} はデプロイされていません",
                        scenario.stack_name
                    )
                })?;
            outputs.get(&scenario.output_key).cloned().ok_or_else(|| {
                anyhow::anyhow!(
                    "スタック {} に出力 {} がありません",
                    scenario.stack_name,
                    scenario.output_key
                )
            })?
        }
    };
    utils::success_log(format!("Lambda 関数 ARN: {}", function));

    scenario.invoke(&clients.invoker, &function).await?;
    Ok(())
}
