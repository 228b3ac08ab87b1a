//! 検証用スタック (バケット + テーブル + 関数) の定義

use stackprobe_cloud::{
    AttributeDef, BucketProps, EnvValue, FunctionCode, FunctionProps, OutputValue, RemovalPolicy,
    StackBuilder, StackDefinition, TableProps,
};
use stackprobe_config::{ProbeConfig, Removal};

pub const BUCKET_ID: &str = "TestBucket";
pub const TABLE_ID: &str = "TestTable";
pub const FUNCTION_ID: &str = "TestLambda";

const INLINE_HANDLER_FILE: &str = "index.handler";

/// code_dir 未指定時に使う関数本体
///
/// 受け取ったイベントをテーブルに書き込み、`payload` が `test-successful`
/// なら `status: "ok"` を返す。
const INLINE_HANDLER: &str = r#"const { DynamoDBClient, PutItemCommand } = require('@aws-sdk/client-dynamodb');

const client = new DynamoDBClient({});

exports.handler = async (event) => {
  const id = `probe-${Date.now()}`;
  await client.send(new PutItemCommand({
    TableName: process.env.TABLE_NAME,
    Item: {
      [process.env.PARTITION_KEY]: { S: id },
      event: { S: JSON.stringify(event) },
    },
  }));

  const ok = event !== null && typeof event === 'object' && event.payload === 'test-successful';
  return { status: ok ? 'ok' : 'failed', id, received: event };
};
"#;

fn removal_policy(removal: Removal) -> RemovalPolicy {
    match removal {
        Removal::Retain => RemovalPolicy::Retain,
        Removal::Destroy => RemovalPolicy::Destroy,
    }
}

fn function_props(config: &ProbeConfig) -> FunctionProps {
    let function = &config.function;
    let props = match &function.code_dir {
        Some(dir) => FunctionProps::new(
            FUNCTION_ID,
            &function.runtime,
            &function.handler,
            FunctionCode::Asset(dir.clone()),
        ),
        // インラインコードは index.js として配置される
        None => FunctionProps::new(
            FUNCTION_ID,
            &function.runtime,
            INLINE_HANDLER_FILE,
            FunctionCode::Inline(INLINE_HANDLER.to_string()),
        ),
    };

    let mut props = props
        .with_env("TABLE_NAME", EnvValue::TableName(TABLE_ID.to_string()))
        .with_env(
            "PARTITION_KEY",
            EnvValue::Literal(config.table.partition_key.clone()),
        );
    if let Some(memory_size) = function.memory_size {
        props = props.with_memory_size(memory_size);
    }
    if let Some(timeout_secs) = function.timeout_secs {
        props = props.with_timeout_secs(timeout_secs);
    }
    props
}

/// 設定からスタック定義を組み立てる
pub fn build_demo_stack(config: &ProbeConfig) -> stackprobe_cloud::Result<StackDefinition> {
    let removal = removal_policy(config.removal_policy);

    StackBuilder::new(&config.stack_name)
        .description("stackprobe test stack (bucket, table, function)")
        .bucket(BucketProps::new(BUCKET_ID).with_removal_policy(removal))
        .table(
            TableProps::new(
                TABLE_ID,
                AttributeDef::string(&config.table.partition_key),
            )
            .with_removal_policy(removal),
        )
        .function(function_props(config))
        .grant_read_write_data(TABLE_ID, FUNCTION_ID)
        .output(
            &config.test.output_key,
            OutputValue::FunctionArn(FUNCTION_ID.to_string()),
        )
        .build()
}
