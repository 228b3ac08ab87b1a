mod commands;
mod context;
mod demo_stack;
mod scenario;
mod utils;

use clap::{Parser, Subcommand};
use context::{Context, Overrides};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackprobe")]
#[command(about = "スタックを作って、呼んで、片付ける。", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は stackprobe.yaml を探索）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// AWS リージョン
    #[arg(short, long, global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// スタック名（設定ファイルの stack_name を上書き）
    #[arg(short, long, global = true, env = "STACKPROBE_STACK")]
    stack: Option<String>,

    /// クラウドアセンブリの出力先（デフォルト: stackprobe.out）
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// スタックをデプロイし、関数を呼び出して結果を確認し、削除する
    Run {
        /// テスト用ペイロード (JSON)
        #[arg(short, long)]
        payload: Option<String>,
        /// テスト失敗時も終了コード 1 で終了する
        #[arg(long)]
        strict: bool,
    },
    /// クラウドアセンブリを生成（AWS にはアクセスしない）
    Synth,
    /// スタックをデプロイして出力を表示
    Deploy,
    /// デプロイ済みの関数を呼び出す
    Invoke {
        /// 関数名または ARN（省略時はスタック出力から取得）
        #[arg(short, long)]
        function: Option<String>,
        /// テスト用ペイロード (JSON)
        #[arg(short, long)]
        payload: Option<String>,
    },
    /// スタックを削除
    Destroy,
    /// AWS 認証情報を確認
    Auth,
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("stackprobe {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = Context::load(
        cli.config.as_deref(),
        Overrides {
            region: cli.region,
            stack: cli.stack,
            out: cli.out,
        },
    )?;

    match cli.command {
        Commands::Run { payload, strict } => commands::run::handle(&ctx, payload, strict).await?,
        Commands::Synth => commands::synth::handle(&ctx).await?,
        Commands::Deploy => commands::deploy::handle(&ctx).await?,
        Commands::Invoke { function, payload } => {
            commands::invoke::handle(&ctx, function, payload).await?
        }
        Commands::Destroy => commands::destroy::handle(&ctx).await?,
        Commands::Auth => commands::auth::handle(&ctx).await?,
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
