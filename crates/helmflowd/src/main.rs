mod commands;
mod declare;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "helmflowd")]
#[command(version)]
#[command(about = "宣言して、承認して、配備する。テナント別Kubernetesコントロールプレーン", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// コントロールプレーンデーモンを起動
    Run {
        /// 設定ファイルのパス（省略時は自動探索）
        #[arg(short, long, env = "HELMFLOW_CONFIG_PATH")]
        config: Option<PathBuf>,
    },
    /// リソース宣言ファイル (KDL) をストアに反映
    Load {
        /// 宣言ファイルのパス
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// リソースの一覧と状態を表示
    Status,
    /// リソースを承認して作成・更新を許可
    Approve {
        /// 対象リソース (tenant/name)
        resource: String,
        /// リソース種別 (cluster, deployment)。同名リソースがある場合に指定
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// リソースを削除予定にする
    Delete {
        /// 対象リソース (tenant/name)
        resource: String,
        /// リソース種別 (cluster, deployment)。同名リソースがある場合に指定
        #[arg(short, long)]
        kind: Option<String>,
    },
    /// ディスパッチ記録をクリアして失敗したアクションを再実行可能にする
    Rearm {
        /// 対象リソース (tenant/name)
        resource: String,
        /// 対象アクション (create, update, delete)
        #[arg(short, long)]
        action: String,
        /// リソース種別 (cluster, deployment)。同名リソースがある場合に指定
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt::init();

    match cli.command {
        Commands::Run { config } => {
            commands::run::handle(config).await?;
        }
        Commands::Load { file } => {
            commands::load::handle(&file).await?;
        }
        Commands::Status => {
            commands::status::handle().await?;
        }
        Commands::Approve { resource, kind } => {
            commands::approve::handle(&resource, kind.as_deref()).await?;
        }
        Commands::Delete { resource, kind } => {
            commands::delete::handle(&resource, kind.as_deref()).await?;
        }
        Commands::Rearm {
            resource,
            action,
            kind,
        } => {
            commands::rearm::handle(&resource, &action, kind.as_deref()).await?;
        }
    }

    Ok(())
}
