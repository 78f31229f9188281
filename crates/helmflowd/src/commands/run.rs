use crate::utils;
use colored::Colorize;
use helmflow_provision::{CliProvisioner, CommandSpec};
use helmflow_reconciler::{ActionTimeouts, ReconcilerContext, WorkerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub async fn handle(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // --config は設定探索の先頭に割り込む
    if let Some(path) = config_path {
        // SAFETY: ワーカー起動前の単一スレッド時点でのみ設定する
        unsafe {
            std::env::set_var(helmflow_config::CONFIG_PATH_ENV, &path);
        }
    }

    let config = utils::load_config()?;
    let store = utils::open_store(&config)?;

    println!(
        "{}",
        "HelmFlow コントロールプレーンを起動します".green().bold()
    );
    println!(
        "  状態ディレクトリ: {}",
        config.state_root.display().to_string().cyan()
    );
    println!(
        "  マニフェスト出力先: {}",
        config.manifests_root.display().to_string().cyan()
    );
    println!(
        "  スイープ間隔: {}秒 / ワーカー数: {}",
        config.tick_interval.as_secs(),
        config.workers
    );
    println!(
        "  プロビジョナ: {}",
        config.provisioner.command.cyan()
    );
    if !store.vault().is_enabled() {
        println!(
            "{}",
            "  警告: HELMFLOW_STATE_KEY が未設定のため、シークレットは平文で保存されます"
                .yellow()
        );
    }
    println!();

    let provisioner = CliProvisioner::new(
        CommandSpec {
            program: config.provisioner.command.clone(),
            args: config.provisioner.apply_args.clone(),
        },
        CommandSpec {
            program: config.provisioner.command.clone(),
            args: config.provisioner.delete_args.clone(),
        },
    );

    let ctx = ReconcilerContext::new(
        store,
        Arc::new(provisioner),
        config.manifests_root.clone(),
    )
    .with_timeouts(ActionTimeouts {
        create: config.provisioner.create_timeout,
        update: config.provisioner.update_timeout,
        delete: config.provisioner.delete_timeout,
    });

    let cancel = helmflow_reconciler::start(
        ctx,
        WorkerConfig {
            tick_interval: config.tick_interval,
            workers: config.workers,
            ..Default::default()
        },
    );

    wait_for_shutdown().await?;

    println!();
    println!("{}", "シャットダウンします...".yellow());
    cancel.cancel();
    // 実行中のアクションが状態を書き終えるまでの猶予
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("{}", "停止しました".dimmed());

    Ok(())
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
