use crate::utils;
use colored::Colorize;
use helmflow_core::ActionKind;

pub async fn handle(resource: &str, action: &str, kind: Option<&str>) -> anyhow::Result<()> {
    let action: ActionKind = action.parse()?;

    let config = utils::load_config()?;
    let store = utils::open_store(&config)?;

    let record = utils::resolve_record(&store, resource, kind).await?;
    let cleared = store.clear_dispatch(record.id, action).await?;

    // 作成のやり直しでは前回の試行が残したマニフェストも片付ける。
    // 残したままだと次の作成が Forbidden で止まる
    if action == ActionKind::Create {
        let dir = config.manifests_root.join(record.id.to_string());
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            println!(
                "{} 前回のマニフェストを削除しました: {}",
                "✓".green(),
                dir.display()
            );
        }
    }

    println!(
        "{} {} の{}記録をクリアしました",
        "✓".green(),
        cleared.qualified_name().cyan(),
        utils::action_label(action)
    );
    println!("  条件が揃えば次のスイープで再実行されます");

    Ok(())
}
