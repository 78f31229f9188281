use crate::utils;
use colored::{ColoredString, Colorize};
use helmflow_core::{next_action, DispatchState, ResourceRecord};

pub async fn handle() -> anyhow::Result<()> {
    let config = utils::load_config()?;
    let store = utils::open_store(&config)?;

    let resources = store.list().await?;

    if resources.is_empty() {
        println!("{}", "リソースが登録されていません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<28} {:<12} {:<18} {:<12} {:<10}",
            "NAME", "KIND", "TEMPLATE", "STATE", "NEXT"
        )
        .bold()
    );
    println!("{}", "─".repeat(84).dimmed());

    for record in resources {
        let next = next_action(&DispatchState::of(&record))
            .map(|action| format!("{} {}", action.symbol(), action))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<28} {:<12} {:<18} {:<12} {:<10}",
            record.qualified_name(),
            record.kind.to_string(),
            record.template.as_deref().unwrap_or("-"),
            state_label(&record),
            next
        );
    }

    Ok(())
}

/// ライフサイクル上の現在地を一語で表す
fn state_label(record: &ResourceRecord) -> ColoredString {
    if record.desired_delete {
        if record.deletion_dispatched_at.is_some() {
            return "削除中".cyan();
        }
        return "削除予定".red();
    }
    if record.deployed_at.is_some() {
        if record.update_dispatched_at.is_some() {
            return "更新中".cyan();
        }
        if record.pending_update {
            return "変更あり".yellow();
        }
        return "稼働中".green();
    }
    if record.creation_dispatched_at.is_some() {
        return "作成中".cyan();
    }
    if record.approved_at.is_some() {
        return "作成待ち".normal();
    }
    "承認待ち".yellow()
}
