use crate::utils;
use colored::Colorize;
use helmflow_core::DispatchState;

pub async fn handle(resource: &str, kind: Option<&str>) -> anyhow::Result<()> {
    let config = utils::load_config()?;
    let store = utils::open_store(&config)?;

    let record = utils::resolve_record(&store, resource, kind).await?;
    let marked = store
        .mark_desired_delete(record.kind, &record.tenant, &record.name)
        .await?;

    println!(
        "{} {} を削除予定にしました",
        "✓".green(),
        marked.qualified_name().cyan()
    );
    if DispatchState::of(&marked).never_provisioned() {
        println!(
            "{}",
            "  一度も配備されていないため、次のスイープで記録だけが破棄されます".dimmed()
        );
    } else {
        println!("  承認は不要です。次のスイープから削除処理が始まります");
    }

    Ok(())
}
