use crate::utils;
use colored::Colorize;
use helmflow_core::{next_action, DispatchState};
use helmflow_reconciler::ApprovalGate;
use std::sync::Arc;

pub async fn handle(resource: &str, kind: Option<&str>) -> anyhow::Result<()> {
    let config = utils::load_config()?;
    let store = utils::open_store(&config)?;

    let record = utils::resolve_record(&store, resource, kind).await?;
    let gate = ApprovalGate::new(Arc::clone(&store));
    let approved = gate
        .approve(record.kind, &record.tenant, &record.name)
        .await?;

    println!(
        "{} {} を承認しました",
        "✓".green(),
        approved.qualified_name().cyan()
    );
    if let Some(action) = next_action(&DispatchState::of(&approved)) {
        println!(
            "  次のスイープで{}が実行されます",
            utils::action_label(action)
        );
    }

    Ok(())
}
