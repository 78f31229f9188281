use crate::{declare, utils};
use colored::Colorize;
use std::path::Path;

pub async fn handle(file: &Path) -> anyhow::Result<()> {
    let config = utils::load_config()?;
    let store = utils::open_store(&config)?;

    println!(
        "{}",
        format!("宣言ファイルを読み込み中: {}", file.display()).blue()
    );

    let declaration = declare::parse_declaration(file)?;

    for template in &declaration.templates {
        store.put_template(&template.name, &template.source).await?;
        println!(
            "  {} テンプレート {}",
            "✓".green(),
            template.name.cyan()
        );
    }

    let total = declaration.resources.len();
    let mut drifted = 0usize;
    for record in declaration.resources {
        let stored = store.upsert(record).await?;
        let marker = if stored.pending_update {
            drifted += 1;
            "~".yellow()
        } else {
            "✓".green()
        };
        println!(
            "  {} {} {}",
            marker,
            stored.kind,
            stored.qualified_name().cyan()
        );
    }

    println!();
    println!("{} 件のリソースを反映しました", total);
    if drifted > 0 {
        println!(
            "{}",
            format!(
                "{} 件に変更があります。approve で承認すると更新が実行されます",
                drifted
            )
            .yellow()
        );
    }

    Ok(())
}
