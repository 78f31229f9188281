use anyhow::anyhow;
use helmflow_config::DaemonConfig;
use helmflow_core::{ActionKind, ResourceKind, ResourceRecord};
use helmflow_store::{ResourceStore, SecretVault};
use std::sync::Arc;

/// 設定ファイルを探索して読み込む。見つからなければ既定値を使う
pub fn load_config() -> anyhow::Result<DaemonConfig> {
    match DaemonConfig::find_file()? {
        Some(path) => {
            tracing::debug!("Using config file: {}", path.display());
            Ok(DaemonConfig::load(&path)?)
        }
        None => Ok(DaemonConfig::default()),
    }
}

/// ストアを開く。状態キーは `HELMFLOW_STATE_KEY` 環境変数から読む
pub fn open_store(config: &DaemonConfig) -> anyhow::Result<Arc<ResourceStore>> {
    let vault = SecretVault::from_env()?;
    Ok(Arc::new(ResourceStore::open(&config.state_root, vault)))
}

/// `tenant/name` 形式の引数を分解する
pub fn parse_resource_arg(arg: &str) -> anyhow::Result<(&str, &str)> {
    arg.split_once('/')
        .filter(|(tenant, name)| !tenant.is_empty() && !name.is_empty())
        .ok_or_else(|| anyhow!("リソースは tenant/name 形式で指定してください: {}", arg))
}

/// 引数からレコードを特定する
///
/// 種別の指定がなければ tenant と name の組だけで検索し、複数種別に
/// またがって同名リソースがある場合はエラーにする。
pub async fn resolve_record(
    store: &ResourceStore,
    resource: &str,
    kind: Option<&str>,
) -> anyhow::Result<ResourceRecord> {
    let (tenant, name) = parse_resource_arg(resource)?;

    if let Some(kind) = kind {
        let kind: ResourceKind = kind.parse()?;
        return Ok(store.get(kind, tenant, name).await?);
    }

    let mut matches: Vec<ResourceRecord> = store
        .list()
        .await?
        .into_iter()
        .filter(|r| r.tenant == tenant && r.name == name)
        .collect();

    match matches.len() {
        0 => Err(anyhow!("リソースが見つかりません: {}", resource)),
        1 => Ok(matches.remove(0)),
        _ => Err(anyhow!(
            "複数の種別に同名リソースがあります。--kind で種別を指定してください: {}",
            resource
        )),
    }
}

/// アクションの日本語表示
pub fn action_label(action: ActionKind) -> &'static str {
    match action {
        ActionKind::Create => "作成",
        ActionKind::Update => "更新",
        ActionKind::Delete => "削除",
    }
}
