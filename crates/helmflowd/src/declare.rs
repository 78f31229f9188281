//! リソース宣言ファイルのパース
//!
//! `load` コマンドが読み込むKDLドキュメントを [`Declaration`] に変換します。
//! `tenant` ノードが現在のテナントを切り替え、以降の `cluster` /
//! `deployment` ノードはそのテナントに属します。`template` ノードは
//! テンプレートディレクトリの登録で、`source` は宣言ファイルからの
//! 相対パスとして解決されます。未知のノードは無視します。
//!
//! ```kdl
//! tenant "acme"
//! cluster "prod-tokyo" {
//!     template "cluster-base"
//!     data { region "is1a"; node-count "3" }
//!     secret { api-token "..." }
//!     limits { cpu "4"; memory "8Gi" }
//! }
//! template "cluster-base" { source "./templates/cluster-base" }
//! ```

use anyhow::anyhow;
use helmflow_core::{validate_name, GitCredentials, ResourceKind, ResourceLimits, ResourceRecord};
use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 宣言ファイル一枚分の内容
#[derive(Debug)]
pub struct Declaration {
    pub templates: Vec<DeclaredTemplate>,
    pub resources: Vec<ResourceRecord>,
}

/// テンプレート登録の宣言
#[derive(Debug)]
pub struct DeclaredTemplate {
    pub name: String,
    pub source: PathBuf,
}

/// 宣言ファイルを読み込んでパースする
pub fn parse_declaration(path: &Path) -> anyhow::Result<Declaration> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("宣言ファイルを読み込めません: {}: {}", path.display(), e))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_declaration_str(&content, base)
}

fn parse_declaration_str(content: &str, base: &Path) -> anyhow::Result<Declaration> {
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| anyhow!("KDLパースエラー: {}", e))?;

    let mut tenant: Option<String> = None;
    let mut templates = Vec::new();
    let mut resources = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "tenant" => {
                let name = first_string(node)
                    .ok_or_else(|| anyhow!("tenant にテナント名を指定してください"))?;
                validate_name(name)?;
                tenant = Some(name.to_string());
            }
            "cluster" => {
                resources.push(parse_resource(ResourceKind::Cluster, node, tenant.as_deref())?);
            }
            "deployment" => {
                resources.push(parse_resource(
                    ResourceKind::Deployment,
                    node,
                    tenant.as_deref(),
                )?);
            }
            "template" => {
                templates.push(parse_template(node, base)?);
            }
            _ => {}
        }
    }

    Ok(Declaration {
        templates,
        resources,
    })
}

fn parse_resource(
    kind: ResourceKind,
    node: &KdlNode,
    tenant: Option<&str>,
) -> anyhow::Result<ResourceRecord> {
    let tenant = tenant.ok_or_else(|| {
        anyhow!(
            "{} 定義の前に tenant を宣言してください",
            node.name().value()
        )
    })?;
    let name = first_string(node)
        .ok_or_else(|| anyhow!("{} にリソース名を指定してください", node.name().value()))?;
    validate_name(name)?;

    let mut record = ResourceRecord::new(kind, tenant, name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "template" => {
                    let template = first_string(child).ok_or_else(|| {
                        anyhow!("{}: template にテンプレート名を指定してください", name)
                    })?;
                    record = record.with_template(template);
                }
                "cluster" => {
                    let cluster = first_string(child).ok_or_else(|| {
                        anyhow!("{}: cluster に対象クラスタ名を指定してください", name)
                    })?;
                    record = record.with_cluster(cluster);
                }
                "data" => {
                    record = record.with_data(parse_map(child, name)?);
                }
                "secret" => {
                    record = record.with_secret_data(parse_map(child, name)?);
                }
                "limits" => {
                    record = record.with_limits(parse_limits(child, name)?);
                }
                "git" => {
                    record = record.with_git(parse_git(child, name)?);
                }
                _ => {}
            }
        }
    }

    Ok(record)
}

fn parse_template(node: &KdlNode, base: &Path) -> anyhow::Result<DeclaredTemplate> {
    let name = first_string(node)
        .ok_or_else(|| anyhow!("template にテンプレート名を指定してください"))?
        .to_string();
    let source = node
        .children()
        .and_then(|children| children.get("source"))
        .and_then(first_string)
        .ok_or_else(|| anyhow!("template \"{}\" に source を指定してください", name))?;

    Ok(DeclaredTemplate {
        name,
        source: base.join(source),
    })
}

/// `key "value"` の子ノード列をマップに変換する
fn parse_map(node: &KdlNode, owner: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value();
            let value = first_string(child).ok_or_else(|| {
                anyhow!(
                    "{}: {} の {} に文字列値を指定してください",
                    owner,
                    node.name().value(),
                    key
                )
            })?;
            map.insert(key.to_string(), value.to_string());
        }
    }
    Ok(map)
}

fn parse_limits(node: &KdlNode, owner: &str) -> anyhow::Result<ResourceLimits> {
    let mut limits = ResourceLimits::new();
    for (key, value) in parse_map(node, owner)? {
        match key.as_str() {
            "cpu" => limits = limits.with_cpu(value),
            "memory" => limits = limits.with_memory(value),
            _ => {}
        }
    }
    Ok(limits)
}

fn parse_git(node: &KdlNode, owner: &str) -> anyhow::Result<GitCredentials> {
    let fields = parse_map(node, owner)?;
    let url = fields
        .get("url")
        .ok_or_else(|| anyhow!("{}: git に url を指定してください", owner))?;

    let mut git = GitCredentials::new(url);
    if let (Some(username), Some(token)) = (fields.get("username"), fields.get("token")) {
        git = git.with_auth(username, token);
    }
    Ok(git)
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}
