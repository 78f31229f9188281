//! 二段階レンダリングパイプライン
//!
//! 第一段階: 各テンプレートファイルを `{ data, secret }` コンテキストで
//! Tera展開します。第二段階: 展開結果をYAMLとしてパースし（`---` 区切りの
//! 複数ドキュメント対応）、構文を検証します。全ドキュメントがnullの
//! ファイルは [`Rendered::Empty`] となり、条件付きでマニフェストを
//! 出力しないテンプレートを表現できます。

use crate::error::{RenderError, Result};
use crate::tree::TemplateTree;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tracing::debug;

/// テンプレートに渡す変数マップ
pub type TemplateData = BTreeMap<String, String>;

/// 1ファイルの展開結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// 検証済みマニフェスト。バイト列はそのまま保持される
    Manifest(String),
    /// 全ドキュメントがnullだったファイル。出力されない
    Empty,
}

/// 展開済みマニフェストの集合（パス順）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestSet {
    entries: BTreeMap<PathBuf, Rendered>,
}

impl ManifestSet {
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &Rendered)> {
        self.entries.iter()
    }

    /// 実際に書き出されるマニフェストのみを列挙
    pub fn manifests(&self) -> impl Iterator<Item = (&PathBuf, &str)> {
        self.entries.iter().filter_map(|(path, rendered)| match rendered {
            Rendered::Manifest(content) => Some((path, content.as_str())),
            Rendered::Empty => None,
        })
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&Rendered> {
        self.entries.get(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// テンプレートツリーをマニフェストに展開するレンダラ
pub struct ManifestRenderer {
    tera: Tera,
    context: Context,
}

impl ManifestRenderer {
    /// `data` / `secret` 名前空間を固定したレンダラを作成
    pub fn new(plain: &TemplateData, secret: &TemplateData) -> Self {
        let mut context = Context::new();
        context.insert("data", plain);
        context.insert("secret", secret);
        Self {
            tera: Tera::default(),
            context,
        }
    }

    /// ツリー全体を展開して検証済みセットを返す
    ///
    /// いずれかのファイルで失敗した場合、セット全体を破棄してエラーを
    /// 返します。
    pub fn render(&mut self, tree: &TemplateTree) -> Result<ManifestSet> {
        let mut entries = BTreeMap::new();

        for (path, content) in tree.walk()? {
            let rendered = self.tera.render_str(content, &self.context).map_err(|e| {
                RenderError::TemplateError {
                    file: path.clone(),
                    message: extract_tera_error_detail(&e),
                }
            })?;

            let documents = validate_yaml(&rendered, &path)?;
            let all_null = documents
                .iter()
                .all(|doc| matches!(doc, serde_yaml::Value::Null));

            if all_null {
                debug!(file = %path.display(), "Template rendered to empty manifest");
                entries.insert(path, Rendered::Empty);
            } else {
                entries.insert(path, Rendered::Manifest(rendered));
            }
        }

        Ok(ManifestSet { entries })
    }
}

/// 展開結果をYAMLとして検証
///
/// `---` 区切りの複数ドキュメントを個別にパースします。
fn validate_yaml(rendered: &str, file: &Path) -> Result<Vec<serde_yaml::Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(rendered) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| {
            RenderError::InvalidManifest {
                file: file.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        documents.push(value);
    }
    Ok(documents)
}

/// マニフェストセットをディレクトリに書き出す
///
/// `dir` が既に存在する場合、`replace_existing` が指定されていなければ
/// `Forbidden` で失敗します。上書き時はディレクトリごと削除してから
/// 再生成するため、以前の展開で生成された古いファイルは残りません。
/// [`Rendered::Empty`] のエントリは書き出されません。
pub fn materialize(
    set: &ManifestSet,
    dir: impl AsRef<Path>,
    replace_existing: bool,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();

    if dir.exists() {
        if !replace_existing {
            return Err(RenderError::Forbidden(dir.to_path_buf()));
        }
        std::fs::remove_dir_all(dir).map_err(|e| RenderError::IoError {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
    }
    std::fs::create_dir_all(dir).map_err(|e| RenderError::IoError {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut written = Vec::new();
    for (path, content) in set.manifests() {
        let target = dir.join(path);
        if let Some(parent) = target.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| RenderError::IoError {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        std::fs::write(&target, content).map_err(|e| RenderError::IoError {
            path: target.clone(),
            message: e.to_string(),
        })?;
        written.push(path.clone());
    }

    debug!(dir = %dir.display(), files = written.len(), "Materialized manifest set");
    Ok(written)
}

/// Teraエラーから詳細情報を抽出
///
/// sourceチェーンをたどり、未定義変数などの具体的な情報を取り出します。
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = Vec::new();
    details.push(e.to_string());

    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    if full_error.contains("not found in context") {
        // 変数名を抽出: "Variable `xxx` not found in context"
        if let Some(start) = full_error.find("Variable `")
            && let Some(end) = full_error[start..].find("` not found")
        {
            let var_name = &full_error[start + 10..start + end];
            return format!(
                "未定義の変数: `{}`\nヒント: data または secret に値を設定してください",
                var_name
            );
        }
    }

    full_error
}
