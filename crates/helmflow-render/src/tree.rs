//! テンプレートツリー
//!
//! テンプレートはフォルダとファイルからなるツリーとして表現されます。
//! ノードはアリーナ（`Vec`）に格納され、子はインデックスで参照されます。
//! 走査は明示的なワークリストによる反復処理で行い、インデックスの範囲外
//! 参照や循環を検出した時点で即座にエラーを返します。

use crate::error::{RenderError, Result};
use std::path::{Path, PathBuf};

/// ルートノードのインデックス
pub const ROOT: usize = 0;

/// ノードの種別と内容
#[derive(Debug, Clone)]
pub enum NodePayload {
    /// フォルダ。子ノードをインデックスで保持する
    Folder { children: Vec<usize> },
    /// テンプレートファイル。展開前の内容を保持する
    File { content: String },
}

/// ツリー内の1ノード
#[derive(Debug, Clone)]
pub struct TemplateNode {
    /// ファイル名またはフォルダ名
    pub name: String,
    pub payload: NodePayload,
}

/// アリーナ方式のテンプレートツリー
#[derive(Debug, Clone)]
pub struct TemplateTree {
    nodes: Vec<TemplateNode>,
}

impl TemplateTree {
    /// ルートフォルダのみを持つ空のツリーを作成
    pub fn new() -> Self {
        Self {
            nodes: vec![TemplateNode {
                name: String::new(),
                payload: NodePayload::Folder {
                    children: Vec::new(),
                },
            }],
        }
    }

    /// フォルダを追加してインデックスを返す
    pub fn add_folder(&mut self, parent: usize, name: impl Into<String>) -> Result<usize> {
        let index = self.nodes.len();
        self.nodes.push(TemplateNode {
            name: name.into(),
            payload: NodePayload::Folder {
                children: Vec::new(),
            },
        });
        self.attach(parent, index)?;
        Ok(index)
    }

    /// テンプレートファイルを追加してインデックスを返す
    pub fn add_file(
        &mut self,
        parent: usize,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<usize> {
        let index = self.nodes.len();
        self.nodes.push(TemplateNode {
            name: name.into(),
            payload: NodePayload::File {
                content: content.into(),
            },
        });
        self.attach(parent, index)?;
        Ok(index)
    }

    fn attach(&mut self, parent: usize, child: usize) -> Result<()> {
        match self.nodes.get_mut(parent) {
            Some(TemplateNode {
                payload: NodePayload::Folder { children },
                ..
            }) => {
                children.push(child);
                Ok(())
            }
            Some(_) => Err(RenderError::InvalidTree(format!(
                "ノード {} はフォルダではありません",
                parent
            ))),
            None => Err(RenderError::InvalidTree(format!(
                "親ノード {} が存在しません",
                parent
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // ルートノードは常に存在する
        self.nodes.len() <= 1
    }

    /// ディレクトリからツリーを構築
    ///
    /// 隠しファイル（`.` で始まるもの）はスキップされます。エントリは
    /// ファイル名順に読み込まれるため、同じディレクトリからは常に同じ
    /// ツリーが得られます。
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut tree = Self::new();

        // (読み込むディレクトリ, 対応するアリーナのフォルダ) のワークリスト
        let mut worklist: Vec<(PathBuf, usize)> = vec![(dir.to_path_buf(), ROOT)];

        while let Some((current_dir, folder)) = worklist.pop() {
            let mut entries: Vec<std::fs::DirEntry> = std::fs::read_dir(&current_dir)
                .map_err(|e| RenderError::IoError {
                    path: current_dir.clone(),
                    message: e.to_string(),
                })?
                .collect::<std::io::Result<_>>()
                .map_err(|e| RenderError::IoError {
                    path: current_dir.clone(),
                    message: e.to_string(),
                })?;
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with('.') {
                    continue;
                }

                let path = entry.path();
                if path.is_dir() {
                    let child = tree.add_folder(folder, name)?;
                    worklist.push((path, child));
                } else {
                    let content =
                        std::fs::read_to_string(&path).map_err(|e| RenderError::IoError {
                            path: path.clone(),
                            message: e.to_string(),
                        })?;
                    tree.add_file(folder, name, content)?;
                }
            }
        }

        Ok(tree)
    }

    /// 全ファイルを (相対パス, 内容) の列として反復的に走査
    ///
    /// 子インデックスが範囲外の場合や、同じノードに二度到達した場合
    /// （循環）は `InvalidTree` で即座に失敗します。
    pub fn walk(&self) -> Result<Vec<(PathBuf, &str)>> {
        let mut files = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(usize, PathBuf)> = vec![(ROOT, PathBuf::new())];

        while let Some((index, prefix)) = stack.pop() {
            let node = self.nodes.get(index).ok_or_else(|| {
                RenderError::InvalidTree(format!("ノードインデックス {} が範囲外です", index))
            })?;
            if visited[index] {
                return Err(RenderError::InvalidTree(format!(
                    "循環を検出しました: ノード {} ({})",
                    index, node.name
                )));
            }
            visited[index] = true;

            match &node.payload {
                NodePayload::File { content } => {
                    files.push((prefix.join(&node.name), content.as_str()));
                }
                NodePayload::Folder { children } => {
                    let child_prefix = if index == ROOT {
                        prefix
                    } else {
                        prefix.join(&node.name)
                    };
                    // 逆順にプッシュして挿入順で走査する
                    for &child in children.iter().rev() {
                        stack.push((child, child_prefix.clone()));
                    }
                }
            }
        }

        Ok(files)
    }
}

impl Default for TemplateTree {
    fn default() -> Self {
        Self::new()
    }
}
