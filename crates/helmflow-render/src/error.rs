use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("テンプレート展開エラー: {file}\n理由: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("マニフェスト検証エラー: {file}\n理由: {message}")]
    InvalidManifest { file: PathBuf, message: String },

    #[error("テンプレートツリーが不正です: {0}")]
    InvalidTree(String),

    #[error("出力先が既に存在します: {0}\nヒント: 再展開する場合は上書きを許可してください")]
    Forbidden(PathBuf),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, RenderError>;
