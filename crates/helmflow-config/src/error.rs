use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("HELMFLOW_CONFIG_PATH が指す設定ファイルがありません: {0}")]
    MissingEnvConfig(PathBuf),

    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
