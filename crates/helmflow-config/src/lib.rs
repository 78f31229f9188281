//! HelmFlowデーモンの設定
//!
//! KDL形式の設定ファイルを [`DaemonConfig`] に読み込みます。探索場所と
//! 優先順位は [`DaemonConfig::find_file`] を参照してください。

pub mod config;
pub mod error;

pub use config::{CONFIG_PATH_ENV, DaemonConfig, ProvisionerConfig};
pub use error::*;
