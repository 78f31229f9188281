//! デーモン設定のKDLパース
//!
//! `helmflow.kdl` を [`DaemonConfig`] に変換します。全てのノードは省略可能
//! で、省略時は既定値が使われます。未知のノードは無視されるため、将来の
//! 設定項目が混ざっていても古いデーモンはそのまま起動できます。

use crate::error::{ConfigError, Result};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "HELMFLOW_CONFIG_PATH";

/// ディレクトリ内で探すファイル名。先に見つかったものが勝つ
const FILE_CANDIDATES: [&str; 4] = [
    "helmflow.local.kdl",
    ".helmflow.local.kdl",
    "helmflow.kdl",
    ".helmflow.kdl",
];

/// デーモン全体の設定
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    /// スイープ間隔
    pub tick_interval: Duration,

    /// 実行ワーカー数
    pub workers: usize,

    /// 状態ディレクトリ `.helmflow/` を置くルート
    pub state_root: PathBuf,

    /// マニフェスト出力先のルート
    pub manifests_root: PathBuf,

    pub provisioner: ProvisionerConfig,
}

/// 外部プロビジョニングツールの設定
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionerConfig {
    /// 実行するコマンド
    pub command: String,

    /// apply時の引数。`{dir}` がマニフェストディレクトリに置換される
    pub apply_args: Vec<String>,

    /// delete時の引数
    pub delete_args: Vec<String>,

    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            workers: 4,
            state_root: PathBuf::from("."),
            manifests_root: PathBuf::from(".helmflow/manifests"),
            provisioner: ProvisionerConfig::default(),
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            command: "kubectl".to_string(),
            apply_args: vec!["apply".into(), "-f".into(), "{dir}".into()],
            delete_args: vec![
                "delete".into(),
                "-f".into(),
                "{dir}".into(),
                "--ignore-not-found".into(),
            ],
            create_timeout: Duration::from_secs(30 * 60),
            update_timeout: Duration::from_secs(10 * 60),
            delete_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl DaemonConfig {
    /// 設定ファイルを探す
    ///
    /// `HELMFLOW_CONFIG_PATH` が設定されていればそのパスだけを見ます。
    /// 指定先が存在しない場合は既定値に落とさずエラーです。未設定なら
    /// カレントディレクトリ、`./.helmflow/`、`~/.config/helmflow/` の順に
    /// 候補ファイルを探し、どこにも無ければ `None` を返します。
    pub fn find_file() -> Result<Option<PathBuf>> {
        if let Ok(value) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(value);
            if !path.is_file() {
                return Err(ConfigError::MissingEnvConfig(path));
            }
            return Ok(Some(path));
        }

        let cwd = std::env::current_dir()?;
        let state_dir = cwd.join(".helmflow");
        Ok([cwd, state_dir]
            .into_iter()
            .flat_map(|dir| FILE_CANDIDATES.iter().map(move |name| dir.join(name)))
            .chain(Self::global_file())
            .find(|path| path.is_file()))
    }

    /// グローバル設定の置き場所
    fn global_file() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("helmflow").join("helmflow.kdl"))
    }

    /// ファイルから設定を読み込む
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// KDL文字列から設定をパース
    pub fn parse(content: &str) -> Result<Self> {
        let doc: KdlDocument = content.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            match node.name().value() {
                "controlplane" => {
                    if let Some(children) = node.children() {
                        for child in children.nodes() {
                            match child.name().value() {
                                "tick-interval" => {
                                    config.tick_interval =
                                        Duration::from_secs(parse_seconds(child, "tick-interval")?);
                                }
                                "workers" => {
                                    let value = first_integer(child).ok_or_else(|| {
                                        ConfigError::InvalidConfig(
                                            "workers には整数を指定してください".to_string(),
                                        )
                                    })?;
                                    if value < 1 {
                                        return Err(ConfigError::InvalidConfig(
                                            "workers は1以上にしてください".to_string(),
                                        ));
                                    }
                                    config.workers = usize::try_from(value).map_err(|_| {
                                        ConfigError::InvalidConfig(format!(
                                            "workers が大きすぎます: {}",
                                            value
                                        ))
                                    })?;
                                }
                                "state-root" => {
                                    if let Some(value) = first_string(child) {
                                        config.state_root = PathBuf::from(value);
                                    }
                                }
                                "manifests-root" => {
                                    if let Some(value) = first_string(child) {
                                        config.manifests_root = PathBuf::from(value);
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
                "provisioner" => {
                    if let Some(children) = node.children() {
                        for child in children.nodes() {
                            match child.name().value() {
                                "command" => {
                                    if let Some(value) = first_string(child) {
                                        config.provisioner.command = value;
                                    }
                                }
                                "apply-args" => {
                                    config.provisioner.apply_args = all_strings(child);
                                }
                                "delete-args" => {
                                    config.provisioner.delete_args = all_strings(child);
                                }
                                "create-timeout" => {
                                    config.provisioner.create_timeout =
                                        Duration::from_secs(parse_seconds(child, "create-timeout")?);
                                }
                                "update-timeout" => {
                                    config.provisioner.update_timeout =
                                        Duration::from_secs(parse_seconds(child, "update-timeout")?);
                                }
                                "delete-timeout" => {
                                    config.provisioner.delete_timeout =
                                        Duration::from_secs(parse_seconds(child, "delete-timeout")?);
                                }
                                _ => {}
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        // 置換位置が無指定の場合は末尾に補う
        for args in [
            &mut config.provisioner.apply_args,
            &mut config.provisioner.delete_args,
        ] {
            if !args.iter().any(|a| a.contains("{dir}")) {
                args.push("{dir}".to_string());
            }
        }

        Ok(config)
    }
}

/// ノード先頭の整数エントリを秒数として取り出す
fn parse_seconds(node: &KdlNode, name: &str) -> Result<u64> {
    let value = first_integer(node).ok_or_else(|| {
        ConfigError::InvalidConfig(format!("{} には整数(秒)を指定してください", name))
    })?;
    if value < 1 {
        return Err(ConfigError::InvalidConfig(format!(
            "{} は1以上にしてください",
            name
        )));
    }
    u64::try_from(value)
        .map_err(|_| ConfigError::InvalidConfig(format!("{} が大きすぎます: {}", name, value)))
}

fn first_integer(node: &KdlNode) -> Option<i128> {
    node.entries().first().and_then(|e| e.value().as_integer())
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn all_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}
