#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    /// テスト用ディレクトリをカレントにしたコマンドを作る
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("helmflowd").unwrap();
        cmd.current_dir(self.root.path())
            .env_remove("HELMFLOW_CONFIG_PATH")
            .env_remove("HELMFLOW_STATE_KEY");
        cmd
    }

    pub fn write_declaration(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("resources.kdl");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_template(&self, name: &str, file: &str, content: &str) {
        let dir = self.root.path().join("templates").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
