#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// A scratch directory with an empty config file, so runs never pick up the
/// developer's own catalog settings.
pub struct Sandbox {
    pub temp: TempDir,
    pub config: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::Builder::new()
            .prefix("clint-cli")
            .tempdir()
            .expect("tempdir");
        let config = temp.path().join("config.toml");
        fs::write(&config, "[replication]\nreserved_percent = 10\n").expect("write config");
        Self { temp, config }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// A directory holding a couple of payload files.
    pub fn scan_dir(&self, name: &str) -> PathBuf {
        let dir = self.temp.path().join(name);
        fs::create_dir_all(dir.join("pages")).expect("dirs");
        fs::write(dir.join("mets.xml"), b"<mets/>").expect("write");
        fs::write(dir.join("pages").join("0001.tif"), b"0123456789").expect("write");
        dir
    }

    pub fn clint(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("clint");
        cmd.current_dir(self.temp.path())
            .env_remove("CLINT_CONFIG")
            .env_remove("CLINT_CATALOG_URL")
            .env_remove("CLINT_CATALOG_USER")
            .env_remove("CLINT_CATALOG_API_KEY")
            .env_remove("CLINT_REMOTE_HOST")
            .env("NO_COLOR", "1")
            .arg("--config")
            .arg(&self.config);
        cmd
    }
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}
