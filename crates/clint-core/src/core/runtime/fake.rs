use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};

use super::process::RunOutput;
use super::shell::{HostContext, RemoteShell};

pub(crate) const DF_HEADER: &str =
    "Filesystem      Size  Used Avail Capacity Mounted on\n";

/// Scripted shell: `df` prints a fixed table and `test` answers from sets.
#[derive(Default)]
pub(crate) struct FakeShell {
    usage: String,
    existing: HashSet<String>,
    writable: HashSet<String>,
    broken: HashSet<String>,
    fail_copy: AtomicBool,
    commands: Mutex<Vec<String>>,
    copies: Mutex<Vec<CopyCall>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CopyCall {
    pub host: Option<String>,
    pub local: String,
    pub remote: String,
    pub elevated: bool,
}

impl FakeShell {
    pub(crate) fn new() -> Self {
        Self {
            usage: DF_HEADER.to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn with_volume(mut self, row: &str) -> Self {
        self.usage.push_str(row);
        self.usage.push('\n');
        self
    }

    pub(crate) fn with_existing(mut self, path: &str) -> Self {
        self.existing.insert(path.to_string());
        self
    }

    pub(crate) fn with_writable(mut self, path: &str) -> Self {
        self.existing.insert(path.to_string());
        self.writable.insert(path.to_string());
        self
    }

    /// `test` on this path exits with 2, as it does for a bad operand.
    pub(crate) fn with_broken(mut self, path: &str) -> Self {
        self.broken.insert(path.to_string());
        self
    }

    pub(crate) fn fail_copies(&self) {
        self.fail_copy.store(true, Ordering::SeqCst);
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub(crate) fn copies(&self) -> Vec<CopyCall> {
        self.copies.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, command: String) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }

    fn output(code: i32, stdout: &str) -> RunOutput {
        RunOutput {
            code,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }
}

impl RemoteShell for FakeShell {
    fn run_command(&self, _host: &HostContext, command: &str) -> Result<RunOutput> {
        self.record(command.to_string());
        if command.contains("df -hP") {
            return Ok(Self::output(0, &self.usage));
        }
        Ok(Self::output(127, ""))
    }

    fn test_path(&self, _host: &HostContext, flag: &str, path: &str) -> Result<i32> {
        self.record(format!("test {flag} {path}"));
        if self.broken.contains(path) {
            return Ok(2);
        }
        let present = match flag {
            "-e" => self.existing.contains(path),
            "-w" => self.writable.contains(path),
            _ => bail!("unexpected test flag {flag}"),
        };
        Ok(if present { 0 } else { 1 })
    }

    fn copy_path(
        &self,
        host: &HostContext,
        local: &Path,
        remote: &str,
        elevated: bool,
    ) -> Result<()> {
        if self.fail_copy.load(Ordering::SeqCst) {
            bail!("connection reset by peer");
        }
        if let Ok(mut copies) = self.copies.lock() {
            copies.push(CopyCall {
                host: host.target(),
                local: local.display().to_string(),
                remote: remote.to_string(),
                elevated,
            });
        }
        Ok(())
    }
}
