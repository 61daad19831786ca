use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use super::process::{run_command, RunOutput};

/// Where remote commands run. Without a host, commands run locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostContext {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl HostContext {
    #[must_use]
    pub fn local() -> Self {
        Self::default()
    }

    pub fn remote(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    /// `user@host`, `host`, or `None` for local execution.
    #[must_use]
    pub fn target(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        Some(match &self.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        })
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.target().unwrap_or_else(|| "localhost".to_string())
    }
}

pub trait RemoteShell: Send + Sync {
    fn run_command(&self, host: &HostContext, command: &str) -> Result<RunOutput>;

    /// Runs `test <flag> <path>` and returns its exit code.
    fn test_path(&self, host: &HostContext, flag: &str, path: &str) -> Result<i32> {
        let output = self.run_command(host, &format!("test {flag} {}", shell_quote(path)))?;
        Ok(output.code)
    }

    /// Recursively copies `local` to `remote`, with sudo on the far side when
    /// `elevated` is set.
    fn copy_path(&self, host: &HostContext, local: &Path, remote: &str, elevated: bool)
        -> Result<()>;
}

/// Single-quotes `raw` for a POSIX shell.
#[must_use]
pub fn shell_quote(raw: &str) -> String {
    if !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c))
    {
        return raw.to_string();
    }
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// OpenSSH-backed shell; local `sh` when the host context is empty.
#[derive(Debug, Default)]
pub struct SshShell;

impl SshShell {
    fn tool(name: &str) -> Result<PathBuf> {
        which::which(name).with_context(|| format!("`{name}` not found on PATH"))
    }

    fn ssh_args(host: &HostContext, target: String, command: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), "BatchMode=yes".into()];
        if let Some(port) = host.port {
            args.push("-p".into());
            args.push(port.to_string().into());
        }
        args.push(target.into());
        args.push(command.into());
        args
    }

    /// The remote operand is passed as-is: SFTP-mode `scp` does not run it
    /// through a shell, so quotes would become part of the path.
    fn scp_args(host: &HostContext, target: &str, local: &Path, remote: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-r".into(), "-o".into(), "BatchMode=yes".into()];
        if let Some(port) = host.port {
            args.push("-P".into());
            args.push(port.to_string().into());
        }
        args.push(local.as_os_str().to_owned());
        args.push(format!("{target}:{remote}").into());
        args
    }

    fn check(output: &RunOutput, action: &str) -> Result<()> {
        if output.success() {
            return Ok(());
        }
        bail!(
            "{action} failed with exit code {}: {}",
            output.code,
            output.stderr.trim()
        )
    }
}

impl RemoteShell for SshShell {
    fn run_command(&self, host: &HostContext, command: &str) -> Result<RunOutput> {
        debug!(host = %host.label(), %command, "remote command");
        match host.target() {
            None => run_command(OsStr::new("sh"), &["-c", command]),
            Some(target) => {
                let ssh = Self::tool("ssh")?;
                run_command(ssh.as_os_str(), &Self::ssh_args(host, target, command))
            }
        }
    }

    fn copy_path(
        &self,
        host: &HostContext,
        local: &Path,
        remote: &str,
        elevated: bool,
    ) -> Result<()> {
        if !local.exists() {
            bail!("invalid directory '{}'", local.display());
        }
        // `cp -R` and `scp -r` nest the bag inside a directory that is
        // already there.
        if self.test_path(host, "-e", remote)? == 0 {
            bail!("{remote} already exists on {}", host.label());
        }
        info!(
            local = %local.display(),
            host = %host.label(),
            %remote,
            elevated,
            "copying bag"
        );
        let local_arg = local.to_string_lossy().to_string();
        let Some(target) = host.target() else {
            let mut command = format!("cp -R {} {}", shell_quote(&local_arg), shell_quote(remote));
            if elevated {
                command = format!("sudo {command}");
            }
            let output = run_command(OsStr::new("sh"), &["-c", command.as_str()])?;
            return Self::check(&output, "local copy");
        };

        let scp = Self::tool("scp")?;
        let staging = if elevated {
            let name = local
                .file_name()
                .map_or_else(|| "bag".to_string(), |name| name.to_string_lossy().to_string());
            format!("/tmp/clint-{name}-{}", process::id())
        } else {
            remote.to_string()
        };
        let args = Self::scp_args(host, &target, local, &staging);
        let output = run_command(scp.as_os_str(), &args)?;
        Self::check(&output, "scp")?;

        if elevated {
            let command = format!("sudo mv {} {}", shell_quote(&staging), shell_quote(remote));
            let output = self.run_command(host, &command)?;
            Self::check(&output, "elevated move")?;
        }
        Ok(())
    }
}
