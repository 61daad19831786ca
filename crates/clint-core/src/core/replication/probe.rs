use std::path::{Path, PathBuf};

use clint_domain::{parse_bytes, parse_percent, UnitError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::runtime::{shell_quote, HostContext, RemoteShell};

const USAGE_COMMAND: &str = "LC_ALL=C df -hP";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("`{command}` on {host} exited with status {code}: {stderr}")]
    Command {
        host: String,
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("could not reach {host}")]
    Transport {
        host: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("unreadable usage row '{row}'")]
    MalformedRow { row: String },
    #[error("unreadable size in usage row '{row}'")]
    Unit {
        row: String,
        #[source]
        source: UnitError,
    },
    #[error("could not measure {}", path.display())]
    LocalSize {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// One row of the destination's filesystem usage table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeUsage {
    pub filesystem: String,
    pub mount: String,
    pub total: u128,
    pub free: u128,
    pub used_percent: u8,
}

impl VolumeUsage {
    /// A volume is named either by its device or by where it is mounted.
    #[must_use]
    pub fn matches(&self, volume: &str) -> bool {
        self.filesystem == volume || self.mount == volume
    }

    #[must_use]
    pub fn free_percent(&self) -> u8 {
        100_u8.saturating_sub(self.used_percent)
    }

    /// Free space left after holding back `reserved_percent` of the total.
    #[must_use]
    pub fn headroom(&self, reserved_percent: u8) -> u128 {
        let reserve = self.total * u128::from(reserved_percent) / 100;
        self.free.saturating_sub(reserve)
    }

    #[must_use]
    pub fn permits(&self, bytes: u64, reserved_percent: u8) -> bool {
        self.headroom(reserved_percent) > u128::from(bytes)
            && self.free_percent() > reserved_percent
    }
}

/// Parses POSIX `df -hP` output. Header rows are skipped; mount points may
/// contain spaces.
pub fn parse_usage_table(output: &str) -> Result<Vec<VolumeUsage>, ProbeError> {
    let mut rows = Vec::new();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields[0] == "Filesystem" || fields.get(4).is_some_and(|cell| !cell.ends_with('%')) {
            continue;
        }
        if fields.len() < 6 {
            return Err(ProbeError::MalformedRow {
                row: line.to_string(),
            });
        }
        let unit = |source| ProbeError::Unit {
            row: line.to_string(),
            source,
        };
        rows.push(VolumeUsage {
            filesystem: fields[0].to_string(),
            mount: fields[5..].join(" "),
            total: parse_bytes(fields[1]).map_err(unit)?,
            free: parse_bytes(fields[3]).map_err(unit)?,
            used_percent: parse_percent(fields[4]).map_err(unit)?,
        });
    }
    Ok(rows)
}

/// Total size of the regular files under `path`.
pub fn local_size(path: &Path) -> Result<u64, ProbeError> {
    let mut total = 0_u64;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|source| ProbeError::LocalSize {
            path: path.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|source| ProbeError::LocalSize {
                path: entry.path().to_path_buf(),
                source,
            })?;
            total = total.saturating_add(metadata.len());
        }
    }
    Ok(total)
}

/// Read-only queries against a destination host.
pub struct RemoteProbe<'a> {
    shell: &'a dyn RemoteShell,
    host: HostContext,
    reserved_percent: u8,
}

impl<'a> RemoteProbe<'a> {
    pub fn new(shell: &'a dyn RemoteShell, host: HostContext, reserved_percent: u8) -> Self {
        Self {
            shell,
            host,
            reserved_percent,
        }
    }

    #[must_use]
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    #[must_use]
    pub fn reserved_percent(&self) -> u8 {
        self.reserved_percent
    }

    pub fn usage(&self) -> Result<Vec<VolumeUsage>, ProbeError> {
        let output = self
            .shell
            .run_command(&self.host, USAGE_COMMAND)
            .map_err(|source| self.transport(source))?;
        // df exits non-zero when a single mount is unreadable but still
        // prints the rest of the table.
        if !output.success() && output.stdout.trim().is_empty() {
            return Err(ProbeError::Command {
                host: self.host.label(),
                command: USAGE_COMMAND.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        parse_usage_table(&output.stdout)
    }

    /// Whether `bytes` fit on `volume` while keeping the reserve free.
    /// An unknown volume never has space.
    pub fn space_available(&self, bytes: u64, volume: &str) -> Result<bool, ProbeError> {
        let rows = self.usage()?;
        let Some(row) = rows.iter().find(|row| row.matches(volume)) else {
            warn!(host = %self.host.label(), volume, "volume not in usage table");
            return Ok(false);
        };
        let available = row.permits(bytes, self.reserved_percent);
        debug!(
            host = %self.host.label(),
            volume,
            bytes,
            free = %row.free,
            free_percent = row.free_percent(),
            reserved_percent = self.reserved_percent,
            available,
            "checked volume space"
        );
        Ok(available)
    }

    /// Tests `path`, or its nearest existing ancestor below `/`, for write
    /// permission.
    pub fn is_writable(&self, path: &str) -> Result<bool, ProbeError> {
        let mut candidate = path.to_string();
        loop {
            if self.test("-e", &candidate)? {
                let writable = self.test("-w", &candidate)?;
                debug!(
                    host = %self.host.label(),
                    path,
                    checked = %candidate,
                    writable,
                    "probed destination"
                );
                return Ok(writable);
            }
            match Path::new(&candidate).parent() {
                Some(parent) if parent != Path::new("/") && !parent.as_os_str().is_empty() => {
                    candidate = parent.to_string_lossy().to_string();
                }
                _ => {
                    debug!(host = %self.host.label(), path, "no existing ancestor");
                    return Ok(false);
                }
            }
        }
    }

    fn test(&self, flag: &str, path: &str) -> Result<bool, ProbeError> {
        let code = self
            .shell
            .test_path(&self.host, flag, path)
            .map_err(|source| self.transport(source))?;
        match code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(ProbeError::Command {
                host: self.host.label(),
                command: format!("test {flag} {}", shell_quote(path)),
                code,
                stderr: String::new(),
            }),
        }
    }

    fn transport(&self, source: anyhow::Error) -> ProbeError {
        ProbeError::Transport {
            host: self.host.label(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runtime::fake::FakeShell;

    const GIB: u128 = 1 << 30;

    #[test]
    fn usage_rows_skip_headers_and_keep_spaced_mounts() -> Result<(), ProbeError> {
        let rows = parse_usage_table(
            "Filesystem      Size  Used Avail Capacity Mounted on\n\
             /dev/sda1        20G   12G  8.0G      60% /\n\
             /dev/sdb1       1.5T  100G  1.4T       7% /mnt/bag store\n\
             tmpfs              0     0     0       0% /dev/shm\n",
        )?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].total, 20 * GIB);
        assert_eq!(rows[0].free, 8 * GIB);
        assert_eq!(rows[1].mount, "/mnt/bag store");
        assert_eq!(rows[1].total, 1536 * GIB);
        assert_eq!(rows[2].used_percent, 0);
        Ok(())
    }

    #[test]
    fn bad_cells_are_typed_failures() {
        let err = parse_usage_table("/dev/sda1 20Q 1G 1G 5% /\n").expect_err("bad unit");
        assert!(matches!(err, ProbeError::Unit { .. }));
        let err = parse_usage_table("/dev/sda1 20G 1G 1G 5%\n").expect_err("short row");
        assert!(matches!(err, ProbeError::MalformedRow { .. }));
    }

    #[test]
    fn space_needs_headroom_and_free_percent() -> Result<(), ProbeError> {
        let shell = FakeShell::new()
            .with_volume("/dev/sdb1 100G 50G 50G 50% /bags")
            .with_volume("/dev/sdc1 100G 89G 11G 90% /archive");
        let probe = RemoteProbe::new(&shell, HostContext::remote("storage-01"), 10);

        // 50G free minus a 10G reserve leaves 40G.
        assert!(probe.space_available(39 * (1 << 30), "/bags")?);
        assert!(probe.space_available(1, "/dev/sdb1")?);
        assert!(!probe.space_available(41 * (1 << 30), "/bags")?);
        // 1G of headroom, but only 10% of the volume is free.
        assert!(!probe.space_available(1, "/archive")?);
        assert!(!probe.space_available(1, "/missing")?);
        Ok(())
    }

    #[test]
    fn writable_when_nearest_ancestor_is_writable() -> Result<(), ProbeError> {
        let shell = FakeShell::new().with_writable("/a/b");
        let probe = RemoteProbe::new(&shell, HostContext::local(), 10);
        assert!(probe.is_writable("/a/b/c")?);
        assert_eq!(
            shell.commands(),
            vec!["test -e /a/b/c", "test -e /a/b", "test -w /a/b"]
        );
        Ok(())
    }

    #[test]
    fn not_writable_when_ancestor_is_read_only() -> Result<(), ProbeError> {
        let shell = FakeShell::new().with_existing("/a");
        let probe = RemoteProbe::new(&shell, HostContext::local(), 10);
        assert!(!probe.is_writable("/a/b/c")?);

        let shell = FakeShell::new();
        let probe = RemoteProbe::new(&shell, HostContext::local(), 10);
        assert!(!probe.is_writable("/x/y")?);
        assert_eq!(shell.commands(), vec!["test -e /x/y", "test -e /x"]);
        Ok(())
    }

    #[test]
    fn unexpected_test_status_is_an_error() {
        let shell = FakeShell::new().with_broken("/bags");
        let probe = RemoteProbe::new(&shell, HostContext::local(), 10);
        let err = probe.is_writable("/bags").expect_err("status 2");
        assert!(matches!(err, ProbeError::Command { code: 2, .. }));
    }

    #[test]
    fn local_size_sums_regular_files() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        std::fs::create_dir_all(temp.path().join("data"))?;
        std::fs::write(temp.path().join("bagit.txt"), b"12345")?;
        std::fs::write(temp.path().join("data").join("a"), b"123")?;
        assert_eq!(local_size(temp.path())?, 8);
        Ok(())
    }
}
