use std::ffi::OsStr;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context, Result};
use tracing::trace;

const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Execute a program with a closed stdin and capture stdout/stderr.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely.
pub fn run_command<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> Result<RunOutput> {
    let label = program.to_string_lossy().to_string();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {label}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout missing for {label}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr missing for {label}"))?;
    let stdout_handle = thread::spawn(move || read_capped(stdout, MAX_CAPTURE_BYTES));
    let stderr_handle = thread::spawn(move || read_capped(stderr, MAX_CAPTURE_BYTES));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {label}"))?;
    let code = status.code().unwrap_or(-1);
    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow!("stdout thread panicked"))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow!("stderr thread panicked"))??;
    trace!(program = %label, code, "process finished");
    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

/// Reads the whole stream so the child never blocks on a full pipe, keeping
/// at most `limit` bytes.
fn read_capped(mut reader: impl Read, limit: usize) -> Result<String> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        let room = limit.saturating_sub(buffer.len());
        if read > room {
            truncated = true;
        }
        buffer.extend_from_slice(&chunk[..read.min(room)]);
    }
    let mut text = String::from_utf8_lossy(&buffer).to_string();
    if truncated {
        text.push_str("\n[...truncated...]\n");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn run_command_captures_output_and_status_unix() -> Result<()> {
        let output = run_command(
            OsStr::new("/bin/sh"),
            &["-c", "printf out && printf err >&2; exit 7"],
        )?;
        assert_eq!(output.code, 7);
        assert!(!output.success());
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        Ok(())
    }

    #[test]
    fn read_capped_marks_truncation() -> Result<()> {
        let text = read_capped(&b"abcdef"[..], 3)?;
        assert!(text.starts_with("abc"));
        assert!(text.contains("[...truncated...]"));
        Ok(())
    }

    #[test]
    fn missing_programs_fail_to_start() {
        let err = run_command::<&str>(OsStr::new("/nonexistent/clint-probe"), &[])
            .expect_err("spawn must fail");
        assert!(err.to_string().contains("failed to start"));
    }
}
