// SPDX-License-Identifier: GPL-3.0-only

//! Helpers for running the external tools lptools drives.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::{Result, SysError};

fn spawn_error(program: &Path, error: std::io::Error) -> SysError {
    if error.kind() == std::io::ErrorKind::NotFound {
        SysError::CommandNotFound(program.display().to_string())
    } else {
        SysError::Io(error)
    }
}

fn check_output(program: &Path, output: Output) -> Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SysError::OperationFailed(format!(
            "{} failed: {}",
            program.display(),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run `program` with `args` and return its stdout, failing on a non-zero exit.
pub fn run_command(program: &Path, args: &[&str]) -> Result<String> {
    debug!("running {} {}", program.display(), args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| spawn_error(program, e))?;
    check_output(program, output)
}

/// Like [`run_command`], feeding `input` on stdin.
pub fn run_command_with_input(program: &Path, args: &[&str], input: &str) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }

    let output = child.wait_with_output()?;
    check_output(program, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_reported() {
        let err = run_command(Path::new("/nonexistent/lptools-test-binary"), &["--help"])
            .expect_err("binary does not exist");
        assert!(matches!(err, SysError::CommandNotFound(_)));
    }
}
