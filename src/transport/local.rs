//! RG-014: Local process execution.

use super::{CommandSpec, ExecOutput};
use std::process::{Command, Stdio};

/// Run a command locally and capture its output.
///
/// A process killed by a signal has no exit code and reports `-1`.
pub fn exec_command(spec: &CommandSpec) -> Result<ExecOutput, String> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(ref dir) = spec.cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .map_err(|e| format!("failed to spawn {}: {}", spec.program, e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
