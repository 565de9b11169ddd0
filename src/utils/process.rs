//! Child process execution with time budgets.
//!
//! Children are spawned with `kill_on_drop`, so a child that outlives its
//! budget is killed when the wait is abandoned.

use std::io;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Render a command line for logs and error messages.
pub fn describe(cmd: &Command) -> String {
    let std = cmd.as_std();
    let mut line = std.get_program().to_string_lossy().into_owned();
    for arg in std.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Numeric exit status; termination by signal reports 1.
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Run with inherited stdio and wait for the exit status.
///
/// Returns `Ok(None)` when the budget is exceeded.
pub async fn status_within(cmd: &mut Command, limit: Duration) -> io::Result<Option<ExitStatus>> {
    cmd.kill_on_drop(true);
    let mut child = cmd.spawn()?;
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => status.map(Some),
        Err(_) => {
            if let Err(e) = child.kill().await {
                log::warn!("failed to kill timed out child: {}", e);
            }
            Ok(None)
        }
    }
}

/// Run with captured stdout/stderr.
///
/// Returns `Ok(None)` when the budget is exceeded.
pub async fn output_within(cmd: &mut Command, limit: Duration) -> io::Result<Option<Output>> {
    cmd.kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let child = cmd.spawn()?;
    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => output.map(Some),
        Err(_) => Ok(None),
    }
}
