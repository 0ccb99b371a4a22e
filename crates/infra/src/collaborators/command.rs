//! Running external image tools.

use std::ffi::OsStr;

use tokio::process::Command;
use tracing::debug;

use super::CollaboratorError;

/// Run `program` to completion and return its stdout. Non-zero exit is an error.
pub async fn run<I, S>(op: &'static str, program: &str, args: I) -> Result<String, CollaboratorError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    debug!(op, ?cmd, "running external command");

    let output = cmd.output().await.map_err(|e| CollaboratorError::Command {
        op,
        program: program.to_string(),
        status: "not started".to_string(),
        stderr: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(CollaboratorError::Command {
            op,
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
