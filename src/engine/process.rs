// Subprocess helper shared by engine invocations.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use crate::error::{Error, Result};

/// Run a command to completion with a timeout, capturing stdout and stderr.
/// The child is killed on timeout.
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Engine(format!("failed to start {program}: {e}")))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| Error::Engine(format!("failed to capture stdout from {program}")))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| Error::Engine(format!("failed to capture stderr from {program}")))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = timeout(Duration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| Error::Engine(format!("failed to wait for {program}: {e}")))?;
            let stdout = stdout_task
                .await
                .map_err(|e| Error::Engine(format!("stdout task failed: {e}")))?
                .map_err(|e| Error::Engine(format!("failed to read stdout: {e}")))?;
            let stderr = stderr_task
                .await
                .map_err(|e| Error::Engine(format!("stderr task failed: {e}")))?
                .map_err(|e| Error::Engine(format!("failed to read stderr: {e}")))?;
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(Error::Engine(format!(
                "{program} timed out after {timeout_secs}s"
            )))
        }
    }
}
