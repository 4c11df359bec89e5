//! 外部工具调用
//!
//! 所有外部程序（rclone、rpicam-still、ping）都经由 [`run_tool`] 执行：
//! 阻塞等待、带超时、非零退出码视为失败。

use crate::error::ToolError;
use std::ffi::{OsStr, OsString};
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// 工具输出
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// 执行外部工具并等待结束
///
/// 超时后子进程会被杀掉（`kill_on_drop`），返回 [`ToolError::Timeout`]。
pub async fn run_tool<I, S>(program: &str, args: I, timeout: Duration) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    debug!("执行: {} {:?}", program, args);

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => ToolError::Unavailable {
                program: program.to_string(),
                reason: e.to_string(),
            },
            _ => ToolError::Spawn {
                program: program.to_string(),
                source: e,
            },
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ToolError::Spawn {
            program: program.to_string(),
            source: e,
        })?,
        Err(_) => {
            return Err(ToolError::Timeout {
                program: program.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    trace!("{} 退出: {:?}", program, output.status);

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let out = run_tool("sh", ["-c", "echo hello"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure_with_stderr() {
        let err = run_tool("sh", ["-c", "echo boom >&2; exit 4"], Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(4));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let err = run_tool("sh", ["-c", "sleep 5"], Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let err = run_tool("definitely-not-a-real-binary-xyz", ["--version"], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
