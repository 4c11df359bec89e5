use super::{parse_listing, Remote, LIST_TIMEOUT, TRANSFER_TIMEOUT};
use crate::error::ToolError;
use crate::process::run_tool;
use async_trait::async_trait;
use tracing::debug;

/// 通过 rclone 命令行访问远程存储
pub struct RcloneRemote {
    program: String,
    name: String,
}

impl RcloneRemote {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            name: format!("rclone({})", program),
        }
    }
}

#[async_trait]
impl Remote for RcloneRemote {
    async fn list_remotes(&self) -> Result<Vec<String>, ToolError> {
        let out = run_tool(&self.program, ["listremotes"], LIST_TIMEOUT).await?;
        Ok(out
            .stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn list_files(&self, target: &str) -> Result<Vec<String>, ToolError> {
        let out = run_tool(&self.program, ["lsf", "-R", target], LIST_TIMEOUT).await?;
        let files = parse_listing(&out.stdout);
        debug!("lsf {}: {} 个文件", target, files.len());
        Ok(files)
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<(), ToolError> {
        run_tool(&self.program, ["copyto", from, to], TRANSFER_TIMEOUT).await?;
        Ok(())
    }

    async fn sync_dir(&self, from: &str, to: &str) -> Result<(), ToolError> {
        run_tool(&self.program, ["sync", from, to], TRANSFER_TIMEOUT).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), ToolError> {
        run_tool(&self.program, ["deletefile", path], LIST_TIMEOUT).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
