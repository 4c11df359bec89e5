pub mod local;
pub mod rclone;

use crate::config::{RemoteBackend, SyncSettings};
use crate::error::ToolError;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use local::LocalRemote;
pub use rclone::RcloneRemote;

// ============ 公共常量 ============

/// 元数据/列表类操作超时
pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);
/// 批量传输类操作超时
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// 云端目标：`remote_name:base_path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub remote_name: String,
    pub base_path: String,
}

impl RemoteTarget {
    pub fn new(remote_name: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            remote_name: remote_name.into(),
            base_path: base_path.into(),
        }
    }

    /// 生成 `remote:base/relative` 形式的地址
    pub fn address(&self, relative: &str) -> String {
        let path = join_remote(&self.base_path, relative);
        format!("{}:{}", self.remote_name, path)
    }
}

/// 用单个 `/` 拼接远程路径片段，忽略空片段
pub fn join_remote(base: &str, relative: &str) -> String {
    base.split('/')
        .chain(relative.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// 解析 `lsf -R` 输出：每行一个相对路径，目录以 `/` 结尾
pub fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.ends_with('/'))
        .map(|line| line.replace('\\', "/"))
        .collect()
}

/// 外部传输工具抽象
///
/// 所有地址都是字符串：本地路径，或 `remote:path`。
#[async_trait]
pub trait Remote: Send + Sync {
    /// 列出已配置的远程名（带结尾的 `:`）
    async fn list_remotes(&self) -> Result<Vec<String>, ToolError>;

    /// 递归列出远程目录下的文件，返回相对路径
    async fn list_files(&self, target: &str) -> Result<Vec<String>, ToolError>;

    /// 复制单个文件到指定文件地址
    async fn copy_file(&self, from: &str, to: &str) -> Result<(), ToolError>;

    /// 镜像：让目标与源完全一致，删除目标中多余的文件
    async fn sync_dir(&self, from: &str, to: &str) -> Result<(), ToolError>;

    /// 删除单个远程文件
    async fn delete_file(&self, path: &str) -> Result<(), ToolError>;

    /// 获取名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建远程实例
pub fn create_remote(settings: &SyncSettings) -> Result<Arc<dyn Remote>> {
    match settings.backend {
        RemoteBackend::Rclone => {
            tracing::info!("使用 rclone 后端: {}", settings.rclone_command);
            Ok(Arc::new(RcloneRemote::new(&settings.rclone_command)) as Arc<dyn Remote>)
        }
        RemoteBackend::Local => {
            let root = settings
                .local_root
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("local backend requires sync.local_root"))?;
            tracing::info!("使用本地后端: {}", root.display());
            Ok(Arc::new(LocalRemote::new(&settings.remote_name, root)?) as Arc<dyn Remote>)
        }
    }
}
