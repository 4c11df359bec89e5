//! 错误类型
//!
//! `ToolError` 描述外部工具（rclone、rpicam-still、ping）调用失败，
//! `SyncError` 描述双向同步协议本身的失败。

use thiserror::Error;

/// 外部工具调用错误
#[derive(Debug, Error)]
pub enum ToolError {
    /// 工具不存在或无法执行
    #[error("工具不可用: {program} ({reason})")]
    Unavailable { program: String, reason: String },

    /// 启动进程失败
    #[error("启动 {program} 失败: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 超时，进程已被终止
    #[error("{program} 超时 ({secs}s)")]
    Timeout { program: String, secs: u64 },

    /// 非零退出码
    #[error("{program} 执行失败 (exit={code:?}): {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ToolError {
    /// 是否属于“工具不可用”类错误（功能应被禁用）
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ToolError::Unavailable { .. })
    }
}

/// 双向同步协议错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("远程列表失败: {0}")]
    Listing(#[source] ToolError),

    #[error("扫描本地目录失败: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 传输过程中工具变得不可用，同步已被禁用
    #[error("同步已禁用，传输中止")]
    Disabled,
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
