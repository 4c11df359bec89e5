use std::io;
use std::path::{Path, PathBuf};

pub mod camera;
pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod network;
pub mod process;
pub mod storage;

pub use config::AppConfig;
pub use core::{DirectoryRole, SyncDirectory, SyncEngine, SyncReport};
pub use daemon::Daemon;
pub use error::{SyncError, ToolError};

/// 运行目录布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub base_dir: PathBuf,
    /// 最近几天的照片，按日期分目录
    pub current_dir: PathBuf,
    /// 归档照片
    pub archive_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: &Path) -> Self {
        let images = base_dir.join("images");
        Self {
            base_dir: base_dir.to_path_buf(),
            current_dir: images.join("current"),
            archive_dir: images.join("archive"),
            logs_dir: base_dir.join("logs"),
        }
    }

    /// 创建所有目录
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [&self.current_dir, &self.archive_dir, &self.logs_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn default_config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }
}
