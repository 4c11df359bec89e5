use super::Remote;
use crate::error::ToolError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// 以本地目录树充当远程存储（例如挂载的 U 盘或 NAS）
///
/// `name:path` 形式且 `name` 与配置一致的地址解析到 `root/path`，
/// 其他地址按本地路径处理。行为上模拟 rclone：列出不存在的目录、
/// 删除不存在的文件都会失败。
pub struct LocalRemote {
    remote_name: String,
    root: PathBuf,
    name: String,
}

impl LocalRemote {
    pub fn new(remote_name: &str, root: &Path) -> Result<Self> {
        if !root.exists() {
            std::fs::create_dir_all(root)?;
        }
        Ok(Self {
            remote_name: remote_name.to_string(),
            root: root.to_path_buf(),
            name: format!("local:{}", root.display()),
        })
    }

    fn resolve(&self, address: &str) -> PathBuf {
        match address.split_once(':') {
            Some((remote, path)) if remote == self.remote_name => {
                let path = path.trim_start_matches('/');
                if path.is_empty() {
                    self.root.clone()
                } else {
                    self.root.join(path)
                }
            }
            _ => PathBuf::from(address),
        }
    }

    fn failed(&self, err: impl ToString) -> ToolError {
        ToolError::Failed {
            program: self.name.clone(),
            code: None,
            stderr: err.to_string(),
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    async fn walk_files(&self, base: PathBuf) -> Result<Vec<String>, ToolError> {
        if !base.is_dir() {
            return Err(self.failed(format!("directory not found: {}", base.display())));
        }

        // 使用 spawn_blocking 避免阻塞 async runtime
        tokio::task::spawn_blocking(move || {
            WalkDir::new(&base)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|entry| {
                    let relative = entry.path().strip_prefix(&base).ok()?.to_str()?.to_string();
                    Some(Self::normalize_path(&relative))
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| self.failed(e))
    }

    async fn copy_path(&self, from: &Path, to: &Path) -> Result<(), ToolError> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await.map_err(|e| self.failed(e))?;
        }

        // 使用临时文件写入，然后原子重命名
        let mut temp_name = to.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".partial");
        let temp_path = to.with_file_name(temp_name);
        fs::copy(from, &temp_path).await.map_err(|e| self.failed(e))?;
        fs::rename(&temp_path, to).await.map_err(|e| self.failed(e))?;
        Ok(())
    }
}

#[async_trait]
impl Remote for LocalRemote {
    async fn list_remotes(&self) -> Result<Vec<String>, ToolError> {
        Ok(vec![format!("{}:", self.remote_name)])
    }

    async fn list_files(&self, target: &str) -> Result<Vec<String>, ToolError> {
        self.walk_files(self.resolve(target)).await
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<(), ToolError> {
        let from = self.resolve(from);
        if !from.is_file() {
            return Err(self.failed(format!("object not found: {}", from.display())));
        }
        self.copy_path(&from, &self.resolve(to)).await
    }

    async fn sync_dir(&self, from: &str, to: &str) -> Result<(), ToolError> {
        let src = self.resolve(from);
        let dst = self.resolve(to);

        let source_files = self.walk_files(src.clone()).await?;
        fs::create_dir_all(&dst).await.map_err(|e| self.failed(e))?;
        for rel in &source_files {
            self.copy_path(&src.join(rel), &dst.join(rel)).await?;
        }

        // 删除目标中多余的文件
        let keep: HashSet<&String> = source_files.iter().collect();
        for rel in self.walk_files(dst.clone()).await? {
            if !keep.contains(&rel) {
                fs::remove_file(dst.join(&rel)).await.map_err(|e| self.failed(e))?;
            }
        }
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), ToolError> {
        let full_path = self.resolve(path);
        if !full_path.is_file() {
            return Err(self.failed(format!("object not found: {}", full_path.display())));
        }
        fs::remove_file(&full_path).await.map_err(|e| self.failed(e))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
