#![allow(dead_code)]

use async_trait::async_trait;
use picamsync_lib::error::ToolError;
use picamsync_lib::maintenance::DiskSpace;
use picamsync_lib::storage::{LocalRemote, Remote};
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::path::Path;
use std::sync::Mutex;

pub const REMOTE: &str = "usb";

pub fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// 目录下所有文件的相对路径
pub fn tree(dir: &Path) -> BTreeSet<String> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 记录所有调用的远程包装，可以模拟下载失败或工具消失
pub struct RecordingRemote {
    inner: LocalRemote,
    calls: Mutex<Vec<String>>,
    fail_downloads: bool,
    tool_missing: bool,
}

impl RecordingRemote {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalRemote::new(REMOTE, root).unwrap(),
            calls: Mutex::new(Vec::new()),
            fail_downloads: false,
            tool_missing: false,
        }
    }

    pub fn failing_downloads(root: &Path) -> Self {
        Self {
            fail_downloads: true,
            ..Self::new(root)
        }
    }

    /// 复制时报告传输工具已不可用
    pub fn tool_missing_on_copy(root: &Path) -> Self {
        Self {
            tool_missing: true,
            ..Self::new(root)
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// 除了 `lsf` 和 `listremotes` 以外的调用
    pub fn transfer_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("lsf ") && c != "listremotes")
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Remote for RecordingRemote {
    async fn list_remotes(&self) -> Result<Vec<String>, ToolError> {
        self.record("listremotes".into());
        self.inner.list_remotes().await
    }

    async fn list_files(&self, target: &str) -> Result<Vec<String>, ToolError> {
        self.record(format!("lsf {}", target));
        self.inner.list_files(target).await
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<(), ToolError> {
        self.record(format!("copyto {} {}", from, to));
        if self.tool_missing {
            return Err(ToolError::Unavailable {
                program: "recording".into(),
                reason: "No such file or directory".into(),
            });
        }
        if self.fail_downloads && from.starts_with(&format!("{}:", REMOTE)) {
            return Err(ToolError::Failed {
                program: "recording".into(),
                code: Some(1),
                stderr: "download refused".into(),
            });
        }
        self.inner.copy_file(from, to).await
    }

    async fn sync_dir(&self, from: &str, to: &str) -> Result<(), ToolError> {
        self.record(format!("sync {} {}", from, to));
        self.inner.sync_dir(from, to).await
    }

    async fn delete_file(&self, path: &str) -> Result<(), ToolError> {
        self.record(format!("deletefile {}", path));
        self.inner.delete_file(path).await
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 按顺序返回预设值的磁盘探测，用完后重复最后一个
pub struct FakeDisk {
    readings: Mutex<VecDeque<io::Result<u64>>>,
}

impl FakeDisk {
    pub fn mb(values: &[u64]) -> Self {
        Self {
            readings: Mutex::new(values.iter().map(|v| Ok(v * 1024 * 1024)).collect()),
        }
    }

    pub fn failing() -> Self {
        Self {
            readings: Mutex::new(VecDeque::from([Err(io::Error::other("statvfs failed"))])),
        }
    }
}

impl DiskSpace for FakeDisk {
    fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
        let mut readings = self.readings.lock().unwrap();
        if readings.len() > 1 {
            return readings.pop_front().unwrap();
        }
        match readings.front() {
            Some(Ok(v)) => Ok(*v),
            Some(Err(e)) => Err(io::Error::new(e.kind(), e.to_string())),
            None => Ok(u64::MAX),
        }
    }
}

#[cfg(unix)]
pub fn script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}
