//! 差异计算
//!
//! 只比较“是否存在”，不比较内容：两边都有的同名文件视为已同步，
//! 即使内容不同也不会被传输或删除。

use crate::core::scanner::{is_sentinel, FileSet};

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// 本地 -> 远程
    Upload { path: String },
    /// 远程 -> 本地
    Download { path: String },
    /// 本地已删除，删除远程副本
    DeleteRemote { path: String },
}

impl SyncAction {
    pub fn path(&self) -> &str {
        match self {
            SyncAction::Upload { path }
            | SyncAction::Download { path }
            | SyncAction::DeleteRemote { path } => path,
        }
    }
}

/// 一次双向同步的传输计划
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_upload: FileSet,
    pub to_download: FileSet,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty()
    }

    /// 按执行顺序展开：先上传，再下载
    pub fn actions(&self) -> Vec<SyncAction> {
        self.to_upload
            .iter()
            .map(|p| SyncAction::Upload { path: p.clone() })
            .chain(
                self.to_download
                    .iter()
                    .map(|p| SyncAction::Download { path: p.clone() }),
            )
            .collect()
    }
}

/// 文件比较器
pub struct FileComparator;

impl FileComparator {
    /// `to_upload = local − remote`，`to_download = remote − local`
    pub fn compare_sets(local: &FileSet, remote: &FileSet) -> SyncPlan {
        SyncPlan {
            to_upload: local
                .difference(remote)
                .filter(|p| !is_sentinel(p))
                .cloned()
                .collect(),
            to_download: remote
                .difference(local)
                .filter(|p| !is_sentinel(p))
                .cloned()
                .collect(),
        }
    }

    /// 下载之后仍不在本地的文件，视为本地已删除，需要删除远程副本
    pub fn pending_deletions(to_download: &FileSet, local_after: &FileSet) -> Vec<SyncAction> {
        to_download
            .iter()
            .filter(|p| !is_sentinel(p))
            .filter(|p| !local_after.contains(*p))
            .map(|p| SyncAction::DeleteRemote { path: p.clone() })
            .collect()
    }
}
