use crate::error::SyncResult;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 占位文件名：写入空目录，防止传输工具把目录当作不存在
pub const SENTINEL_FILE: &str = ".placeholder";

/// 相对路径集合（POSIX 分隔符）
pub type FileSet = BTreeSet<String>;

/// 排除规则，匹配文件名；支持 `*` 通配符
const EXCLUDE_PATTERNS: &[&str] = &[SENTINEL_FILE];

/// 文件扫描器：本地快照与远程列表共用同一套排除规则
pub struct FileScanner {
    patterns: Vec<Regex>,
}

impl FileScanner {
    pub fn new() -> Self {
        let patterns = EXCLUDE_PATTERNS
            .iter()
            .filter_map(|p| {
                let re = format!("^{}$", regex::escape(p).replace(r"\*", ".*"));
                match Regex::new(&re) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!("忽略无效的排除规则 {}: {}", p, e);
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// 检查路径是否应该被排除（按文件名匹配）
    pub fn should_exclude(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        self.patterns.iter().any(|re| re.is_match(file_name))
    }

    /// 递归扫描本地目录，返回相对路径集合
    pub fn snapshot(&self, dir: &Path) -> SyncResult<FileSet> {
        let mut files = FileSet::new();
        let mut excluded = 0usize;

        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative) = entry
                .path()
                .strip_prefix(dir)
                .ok()
                .and_then(|p| p.to_str())
                .map(|p| p.replace('\\', "/"))
            else {
                warn!("跳过无法表示的路径: {}", entry.path().display());
                continue;
            };

            if self.should_exclude(&relative) {
                excluded += 1;
                continue;
            }
            files.insert(relative);
        }

        debug!("扫描 {}: {} 个文件, {} 个被排除", dir.display(), files.len(), excluded);
        Ok(files)
    }

    /// 对远程列表应用相同的排除规则
    pub fn filter_listing(&self, listing: Vec<String>) -> FileSet {
        listing
            .into_iter()
            .filter(|p| !self.should_exclude(p))
            .collect()
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// 是否为占位文件
pub fn is_sentinel(path: &str) -> bool {
    path.rsplit('/').next() == Some(SENTINEL_FILE)
}

/// 目录为空时写入占位文件，返回是否写入
pub fn ensure_non_empty(dir: &Path) -> io::Result<bool> {
    if fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    fs::write(dir.join(SENTINEL_FILE), b"")?;
    debug!("写入占位文件: {}", dir.display());
    Ok(true)
}

/// 目录是否不含任何条目
pub fn is_empty_dir(dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}
