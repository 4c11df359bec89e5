//! 文件维护：归档、按保留期清理、磁盘空间监控

use crate::config::FileManagementConfig;
use chrono::{Local, NaiveDate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

const MB: u64 = 1024 * 1024;

/// 只接受严格的 `YYYY-MM-DD`（两位月、两位日，且是合法日期）
pub fn parse_dated_dir(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !digits_ok {
        return None;
    }
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// 保留策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub days_before_archive: u32,
    pub archive_retention_days: u32,
    pub log_retention_days: u32,
    pub min_free_space_mb: u64,
}

impl From<&FileManagementConfig> for RetentionPolicy {
    fn from(c: &FileManagementConfig) -> Self {
        Self {
            days_before_archive: c.days_before_archive,
            archive_retention_days: c.archive_retention_days,
            log_retention_days: c.log_retention_days,
            min_free_space_mb: c.min_free_space_mb,
        }
    }
}

/// 磁盘剩余空间探测
pub trait DiskSpace: Send + Sync {
    /// `path` 所在文件系统对普通用户可用的字节数
    fn free_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// 基于 `statvfs(3)` 的探测
pub struct StatvfsDiskSpace;

impl DiskSpace for StatvfsDiskSpace {
    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: statvfs 只写入传入的结构体，c_path 在调用期间有效
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }

    #[cfg(not(unix))]
    fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "statvfs unavailable"))
    }
}

/// 文件管理器
pub struct FileManager {
    current_dir: PathBuf,
    archive_dir: PathBuf,
    logs_dir: PathBuf,
    policy: RetentionPolicy,
    disk: Box<dyn DiskSpace>,
}

impl FileManager {
    pub fn new(current_dir: PathBuf, archive_dir: PathBuf, logs_dir: PathBuf, policy: RetentionPolicy) -> Self {
        Self {
            current_dir,
            archive_dir,
            logs_dir,
            policy,
            disk: Box::new(StatvfsDiskSpace),
        }
    }

    /// 替换磁盘空间探测
    pub fn with_disk_space(mut self, disk: Box<dyn DiskSpace>) -> Self {
        self.disk = disk;
        self
    }

    /// 确保今天的拍摄目录存在
    pub fn ensure_today_dir(&self) -> io::Result<PathBuf> {
        let today_dir = self.current_dir.join(today().format("%Y-%m-%d").to_string());
        fs::create_dir_all(&today_dir)?;
        Ok(today_dir)
    }

    /// 列出 `base` 下的日期目录，按日期升序
    pub fn dated_dirs(base: &Path) -> Vec<(NaiveDate, PathBuf)> {
        let Ok(entries) = fs::read_dir(base) else {
            return Vec::new();
        };

        let mut dirs: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| {
                let date = parse_dated_dir(e.file_name().to_str()?)?;
                Some((date, e.path()))
            })
            .collect();
        dirs.sort();
        dirs
    }

    /// 把超过 `days_before_archive` 天的日期目录移到归档目录
    pub fn archive_aged_directories(&self) -> usize {
        self.archive_aged_directories_at(today())
    }

    pub fn archive_aged_directories_at(&self, today: NaiveDate) -> usize {
        info!("检查需要归档的目录...");
        let cutoff = cutoff(today, self.policy.days_before_archive);

        let mut archived = 0;
        for (date, dir_path) in Self::dated_dirs(&self.current_dir) {
            if date >= cutoff {
                continue;
            }

            let Some(name) = dir_path.file_name() else {
                continue;
            };
            let dest = self.archive_dir.join(name);
            info!("归档目录: {} -> {}", dir_path.display(), dest.display());

            let result = fs::create_dir_all(&self.archive_dir).and_then(|_| merge_move(&dir_path, &dest));
            match result {
                Ok(()) => archived += 1,
                Err(e) => error!("归档目录失败 {}: {}", dir_path.display(), e),
            }
        }

        info!("已归档 {} 个目录", archived);
        archived
    }

    /// 删除超过保留期的归档目录
    pub fn cleanup_old_archives(&self) -> usize {
        self.cleanup_old_archives_at(today())
    }

    pub fn cleanup_old_archives_at(&self, today: NaiveDate) -> usize {
        info!("检查过期归档...");
        let cutoff = cutoff(today, self.policy.archive_retention_days);

        let mut removed = 0;
        for (date, dir_path) in Self::dated_dirs(&self.archive_dir) {
            if date >= cutoff {
                continue;
            }
            info!("删除过期归档: {}", dir_path.display());
            match fs::remove_dir_all(&dir_path) {
                Ok(()) => removed += 1,
                Err(e) => error!("删除归档失败 {}: {}", dir_path.display(), e),
            }
        }

        info!("已删除 {} 个过期归档目录", removed);
        removed
    }

    /// 删除修改时间超过保留期的日志文件
    pub fn cleanup_old_logs(&self) -> usize {
        self.cleanup_old_logs_at(SystemTime::now())
    }

    pub fn cleanup_old_logs_at(&self, now: SystemTime) -> usize {
        info!("检查过期日志...");
        let retention = Duration::from_secs(u64::from(self.policy.log_retention_days) * 24 * 3600);
        let Some(cutoff) = now.checked_sub(retention) else {
            return 0;
        };
        let Ok(entries) = fs::read_dir(&self.logs_dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let modified = match entry.metadata() {
                Ok(m) if m.is_file() => m.modified(),
                Ok(_) => continue,
                Err(e) => {
                    error!("读取日志文件信息失败 {}: {}", path.display(), e);
                    continue;
                }
            };

            match modified {
                Ok(mtime) if mtime < cutoff => {
                    info!("删除过期日志: {}", path.display());
                    match fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) => error!("删除日志失败 {}: {}", path.display(), e),
                    }
                }
                Ok(_) => {}
                Err(e) => error!("读取修改时间失败 {}: {}", path.display(), e),
            }
        }

        info!("已删除 {} 个过期日志文件", removed);
        removed
    }

    fn free_mb(&self) -> io::Result<u64> {
        Ok(self.disk.free_bytes(&self.current_dir)? / MB)
    }

    /// 检查磁盘空间；不足时先清理日志和归档再复查
    ///
    /// 只有清理后仍不足（或无法读取）时返回 false。
    pub fn check_disk_space(&self) -> bool {
        let min = self.policy.min_free_space_mb;
        let free = match self.free_mb() {
            Ok(v) => v,
            Err(e) => {
                error!("检查磁盘空间失败: {}", e);
                return false;
            }
        };
        debug!("磁盘剩余 {}MB", free);

        if free >= min {
            return true;
        }

        warn!("磁盘空间不足: 剩余 {}MB (最低 {}MB)", free, min);
        self.cleanup_old_logs();
        self.cleanup_old_archives();

        match self.free_mb() {
            Ok(free) if free >= min => {
                info!("清理后磁盘空间恢复: 剩余 {}MB", free);
                true
            }
            Ok(free) => {
                error!("清理后磁盘空间仍不足: 剩余 {}MB", free);
                false
            }
            Err(e) => {
                error!("检查磁盘空间失败: {}", e);
                false
            }
        }
    }

    /// 每日维护：归档、清理、检查磁盘
    pub fn run_daily_maintenance(&self) -> bool {
        info!("开始每日文件维护");
        self.archive_aged_directories();
        self.cleanup_old_archives();
        self.cleanup_old_logs();
        self.check_disk_space()
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn cutoff(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(chrono::Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// 移动目录；目标已存在时逐项合并
fn merge_move(src: &Path, dst: &Path) -> io::Result<()> {
    if !dst.exists() {
        return move_path(src, dst);
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() && target.is_dir() {
            merge_move(&entry.path(), &target)?;
        } else {
            move_path(&entry.path(), &target)?;
        }
    }
    fs::remove_dir(src)
}

/// rename，跨文件系统时退化为复制后删除
fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("跨文件系统移动: {} -> {}", src.display(), dst.display());
            if src.is_dir() {
                copy_tree(src, dst)?;
                fs::remove_dir_all(src)
            } else {
                fs::copy(src, dst)?;
                fs::remove_file(src)
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(io::Error::other)?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
