use crate::config::SyncSettings;
use crate::core::comparator::{FileComparator, SyncAction};
use crate::core::scanner::{ensure_non_empty, is_empty_dir, FileScanner};
use crate::error::{SyncError, SyncResult, ToolError};
use crate::storage::{Remote, RemoteTarget};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 目录角色，注册目录时确定，决定远程路径的映射方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryRole {
    /// `images/current` 及其日期子目录
    CurrentImages,
    /// 日志目录
    Logs,
    /// 其他目录：不同步
    Other,
}

/// 待同步的本地目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDirectory {
    pub path: PathBuf,
    pub role: DirectoryRole,
    /// 相对于角色根目录的路径（POSIX 分隔符，根目录本身为空）
    pub relative: String,
}

impl SyncDirectory {
    /// 注册 `root` 下的目录；不在 `root` 下的目录降级为 [`DirectoryRole::Other`]
    pub fn new(role: DirectoryRole, root: &Path, dir: &Path) -> Self {
        match dir.strip_prefix(root) {
            Ok(rel) => Self {
                path: dir.to_path_buf(),
                role,
                relative: rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/"),
            },
            Err(_) => Self::other(dir),
        }
    }

    pub fn other(dir: &Path) -> Self {
        Self {
            path: dir.to_path_buf(),
            role: DirectoryRole::Other,
            relative: String::new(),
        }
    }
}

/// 本次同步实际采用的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    Bidirectional,
    OneWay,
    /// 双向同步失败后退回单向
    FallbackOneWay,
    /// 没有执行任何传输
    #[default]
    Skipped,
}

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub target: RemoteTarget,
    pub bidirectional: bool,
    pub sync_logs: bool,
}

impl From<&SyncSettings> for SyncConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            target: RemoteTarget::new(&settings.remote_name, &settings.remote_path),
            bidirectional: settings.bidirectional,
            sync_logs: settings.sync_logs,
        }
    }
}

/// 同步报告
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub directory: PathBuf,
    pub remote: Option<String>,
    pub mode: SyncMode,
    pub uploaded: u32,
    pub downloaded: u32,
    pub deleted: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
}

impl SyncReport {
    /// 本次是否调用过传输（上传/下载/删除）
    pub fn transfers(&self) -> u32 {
        self.uploaded + self.downloaded + self.deleted
    }
}

/// 同步引擎
///
/// 每次调用都重新扫描本地和远程，不保存任何同步状态。
pub struct SyncEngine {
    remote: Arc<dyn Remote>,
    config: SyncConfig,
    scanner: FileScanner,
    disabled: AtomicBool,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn Remote>, config: SyncConfig) -> Self {
        Self {
            remote,
            config,
            scanner: FileScanner::new(),
            disabled: AtomicBool::new(false),
        }
    }

    /// 同步功能是否已被禁用（工具缺失或远程未配置）
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn disable(&self, reason: &str) {
        if !self.disabled.swap(true, Ordering::SeqCst) {
            error!("同步功能已禁用: {}", reason);
        }
    }

    fn note_tool_error(&self, err: &ToolError) {
        if err.is_unavailable() {
            self.disable(&err.to_string());
        }
    }

    /// 检查传输工具可用且配置了目标远程
    pub async fn check_remote(&self) -> bool {
        let wanted = format!("{}:", self.config.target.remote_name);
        match self.remote.list_remotes().await {
            Ok(remotes) if remotes.iter().any(|r| r == &wanted) => {
                info!("远程已配置: {} ({})", wanted, self.remote.name());
                true
            }
            Ok(remotes) => {
                error!("未找到远程 '{}'，可用: {}", wanted, remotes.join(", "));
                self.disable("remote not configured");
                false
            }
            Err(e) if e.is_unavailable() => {
                self.note_tool_error(&e);
                false
            }
            Err(e) => {
                warn!("检查远程配置失败（稍后重试）: {}", e);
                false
            }
        }
    }

    /// 计算目录对应的远程地址；`None` 表示不需要同步
    pub fn resolve_target(&self, dir: &SyncDirectory) -> Option<String> {
        match dir.role {
            DirectoryRole::CurrentImages => Some(self.config.target.address(&dir.relative)),
            DirectoryRole::Logs if self.config.sync_logs => {
                Some(self.config.target.address(&format!("logs/{}", dir.relative)))
            }
            DirectoryRole::Logs | DirectoryRole::Other => None,
        }
    }

    /// 同步一个目录，返回是否成功
    pub async fn sync(&self, dir: &SyncDirectory) -> bool {
        self.run_sync(dir).await.success
    }

    /// 同步一个目录并返回详细报告
    pub async fn run_sync(&self, dir: &SyncDirectory) -> SyncReport {
        let start = Instant::now();
        let mut report = SyncReport {
            directory: dir.path.clone(),
            ..Default::default()
        };

        report.success = self.sync_inner(dir, &mut report).await;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "同步结束: {} [{:?}] 上传 {}, 下载 {}, 删除 {}, 失败 {}, 成功={}",
            dir.path.display(),
            report.mode,
            report.uploaded,
            report.downloaded,
            report.deleted,
            report.failed,
            report.success
        );
        report
    }

    async fn sync_inner(&self, dir: &SyncDirectory, report: &mut SyncReport) -> bool {
        if self.is_disabled() {
            warn!("同步已禁用，跳过: {}", dir.path.display());
            return false;
        }

        if !dir.path.exists() {
            debug!("目录不存在，无需同步: {}", dir.path.display());
            return true;
        }

        let Some(remote) = self.resolve_target(dir) else {
            debug!("目录无远程映射，跳过: {}", dir.path.display());
            return true;
        };
        report.remote = Some(remote.clone());

        if self.config.bidirectional {
            let result = match ensure_non_empty(&dir.path) {
                Ok(_) => self.bidirectional(dir, &remote, report).await,
                Err(e) => Err(SyncError::Io(e)),
            };

            match result {
                Ok(()) => {
                    report.mode = SyncMode::Bidirectional;
                    true
                }
                Err(e) if self.is_disabled() => {
                    error!("双向同步中止，同步已禁用: {} ({})", dir.path.display(), e);
                    report.errors.push(e.to_string());
                    report.mode = SyncMode::Bidirectional;
                    false
                }
                Err(e) => {
                    warn!("双向同步失败，回退到单向同步: {} ({})", dir.path.display(), e);
                    report.errors.push(e.to_string());
                    report.mode = SyncMode::FallbackOneWay;
                    self.one_way(dir, &remote, report).await
                }
            }
        } else {
            match is_empty_dir(&dir.path) {
                Ok(true) => {
                    info!("跳过空目录: {}", dir.path.display());
                    return true;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("读取目录失败: {} ({})", dir.path.display(), e);
                    report.errors.push(e.to_string());
                    return false;
                }
            }
            report.mode = SyncMode::OneWay;
            self.one_way(dir, &remote, report).await
        }
    }

    /// 双向同步：扫描 -> 比较 -> 上传 -> 下载 -> 删除本地已删除的远程文件
    ///
    /// 单个文件失败只记录，不影响整体结果；列表或扫描失败、
    /// 或传输途中工具不可用时返回错误。
    async fn bidirectional(&self, dir: &SyncDirectory, remote: &str, report: &mut SyncReport) -> SyncResult<()> {
        let local_files = self.scanner.snapshot(&dir.path)?;

        let listing = self.remote.list_files(remote).await.map_err(|e| {
            self.note_tool_error(&e);
            SyncError::Listing(e)
        })?;
        let remote_files = self.scanner.filter_listing(listing);

        let plan = FileComparator::compare_sets(&local_files, &remote_files);
        info!(
            "比较完成 {}: 本地 {}, 远程 {}, 待上传 {}, 待下载 {}",
            dir.path.display(),
            local_files.len(),
            remote_files.len(),
            plan.to_upload.len(),
            plan.to_download.len()
        );

        if plan.is_empty() {
            return Ok(());
        }

        for action in plan.actions() {
            if self.is_disabled() {
                break;
            }
            self.execute(&action, &dir.path, remote, report).await;
        }

        if !plan.to_download.is_empty() && !self.is_disabled() {
            let local_after = self.scanner.snapshot(&dir.path)?;
            for action in FileComparator::pending_deletions(&plan.to_download, &local_after) {
                if self.is_disabled() {
                    break;
                }
                self.execute(&action, &dir.path, remote, report).await;
            }
        }

        if self.is_disabled() {
            return Err(SyncError::Disabled);
        }
        Ok(())
    }

    /// 执行单个动作，失败只记录
    async fn execute(&self, action: &SyncAction, local_root: &Path, remote: &str, report: &mut SyncReport) {
        let local_path = local_root.join(action.path());
        let local = local_path.to_string_lossy();
        let remote_path = remote_child(remote, action.path());

        let result = match action {
            SyncAction::Upload { .. } => {
                debug!("上传: {} -> {}", local, remote_path);
                self.remote.copy_file(&local, &remote_path).await
            }
            SyncAction::Download { .. } => {
                debug!("下载: {} -> {}", remote_path, local);
                if let Some(parent) = local_path.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        warn!("创建目录失败: {} ({})", parent.display(), e);
                    }
                }
                self.remote.copy_file(&remote_path, &local).await
            }
            SyncAction::DeleteRemote { .. } => {
                info!("本地已删除，删除远程文件: {}", remote_path);
                self.remote.delete_file(&remote_path).await
            }
        };

        match result {
            Ok(()) => match action {
                SyncAction::Upload { .. } => report.uploaded += 1,
                SyncAction::Download { .. } => report.downloaded += 1,
                SyncAction::DeleteRemote { .. } => report.deleted += 1,
            },
            Err(e) => {
                error!("{:?} 失败: {}", action, e);
                self.note_tool_error(&e);
                report.failed += 1;
                report.errors.push(format!("{}: {}", action.path(), e));
            }
        }
    }

    /// 单向镜像：远程变为本地的精确副本
    async fn one_way(&self, dir: &SyncDirectory, remote: &str, report: &mut SyncReport) -> bool {
        let local = dir.path.to_string_lossy();
        info!("单向同步: {} -> {}", local, remote);

        match self.remote.sync_dir(&local, remote).await {
            Ok(()) => true,
            Err(e) => {
                error!("单向同步失败: {}", e);
                self.note_tool_error(&e);
                report.errors.push(e.to_string());
                false
            }
        }
    }
}

/// 远程目录下的文件地址
fn remote_child(remote: &str, relative: &str) -> String {
    if remote.ends_with(':') {
        format!("{}{}", remote, relative)
    } else {
        format!("{}/{}", remote.trim_end_matches('/'), relative)
    }
}
