//! 主循环：定时拍照、按条件同步、每日维护

use crate::camera::CameraController;
use crate::config::{AppConfig, StartupConfig};
use crate::core::{DirectoryRole, SyncConfig, SyncDirectory, SyncEngine};
use crate::maintenance::{DiskSpace, FileManager, RetentionPolicy, StatvfsDiskSpace};
use crate::network::NetworkCheck;
use crate::storage::{create_remote, Remote};
use crate::AppPaths;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 主循环出错后的冷却时间
pub const ERROR_COOLDOWN: Duration = Duration::from_secs(5);

/// 睡眠，期间收到取消信号提前返回 true
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => cancel.is_cancelled(),
    }
}

/// 启动安全模式等待，以秒为粒度响应取消
///
/// 返回 false 表示用户在等待期间要求退出。
pub async fn safe_mode_delay(startup: &StartupConfig, cancel: &CancellationToken) -> bool {
    if !startup.safe_mode || startup.safe_mode_delay == 0 {
        return !cancel.is_cancelled();
    }

    warn!("{} ({}s)", startup.safe_mode_message, startup.safe_mode_delay);
    for remaining in (1..=startup.safe_mode_delay).rev() {
        debug!("安全模式倒计时: {}s", remaining);
        if sleep_or_cancel(Duration::from_secs(1), cancel).await {
            return false;
        }
    }
    info!("安全模式结束，继续启动");
    true
}

/// 监听 SIGINT / SIGTERM，收到后取消 `cancel`
pub fn spawn_signal_listener(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("无法监听 Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("无法监听 SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("收到 SIGINT，准备退出..."),
            _ = terminate => info!("收到 SIGTERM，准备退出..."),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    })
}

/// 守护进程
pub struct Daemon {
    config: AppConfig,
    paths: AppPaths,
    camera: CameraController,
    sync: SyncEngine,
    files: FileManager,
    network: NetworkCheck,
}

impl Daemon {
    pub fn new(config: AppConfig, paths: AppPaths) -> Result<Self> {
        let remote = create_remote(&config.sync).context("创建远程后端失败")?;
        Ok(Self::from_parts(config, paths, remote, Box::new(StatvfsDiskSpace)))
    }

    pub fn from_parts(
        config: AppConfig,
        paths: AppPaths,
        remote: Arc<dyn Remote>,
        disk: Box<dyn DiskSpace>,
    ) -> Self {
        info!("初始化系统组件...");
        let camera = CameraController::new(config.camera.clone(), paths.current_dir.clone());
        let sync = SyncEngine::new(remote, SyncConfig::from(&config.sync));
        let files = FileManager::new(
            paths.current_dir.clone(),
            paths.archive_dir.clone(),
            paths.logs_dir.clone(),
            RetentionPolicy::from(&config.file_management),
        )
        .with_disk_space(disk);
        let network = NetworkCheck::new(&config.network);

        Self {
            config,
            paths,
            camera,
            sync,
            files,
            network,
        }
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub async fn check_camera(&self) -> bool {
        self.camera.check_camera().await
    }

    pub async fn check_remote(&self) -> bool {
        self.sync.check_remote().await
    }

    pub async fn safe_mode_delay(&self, cancel: &CancellationToken) -> bool {
        safe_mode_delay(&self.config.startup, cancel).await
    }

    /// 当前需要同步的照片目录（日期目录，旧的在前）
    pub fn image_directories(&self) -> Vec<SyncDirectory> {
        FileManager::dated_dirs(&self.paths.current_dir)
            .into_iter()
            .map(|(_, path)| SyncDirectory::new(DirectoryRole::CurrentImages, &self.paths.current_dir, &path))
            .collect()
    }

    pub fn log_directory(&self) -> SyncDirectory {
        SyncDirectory::new(DirectoryRole::Logs, &self.paths.logs_dir, &self.paths.logs_dir)
    }

    /// 同步所有照片目录，全部成功才重置拍摄计数；随后同步日志
    pub async fn sync_cycle(&mut self) -> bool {
        let mut all_ok = true;
        for dir in self.image_directories() {
            if !self.sync.sync(&dir).await {
                all_ok = false;
            }
        }

        if all_ok {
            self.camera.reset_capture_count();
        } else {
            warn!("同步未全部成功，不重置拍摄计数");
        }

        if self.config.sync.sync_logs && !self.sync.sync(&self.log_directory()).await {
            warn!("日志目录同步失败");
        }

        all_ok
    }

    /// 主循环的一次迭代
    pub async fn run_iteration(&mut self, last_date: &mut NaiveDate) -> Result<()> {
        let today = Local::now().date_naive();
        if today != *last_date {
            info!("日期变化: {} -> {}", last_date, today);
            *last_date = today;
            self.files.ensure_today_dir().context("创建今日目录失败")?;
            self.files.run_daily_maintenance();
        }

        if !self.files.check_disk_space() {
            error!("磁盘空间严重不足，请手动清理");
        }

        let image = self.camera.capture().await;

        if self.camera.should_sync() || image.is_none() {
            if self.network.is_reachable().await {
                self.sync_cycle().await;
            } else {
                warn!("网络不可用，跳过同步");
            }
        }

        Ok(())
    }

    /// 运行主循环直到被取消，然后执行退出前同步
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.files.ensure_today_dir().context("创建今日目录失败")?;
        self.files.run_daily_maintenance();

        let interval = Duration::from_secs(self.config.camera.interval);
        let mut last_date = Local::now().date_naive();
        info!("进入主循环 (间隔 {}s)", interval.as_secs());

        while !cancel.is_cancelled() {
            if let Err(e) = self.run_iteration(&mut last_date).await {
                error!("主循环出错: {:?}", e);
                if sleep_or_cancel(ERROR_COOLDOWN, cancel).await {
                    break;
                }
                continue;
            }

            if sleep_or_cancel(interval, cancel).await {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        if self.config.sync.sync_on_shutdown {
            info!("退出前执行最后一次同步");
            if self.network.is_reachable().await {
                self.sync_cycle().await;
            } else {
                warn!("网络不可用，跳过最后一次同步");
            }
        }
        info!("相机系统已停止");
    }
}
