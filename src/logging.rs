//! 日志模块 - 控制台输出 + 按天滚动的日志文件

use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志文件名前缀，生成 `pi_cam.YYYY-MM-DD.log`
pub const LOG_FILE_PREFIX: &str = "pi_cam";

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志目录
    pub log_dir: PathBuf,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    pub level: String,
}

impl LogConfig {
    pub fn new(log_dir: impl Into<PathBuf>, level: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            level: level.into(),
        }
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" | "critical" => tracing::Level::ERROR,
            "warn" | "warning" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

fn file_appender(log_dir: &Path) -> Result<RollingFileAppender, String> {
    fs::create_dir_all(log_dir).map_err(|e| e.to_string())?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| e.to_string())
}

/// 初始化日志系统
///
/// 返回的 guard 必须存活到进程结束，否则文件日志会丢失尾部内容。
/// 日志目录不可用时回退为只输出到控制台。
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let level = config.tracing_level();
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    match file_appender(&config.log_dir) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false);
            let console_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false);

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);

            tracing::info!("日志已初始化, 级别 {}", level);
            tracing::info!("日志目录: {}", config.log_dir.display());
            Some(guard)
        }
        Err(e) => {
            let console_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false);
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);

            tracing::error!("文件日志初始化失败，仅输出到控制台: {}", e);
            None
        }
    }
}
