//! 相机控制：调用 rpicam-still 拍照，统计拍摄次数

use crate::config::CameraConfig;
use crate::process::run_tool;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 单次拍照超时
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);
/// 相机检测超时
pub const DETECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 相机控制器
pub struct CameraController {
    config: CameraConfig,
    current_dir: PathBuf,
    capture_count: u32,
}

impl CameraController {
    pub fn new(config: CameraConfig, current_dir: PathBuf) -> Self {
        Self {
            config,
            current_dir,
            capture_count: 0,
        }
    }

    /// 生成图片路径：`current/YYYY-MM-DD/img_YYYYmmdd_HHMMSS.jpg`
    pub fn image_path(&self, now: DateTime<Local>) -> PathBuf {
        self.current_dir
            .join(now.format("%Y-%m-%d").to_string())
            .join(format!("img_{}.jpg", now.format("%Y%m%d_%H%M%S")))
    }

    /// 拍照命令参数
    pub fn capture_args(&self, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
            "--quality".to_string(),
            self.config.quality.to_string(),
            "--width".to_string(),
            self.config.width.to_string(),
            "--height".to_string(),
            self.config.height.to_string(),
            "-n".to_string(),
        ];
        if self.config.rotation != 0 {
            args.push("--rotation".to_string());
            args.push(self.config.rotation.to_string());
        }
        if self.config.hflip {
            args.push("--hflip".to_string());
        }
        if self.config.vflip {
            args.push("--vflip".to_string());
        }
        args
    }

    /// 检查相机是否连接
    pub async fn check_camera(&self) -> bool {
        match run_tool(&self.config.detect_command, ["--list-cameras"], DETECT_TIMEOUT).await {
            Ok(out) if out.stdout.contains("Available cameras") => {
                debug!("检测到相机");
                true
            }
            Ok(_) => {
                warn!("未检测到相机");
                false
            }
            Err(e) => {
                error!("检查相机失败: {}", e);
                false
            }
        }
    }

    /// 拍一张照片，成功返回文件路径
    pub async fn capture(&mut self) -> Option<PathBuf> {
        let output = self.image_path(Local::now());
        if let Some(parent) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!("创建图片目录失败 {}: {}", parent.display(), e);
                return None;
            }
        }

        let args = self.capture_args(&output);
        if let Err(e) = run_tool(&self.config.capture_command, &args, CAPTURE_TIMEOUT).await {
            error!("拍照失败: {}", e);
            return None;
        }

        match tokio::fs::metadata(&output).await {
            Ok(meta) => {
                info!("已拍摄: {} ({} 字节)", output.display(), meta.len());
                self.capture_count += 1;
                Some(output)
            }
            Err(_) => {
                error!("图片文件未生成: {}", output.display());
                None
            }
        }
    }

    /// 自上次重置以来的拍摄数是否达到同步阈值
    pub fn should_sync(&self) -> bool {
        self.capture_count >= self.config.captures
    }

    pub fn reset_capture_count(&mut self) {
        self.capture_count = 0;
    }

    pub fn capture_count(&self) -> u32 {
        self.capture_count
    }
}
