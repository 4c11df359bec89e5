//! 应用配置模块
//!
//! 配置保存在 JSON 文件中。加载时逐节补齐缺失的键，未知的节和键原样保留。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 相机配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// 拍摄间隔（秒）
    pub interval: u64,
    /// 每拍摄多少张触发一次同步
    pub captures: u32,
    pub quality: u32,
    pub width: u32,
    pub height: u32,
    pub rotation: u32,
    pub hflip: bool,
    pub vflip: bool,
    /// 拍照程序
    pub capture_command: String,
    /// 相机检测程序
    pub detect_command: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            interval: 20,
            captures: 3,
            quality: 35,
            width: 2592,
            height: 1944,
            rotation: 0,
            hflip: false,
            vflip: false,
            capture_command: "rpicam-still".to_string(),
            detect_command: "rpicam-hello".to_string(),
        }
    }
}

/// 远程后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    Rclone,
    Local,
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub remote_name: String,
    pub remote_path: String,
    /// 是否同步日志目录
    pub sync_logs: bool,
    /// 退出前是否做最后一次同步
    pub sync_on_shutdown: bool,
    /// 双向同步；关闭时只做单向镜像
    pub bidirectional: bool,
    pub backend: RemoteBackend,
    pub rclone_command: String,
    /// `local` 后端的根目录
    pub local_root: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_name: "dropbox".to_string(),
            remote_path: "pi_cam".to_string(),
            sync_logs: true,
            sync_on_shutdown: true,
            bidirectional: true,
            backend: RemoteBackend::Rclone,
            rclone_command: "rclone".to_string(),
            local_root: None,
        }
    }
}

/// 文件管理配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileManagementConfig {
    pub days_before_archive: u32,
    pub archive_retention_days: u32,
    pub log_retention_days: u32,
    pub min_free_space_mb: u64,
}

impl Default for FileManagementConfig {
    fn default() -> Self {
        Self {
            days_before_archive: 2,
            archive_retention_days: 10,
            log_retention_days: 7,
            min_free_space_mb: 500,
        }
    }
}

/// 启动安全模式配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StartupConfig {
    pub safe_mode: bool,
    /// 安全模式等待时间（秒）
    pub safe_mode_delay: u64,
    pub safe_mode_message: String,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            safe_mode: true,
            safe_mode_delay: 30,
            safe_mode_message: "Safe mode: press Ctrl+C to abort startup".to_string(),
        }
    }
}

/// 网络检测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub test_host: String,
    pub ping_command: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            test_host: "8.8.8.8".to_string(),
            ping_command: "ping".to_string(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// 完整配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub file_management: FileManagementConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            sync: SyncSettings::default(),
            file_management: FileManagementConfig::default(),
            startup: StartupConfig::default(),
            network: NetworkConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从配置文件加载配置
    ///
    /// 文件不存在时写入默认配置；解析失败时回退到默认值。
    /// 日志系统此时尚未初始化，错误直接输出到 stderr。
    pub fn load(config_file: &Path) -> Self {
        if !config_file.exists() {
            let config = Self::default();
            if let Err(e) = config.save(config_file) {
                eprintln!("写入默认配置失败: {}", e);
            }
            return config;
        }

        let raw = match fs::read_to_string(config_file)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()))
        {
            Ok(v) => v,
            Err(e) => {
                eprintln!("加载配置失败 {}: {}", config_file.display(), e);
                return Self::default();
            }
        };

        let mut merged = raw.clone();
        let defaults = serde_json::to_value(Self::default()).unwrap_or(Value::Null);
        merge_defaults(&mut merged, &defaults);

        let config = match serde_json::from_value::<AppConfig>(merged.clone()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("配置格式错误 {}: {}", config_file.display(), e);
                return Self::default();
            }
        };

        // 只在补齐了缺失键时回写，保留未知内容
        if merged != raw {
            if let Err(e) = write_json(config_file, &merged) {
                eprintln!("回写配置失败: {}", e);
            }
        }

        config
    }

    /// 保存配置，文件中已有的未知节会被保留
    pub fn save(&self, config_file: &Path) -> io::Result<()> {
        let mut config: Value = if config_file.exists() {
            let content = fs::read_to_string(config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        let ours = serde_json::to_value(self).map_err(io::Error::other)?;
        if let (Some(target), Value::Object(fields)) = (config.as_object_mut(), ours) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        } else {
            config = serde_json::to_value(self).map_err(io::Error::other)?;
        }

        write_json(config_file, &config)
    }
}

/// 把 `defaults` 中缺失的键补到 `target` 里（只递归一层节对象）
fn merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target), Some(defaults)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in defaults {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), default_value.clone());
            }
            Some(existing) => {
                if let (Some(section), Some(default_section)) =
                    (existing.as_object_mut(), default_value.as_object())
                {
                    for (k, v) in default_section {
                        if !section.contains_key(k) {
                            section.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
        }
    }
}

fn write_json(path: &Path, value: &Value) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    fs::write(path, content)
}
