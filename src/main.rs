use anyhow::Context;
use clap::Parser;
use picamsync_lib::daemon::{spawn_signal_listener, Daemon};
use picamsync_lib::logging::{init_logging, LogConfig};
use picamsync_lib::{AppConfig, AppPaths};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 定时拍照并同步到云端存储
#[derive(Debug, Parser)]
#[command(name = "picamsync", version, about)]
struct Cli {
    /// 工作目录，照片与日志保存在其下
    #[arg(long, env = "PICAMSYNC_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// 配置文件，默认 `<base-dir>/config.json`
    #[arg(long)]
    config: Option<PathBuf>,

    /// 跳过启动安全模式等待
    #[arg(long)]
    no_safe_mode: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = AppPaths::new(&cli.base_dir);
    let config_file = cli.config.clone().unwrap_or_else(|| paths.default_config_file());
    let config = AppConfig::load(&config_file);

    // guard 必须活到进程结束
    let _guard = init_logging(&LogConfig::new(&paths.logs_dir, &config.log_level));

    match run(cli, config, paths).await {
        Ok(code) => code,
        Err(e) => {
            error!("未处理的异常: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut config: AppConfig, paths: AppPaths) -> anyhow::Result<ExitCode> {
    info!("启动相机系统, 工作目录: {}", paths.base_dir.display());
    paths.ensure().context("创建工作目录失败")?;

    if cli.no_safe_mode {
        config.startup.safe_mode = false;
    }

    let cancel = CancellationToken::new();
    let signals = spawn_signal_listener(cancel.clone());

    let mut daemon = Daemon::new(config, paths)?;
    daemon.check_remote().await;

    if !daemon.check_camera().await {
        error!("未检测到相机，退出");
        return Ok(ExitCode::FAILURE);
    }

    if !daemon.safe_mode_delay(&cancel).await {
        info!("安全模式期间收到中断，放弃启动");
        return Ok(ExitCode::SUCCESS);
    }

    daemon.run(&cancel).await?;
    signals.abort();
    Ok(ExitCode::SUCCESS)
}
