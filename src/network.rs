use crate::config::NetworkConfig;
use crate::process::run_tool;
use std::time::Duration;
use tracing::debug;

/// ping 的整体超时
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// 网络连通性检测：向固定主机发送一次 ICMP echo
pub struct NetworkCheck {
    ping_command: String,
    host: String,
}

impl NetworkCheck {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            ping_command: config.ping_command.clone(),
            host: config.test_host.clone(),
        }
    }

    pub async fn is_reachable(&self) -> bool {
        let result = run_tool(&self.ping_command, ["-c", "1", "-W", "2", self.host.as_str()], PING_TIMEOUT).await;
        if let Err(e) = &result {
            debug!("网络不可达 ({}): {}", self.host, e);
        }
        result.is_ok()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_status_decides_reachability() {
        let up = NetworkCheck::new(&NetworkConfig {
            ping_command: "true".into(),
            test_host: "8.8.8.8".into(),
        });
        assert!(up.is_reachable().await);

        let down = NetworkCheck::new(&NetworkConfig {
            ping_command: "false".into(),
            test_host: "8.8.8.8".into(),
        });
        assert!(!down.is_reachable().await);
    }
}
