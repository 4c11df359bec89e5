mod common;

use common::{set, tree, write, RecordingRemote, REMOTE};
use picamsync_lib::core::{DirectoryRole, SyncConfig, SyncDirectory, SyncEngine, SyncMode, SENTINEL_FILE};
use picamsync_lib::storage::RemoteTarget;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const DAY: &str = "2024-05-01";

struct Fixture {
    local: TempDir,
    remote_root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            local: TempDir::new().unwrap(),
            remote_root: TempDir::new().unwrap(),
        };
        std::fs::create_dir_all(fixture.local_day()).unwrap();
        fixture
    }

    fn local_day(&self) -> std::path::PathBuf {
        self.local.path().join(DAY)
    }

    fn remote_day(&self) -> std::path::PathBuf {
        self.remote_root.path().join("pi_cam").join(DAY)
    }

    fn directory(&self) -> SyncDirectory {
        SyncDirectory::new(DirectoryRole::CurrentImages, self.local.path(), &self.local_day())
    }

    fn engine(&self, remote: Arc<RecordingRemote>, bidirectional: bool) -> SyncEngine {
        SyncEngine::new(
            remote,
            SyncConfig {
                target: RemoteTarget::new(REMOTE, "pi_cam"),
                bidirectional,
                sync_logs: true,
            },
        )
    }
}

fn seed(dir: &Path, files: &[&str]) {
    for f in files {
        write(&dir.join(f), f);
    }
}

#[tokio::test]
async fn bidirectional_sync_converges_to_union() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["a.jpg", "b.jpg"]);
    seed(&fx.remote_day(), &["b.jpg", "c.jpg"]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    let engine = fx.engine(remote.clone(), true);
    let report = engine.run_sync(&fx.directory()).await;

    assert!(report.success);
    assert_eq!(report.mode, SyncMode::Bidirectional);
    assert_eq!((report.uploaded, report.downloaded, report.deleted), (1, 1, 0));

    let union = set(&["a.jpg", "b.jpg", "c.jpg"]);
    assert_eq!(tree(&fx.local_day()), union);
    assert_eq!(tree(&fx.remote_day()), union);
    assert!(!remote.transfer_calls().iter().any(|c| c.starts_with("deletefile")));
}

#[tokio::test]
async fn second_run_issues_no_transfers() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["a.jpg"]);
    seed(&fx.remote_day(), &["c.jpg"]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    let engine = fx.engine(remote.clone(), true);
    assert!(engine.sync(&fx.directory()).await);
    let after_first = remote.transfer_calls().len();
    assert_eq!(after_first, 2);

    let report = engine.run_sync(&fx.directory()).await;
    assert!(report.success);
    assert_eq!(report.transfers(), 0);
    assert_eq!(remote.transfer_calls().len(), after_first);
}

#[tokio::test]
async fn sentinel_is_never_uploaded() {
    let fx = Fixture::new();
    seed(&fx.remote_day(), &["x.jpg"]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    let engine = fx.engine(remote.clone(), true);
    let report = engine.run_sync(&fx.directory()).await;

    assert!(report.success);
    assert_eq!(report.mode, SyncMode::Bidirectional);
    assert_eq!(tree(&fx.local_day()), set(&[SENTINEL_FILE, "x.jpg"]));
    assert_eq!(tree(&fx.remote_day()), set(&["x.jpg"]));
    assert!(remote.transfer_calls().iter().all(|c| !c.contains(SENTINEL_FILE)));
}

#[tokio::test]
async fn remote_sentinel_is_not_downloaded() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["a.jpg"]);
    seed(&fx.remote_day(), &["a.jpg", SENTINEL_FILE]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    let engine = fx.engine(remote.clone(), true);
    let report = engine.run_sync(&fx.directory()).await;

    assert!(report.success);
    assert_eq!(report.transfers(), 0);
    assert!(fx.remote_day().join(SENTINEL_FILE).exists());
}

#[tokio::test]
async fn failed_download_is_treated_as_local_deletion() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["a.jpg"]);
    seed(&fx.remote_day(), &["a.jpg", "gone.jpg"]);

    let remote = Arc::new(RecordingRemote::failing_downloads(fx.remote_root.path()));
    let engine = fx.engine(remote.clone(), true);
    let report = engine.run_sync(&fx.directory()).await;

    // 单个文件失败不影响整体结果
    assert!(report.success);
    assert_eq!(report.failed, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(tree(&fx.remote_day()), set(&["a.jpg"]));

    let calls = remote.transfer_calls();
    let download = calls.iter().position(|c| c.starts_with("copyto usb:")).unwrap();
    let delete = calls.iter().position(|c| c.starts_with("deletefile")).unwrap();
    assert!(download < delete);
}

#[tokio::test]
async fn uploads_run_before_downloads() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["up.jpg"]);
    seed(&fx.remote_day(), &["down.jpg"]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    fx.engine(remote.clone(), true).sync(&fx.directory()).await;

    let calls = remote.transfer_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].ends_with("usb:pi_cam/2024-05-01/up.jpg"));
    assert!(calls[1].starts_with("copyto usb:pi_cam/2024-05-01/down.jpg"));
}

#[tokio::test]
async fn nested_files_keep_relative_paths() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["burst/1.jpg"]);
    seed(&fx.remote_day(), &["burst/2.jpg"]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    assert!(fx.engine(remote, true).sync(&fx.directory()).await);

    let both = set(&["burst/1.jpg", "burst/2.jpg"]);
    assert_eq!(tree(&fx.local_day()), both);
    assert_eq!(tree(&fx.remote_day()), both);
}

#[tokio::test]
async fn one_way_mode_mirrors_local() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["a.jpg"]);
    seed(&fx.remote_day(), &["stale.jpg"]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    let report = fx.engine(remote.clone(), false).run_sync(&fx.directory()).await;

    assert!(report.success);
    assert_eq!(report.mode, SyncMode::OneWay);
    assert_eq!(tree(&fx.remote_day()), set(&["a.jpg"]));
    assert_eq!(tree(&fx.local_day()), set(&["a.jpg"]));
    assert!(remote.calls().iter().all(|c| !c.starts_with("lsf")));
}

#[tokio::test]
async fn fallback_runs_when_remote_directory_is_missing() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["a.jpg"]);

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    let report = fx.engine(remote.clone(), true).run_sync(&fx.directory()).await;

    assert!(report.success);
    assert_eq!(report.mode, SyncMode::FallbackOneWay);
    assert_eq!(report.errors.len(), 1);
    assert!(remote.calls().iter().any(|c| c.starts_with("sync ")));
    assert!(fx.remote_day().join("a.jpg").exists());
}

#[tokio::test]
async fn tool_lost_mid_batch_fails_without_fallback() {
    let fx = Fixture::new();
    seed(&fx.local_day(), &["a.jpg", "b.jpg"]);
    std::fs::create_dir_all(fx.remote_day()).unwrap();

    let remote = Arc::new(RecordingRemote::tool_missing_on_copy(fx.remote_root.path()));
    let engine = fx.engine(remote.clone(), true);
    let report = engine.run_sync(&fx.directory()).await;

    assert!(!report.success);
    assert_eq!(report.mode, SyncMode::Bidirectional);
    assert_eq!((report.uploaded, report.failed), (0, 1));
    assert!(engine.is_disabled());
    assert!(tree(&fx.remote_day()).is_empty());
    assert!(remote.calls().iter().all(|c| !c.starts_with("sync ")));

    let before = remote.calls().len();
    assert!(!engine.sync(&fx.directory()).await);
    assert_eq!(remote.calls().len(), before);
}

#[tokio::test]
async fn one_way_creates_remote_for_directory_without_files() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.local_day().join("burst")).unwrap();

    let remote = Arc::new(RecordingRemote::new(fx.remote_root.path()));
    let report = fx.engine(remote, false).run_sync(&fx.directory()).await;

    assert!(report.success, "{:?}", report.errors);
    assert_eq!(report.mode, SyncMode::OneWay);
    assert!(fx.remote_day().is_dir());
}

#[cfg(unix)]
mod rclone {
    use super::*;
    use crate::common::script;
    use picamsync_lib::storage::RcloneRemote;

    #[tokio::test]
    async fn listing_failure_falls_back_to_rclone_sync() {
        let fx = Fixture::new();
        seed(&fx.local_day(), &["a.jpg"]);
        let bin = TempDir::new().unwrap();
        let log = bin.path().join("calls.log");
        let program = script(
            bin.path(),
            "rclone",
            &format!(
                r#"echo "$@" >> "{}"
[ "$1" = "lsf" ] && {{ echo "directory not found" >&2; exit 3; }}
exit 0"#,
                log.display()
            ),
        );

        let engine = SyncEngine::new(
            Arc::new(RcloneRemote::new(&program)),
            SyncConfig {
                target: RemoteTarget::new("dropbox", "pi_cam"),
                bidirectional: true,
                sync_logs: true,
            },
        );
        let report = engine.run_sync(&fx.directory()).await;

        assert!(report.success);
        assert_eq!(report.mode, SyncMode::FallbackOneWay);
        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("lsf -R dropbox:pi_cam/{}", DAY));
        assert_eq!(lines[1], format!("sync {} dropbox:pi_cam/{}", fx.local_day().display(), DAY));
    }

    #[tokio::test]
    async fn missing_tool_disables_sync() {
        let fx = Fixture::new();
        seed(&fx.local_day(), &["a.jpg"]);

        let engine = SyncEngine::new(
            Arc::new(RcloneRemote::new("/nonexistent/rclone")),
            SyncConfig {
                target: RemoteTarget::new("dropbox", "pi_cam"),
                bidirectional: true,
                sync_logs: true,
            },
        );

        assert!(!engine.check_remote().await);
        assert!(engine.is_disabled());
        assert!(!engine.sync(&fx.directory()).await);
    }

    fn failing_rclone(bin: &TempDir) -> SyncEngine {
        let program = script(
            bin.path(),
            "rclone",
            r#"[ "$1" = "lsf" ] && { echo "directory not found" >&2; exit 3; }
[ "$1" = "sync" ] && { echo "Failed to sync: quota exceeded" >&2; exit 7; }
exit 0"#,
        );
        SyncEngine::new(
            Arc::new(RcloneRemote::new(&program)),
            SyncConfig {
                target: RemoteTarget::new("dropbox", "pi_cam"),
                bidirectional: true,
                sync_logs: true,
            },
        )
    }

    #[tokio::test]
    async fn failing_fallback_sync_reports_failure() {
        let fx = Fixture::new();
        seed(&fx.local_day(), &["a.jpg"]);
        let bin = TempDir::new().unwrap();

        let report = failing_rclone(&bin).run_sync(&fx.directory()).await;

        assert!(!report.success);
        assert_eq!(report.mode, SyncMode::FallbackOneWay);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("directory not found"));
        assert!(report.errors[1].contains("quota exceeded"));
    }

    #[tokio::test]
    async fn failing_one_way_sync_reports_failure() {
        let fx = Fixture::new();
        seed(&fx.local_day(), &["a.jpg"]);
        let bin = TempDir::new().unwrap();
        let program = script(bin.path(), "rclone", r#"echo "Failed to sync: quota exceeded" >&2; exit 7"#);

        let engine = SyncEngine::new(
            Arc::new(RcloneRemote::new(&program)),
            SyncConfig {
                target: RemoteTarget::new("dropbox", "pi_cam"),
                bidirectional: false,
                sync_logs: true,
            },
        );
        let report = engine.run_sync(&fx.directory()).await;

        assert!(!report.success);
        assert_eq!(report.mode, SyncMode::OneWay);
        assert!(report.errors[0].contains("quota exceeded"));
        assert!(!engine.is_disabled());
        assert!(!engine.sync(&fx.directory()).await);
    }
}
