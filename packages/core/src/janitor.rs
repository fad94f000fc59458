use crate::models::Workspace;
use crate::workspace::{remove_dir_if_present, WorkspaceRegistry};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Background expiry of idle workspaces.
///
/// Deletion is best effort: a workspace that cannot be deleted stays
/// registered and is retried on the next sweep, and nothing a sweep does can
/// take the loop down.
pub struct Janitor {
    registry: Arc<WorkspaceRegistry>,
    session_timeout: Duration,
    sweep_interval: Duration,
}

impl Janitor {
    pub fn new(registry: Arc<WorkspaceRegistry>, session_timeout: Duration, sweep_interval: Duration) -> Self {
        Self {
            registry,
            session_timeout,
            sweep_interval,
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let snapshot = self.registry.snapshot().await;
        let mut report = SweepReport {
            examined: snapshot.len(),
            ..Default::default()
        };

        for workspace in snapshot {
            if !self.is_expired(&workspace, now).await {
                continue;
            }

            match remove_dir_if_present(&workspace.path).await {
                Ok(()) => {
                    self.registry.remove(workspace.id).await;
                    debug!("Expired workspace {} removed", workspace.id);
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("Failed to delete expired workspace {:?}: {}", workspace.path, e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                "Sweep finished: {} examined, {} removed, {} failed",
                report.examined, report.removed, report.failed
            );
        }
        report
    }

    async fn is_expired(&self, workspace: &Workspace, now: DateTime<Utc>) -> bool {
        if tokio::fs::metadata(&workspace.path).await.is_err() {
            return true;
        }
        match workspace.idle_for(now).to_std() {
            Ok(idle) => idle > self.session_timeout,
            // Touched after `now`: not idle at all.
            Err(_) => false,
        }
    }

    /// Runs sweeps forever on the current runtime. The first sweep happens
    /// one interval after start.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            "Janitor started: sweeping every {}s, session timeout {}s",
            self.sweep_interval.as_secs(),
            self.session_timeout.as_secs()
        );
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.sweep_interval).await;
                self.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup(session_timeout: Duration) -> (tempfile::TempDir, Arc<WorkspaceRegistry>, Janitor) {
        let temp_dir = tempdir().unwrap();
        let registry = Arc::new(WorkspaceRegistry::new(temp_dir.path().to_path_buf()).await.unwrap());
        let janitor = Janitor::new(Arc::clone(&registry), session_timeout, Duration::from_secs(300));
        (temp_dir, registry, janitor)
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_workspace() {
        let (_temp_dir, registry, janitor) = setup(Duration::from_secs(3600)).await;
        let workspace = registry.create_workspace().await.unwrap();
        std::fs::write(workspace.path.join("out.musicxml"), b"<score-partwise/>").unwrap();

        let later = Utc::now() + chrono::Duration::seconds(3601);
        let report = janitor.sweep_at(later).await;

        assert_eq!(report, SweepReport { examined: 1, removed: 1, failed: 0 });
        assert!(!workspace.path.exists());
        assert!(registry.get(workspace.id).await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_keeps_young_workspace() {
        let (_temp_dir, registry, janitor) = setup(Duration::from_secs(3600)).await;
        let workspace = registry.create_workspace().await.unwrap();

        let report = janitor.sweep_at(Utc::now() + chrono::Duration::seconds(60)).await;

        assert_eq!(report, SweepReport { examined: 1, removed: 0, failed: 0 });
        assert!(workspace.path.is_dir());
        assert!(registry.get(workspace.id).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_forgets_vanished_directory() {
        let (_temp_dir, registry, janitor) = setup(Duration::from_secs(3600)).await;
        let gone = registry.create_workspace().await.unwrap();
        let kept = registry.create_workspace().await.unwrap();
        std::fs::remove_dir_all(&gone.path).unwrap();

        let report = janitor.sweep().await;

        assert_eq!(report.removed, 1);
        assert!(registry.get(gone.id).await.is_none());
        assert!(registry.get(kept.id).await.is_some());
    }

    #[tokio::test]
    async fn test_failed_deletion_is_kept_and_sweep_continues() {
        let (temp_dir, registry, janitor) = setup(Duration::from_secs(3600)).await;
        let deletable = registry.create_workspace().await.unwrap();

        // A path below a regular file: lookup fails, and so does deletion.
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let undeletable = Workspace {
            id: uuid::Uuid::new_v4(),
            path: blocker.join("score_stuck"),
            created_at: Utc::now(),
            last_touched: Utc::now(),
        };
        assert!(registry.register(undeletable.clone()).await);

        let report = janitor.sweep_at(Utc::now() + chrono::Duration::seconds(3601)).await;

        assert_eq!(report, SweepReport { examined: 2, removed: 1, failed: 1 });
        assert!(!deletable.path.exists());
        assert!(registry.get(deletable.id).await.is_none());
        assert!(registry.get(undeletable.id).await.is_some());

        // Retried, and still counted, on the next sweep.
        let report = janitor.sweep_at(Utc::now() + chrono::Duration::seconds(3601)).await;
        assert_eq!(report, SweepReport { examined: 1, removed: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_expiry_counts_from_last_touch() {
        let (_temp_dir, registry, janitor) = setup(Duration::from_secs(1)).await;
        let workspace = registry.create_workspace().await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.touch_workspace(workspace.id).await;
        let touched = registry.get(workspace.id).await.unwrap().last_touched;

        assert_eq!(janitor.sweep_at(touched + chrono::Duration::milliseconds(990)).await.removed, 0);
        assert_eq!(janitor.sweep_at(touched + chrono::Duration::seconds(2)).await.removed, 1);
    }

    #[tokio::test]
    async fn test_spawned_loop_keeps_sweeping() {
        let temp_dir = tempdir().unwrap();
        let registry = Arc::new(WorkspaceRegistry::new(temp_dir.path().to_path_buf()).await.unwrap());
        let handle = Janitor::new(Arc::clone(&registry), Duration::from_secs(3600), Duration::from_millis(50)).spawn();

        for _ in 0..2 {
            let workspace = registry.create_workspace().await.unwrap();
            std::fs::remove_dir_all(&workspace.path).unwrap();
            for _ in 0..40 {
                if registry.is_empty().await {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            assert!(registry.is_empty().await);
        }

        assert!(!handle.is_finished());
        handle.abort();
    }
}
