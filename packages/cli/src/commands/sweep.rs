// cli/src/commands/sweep.rs
use std::path::Path;
use std::sync::Arc;
use anyhow::Result;
use colored::*;
use scoregate_core::{GatewayConfig, Janitor, SweepReport, WorkspaceRegistry};

use super::load_config;
use super::utils::format_duration;

pub async fn sweep_workspaces(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let report = run_sweep(&config).await?;

    println!(
        "Swept {} (session timeout {})",
        config.workspace_root.display(),
        format_duration(config.session_timeout_secs as i64)
    );
    println!("  examined: {}", report.examined);
    println!("  removed:  {}", report.removed.to_string().green());
    if report.failed > 0 {
        println!("  failed:   {}", report.failed.to_string().red());
    }
    Ok(())
}

/// Adopts every workspace directory under the root, then sweeps once.
pub(crate) async fn run_sweep(config: &GatewayConfig) -> Result<SweepReport> {
    let registry = Arc::new(WorkspaceRegistry::new(config.workspace_root.clone()).await?);
    registry.adopt_orphans().await?;

    let janitor = Janitor::new(
        Arc::clone(&registry),
        config.session_timeout(),
        config.sweep_interval(),
    );
    Ok(janitor.sweep().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_sweep_removes_stale_directories() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join(format!("score_{}", uuid_like()));
        std::fs::create_dir(&stale).unwrap();
        std::fs::create_dir(dir.path().join("unrelated")).unwrap();

        let mut config = GatewayConfig::default();
        config.workspace_root = dir.path().to_path_buf();
        config.session_timeout_secs = 1;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let report = run_sweep(&config).await.unwrap();

        assert_eq!(report, SweepReport { examined: 1, removed: 1, failed: 0 });
        assert!(!stale.exists());
        assert!(dir.path().join("unrelated").exists());
    }

    #[tokio::test]
    async fn test_run_sweep_keeps_fresh_directories() {
        let dir = tempdir().unwrap();
        let fresh = dir.path().join(format!("score_{}", uuid_like()));
        std::fs::create_dir(&fresh).unwrap();

        let mut config = GatewayConfig::default();
        config.workspace_root = dir.path().to_path_buf();

        let report = run_sweep(&config).await.unwrap();
        assert_eq!(report.removed, 0);
        assert!(fresh.exists());
    }

    fn uuid_like() -> &'static str {
        "4f1c2b9e-8d3a-4c6f-9e2b-7a5d1c3e8f90"
    }
}
