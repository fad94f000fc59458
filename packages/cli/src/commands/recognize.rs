// cli/src/commands/recognize.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use anyhow::{Context, Result};
use colored::*;
use scoregate_core::{GatewayConfig, LocalExecutor, RecognitionEngine, WorkspaceRegistry};

use super::load_config;
use super::utils::format_duration;

pub async fn recognize_image(
    image: &Path,
    engine: &str,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let started = Instant::now();

    let written = run_recognition(config, image, engine, output).await?;

    println!(
        "{} {} -> {} in {}",
        "✓".green(),
        image.display(),
        written.display(),
        format_duration(started.elapsed().as_secs() as i64)
    );
    Ok(())
}

/// Runs one recognition through the orchestrator, copies the primary output
/// to `output` (or the artifact's own name in the current directory) and
/// deletes the workspace.
pub(crate) async fn run_recognition(
    config: GatewayConfig,
    image: &Path,
    engine: &str,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let filename = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", image.display()))?;
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read {}", image.display()))?;

    let config = Arc::new(config);
    let registry = Arc::new(WorkspaceRegistry::new(config.workspace_root.clone()).await?);
    let executor = Arc::new(LocalExecutor::new(config.engines.clone()));
    let orchestrator = RecognitionEngine::new(Arc::clone(&config), registry, executor);

    let handle = orchestrator
        .recognize_selector(&bytes, &filename, Some(engine))
        .await
        .with_context(|| format!("Recognition of {} failed", image.display()))?;

    let destination = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&handle.file_name));
    let copied = tokio::fs::copy(&handle.path, &destination)
        .await
        .with_context(|| format!("Failed to write {}", destination.display()));

    if let Err(e) = orchestrator.release(&handle).await {
        log::warn!("Could not delete workspace {}: {}", handle.workspace_id, e);
    }
    copied?;

    if !handle.auxiliary.is_empty() {
        log::info!("Discarded auxiliary outputs: {}", handle.auxiliary.join(", "));
    }
    Ok(destination)
}
