// cli/src/commands/init.rs
use std::path::Path;
use anyhow::{Result, Context};
use scoregate_core::GatewayConfig;

pub async fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    let yaml = GatewayConfig::default().to_yaml()?;
    tokio::fs::write(path, yaml).await.context("Failed to write config file")?;

    println!("Created new configuration at {}", path.display());
    Ok(())
}
