// cli/src/commands/validate.rs
use std::path::Path;
use anyhow::{Result, Context};
use scoregate_core::{EngineVariant, GatewayConfig};

pub async fn validate_config(path: &Path) -> Result<()> {
    let yaml = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = GatewayConfig::from_yaml(&yaml)?;

    match config.validate() {
        Ok(_) => {
            println!("✓ Configuration is valid");
            println!("\nListening on {}", config.bind_address());
            println!("Workspaces under {}", config.workspace_root.display());
            println!("Accepted formats: {}", config.accepted_extensions.join(", "));
            println!(
                "Timeouts: engine {}s, session {}s, sweep every {}s",
                config.engine_timeout_secs, config.session_timeout_secs, config.sweep_interval_secs
            );
            for variant in EngineVariant::ALL {
                if let Some(spec) = config.engine(variant) {
                    println!("  ↳ {}: {} {}", variant, spec.executable, spec.args.join(" "));
                }
            }
            Ok(())
        }
        Err(e) => anyhow::bail!("Validation error: {}", e),
    }
}
