// cli/src/commands.rs
use std::path::Path;
use anyhow::{Context, Result};
use scoregate_core::GatewayConfig;

pub const DEFAULT_CONFIG_FILE: &str = "scoregate.yml";

mod utils {
    pub(crate) fn format_duration(seconds: i64) -> String {
        if seconds < 60 {
            format!("{}s", seconds)
        } else if seconds < 3600 {
            format!("{}m {}s", seconds / 60, seconds % 60)
        } else {
            format!("{}h {}m {}s", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
        }
    }
}

/// Loads the given config file, or `./scoregate.yml` when it exists, or the
/// built-in defaults. Environment overrides apply in every case.
pub(crate) fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    let path = match path {
        Some(path) => Some(path),
        None if default_path.exists() => Some(default_path),
        None => None,
    };

    let config = GatewayConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", describe(path)))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn describe(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string())
}

pub mod init;
pub mod validate;
pub mod engines;
pub mod recognize;
pub mod sweep;

pub use init::init_config;
pub use validate::validate_config;
pub use engines::show_engines;
pub use recognize::recognize_image;
pub use sweep::sweep_workspaces;
