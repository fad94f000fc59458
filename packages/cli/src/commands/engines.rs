// cli/src/commands/engines.rs
use std::io::Write;
use std::path::Path;
use anyhow::Result;
use colored::*;
use tabwriter::TabWriter;
use scoregate_core::{EngineVariant, Executor, GatewayConfig, LocalExecutor};

use super::load_config;
use super::utils::format_duration;

pub async fn show_engines(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    print!("{}", render_engines(&config)?);
    Ok(())
}

pub(crate) fn render_engines(config: &GatewayConfig) -> Result<String> {
    let executor = LocalExecutor::new(config.engines.clone());

    let mut tw = TabWriter::new(vec![]);
    writeln!(&mut tw, "VARIANT\tEXECUTABLE\tFLAGS\tOUTPUT\tSTATUS")?;

    for variant in EngineVariant::ALL {
        let Some(spec) = config.engine(variant) else {
            writeln!(&mut tw, "{}\t-\t-\t-\t{}", variant, "✗ Not configured".red())?;
            continue;
        };

        let status = if executor.is_available(variant) {
            "✓ Available".green()
        } else {
            "✗ Missing".red()
        };
        let flags = if spec.args.is_empty() { "-".to_string() } else { spec.args.join(" ") };

        writeln!(
            &mut tw,
            "{}\t{}\t{}\t{}\t{}",
            variant, spec.executable, flags, spec.primary_extension, status
        )?;
    }

    writeln!(
        &mut tw,
        "\nEngine timeout: {}",
        format_duration(config.engine_timeout_secs as i64)
    )?;
    tw.flush()?;
    Ok(String::from_utf8(tw.into_inner()?)?)
}
