use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

pub mod commands;

#[derive(Parser)]
#[command(name = "scoregate")]
#[command(about = "ScoreGate - sheet music recognition gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Check a configuration file
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List the engine variants and whether they can run here
    Engines {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Recognize a single image without going through the server
    Recognize {
        image: PathBuf,
        #[arg(short, long, default_value = "fast")]
        engine: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run one cleanup pass over the workspace root
    Sweep {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { path } => {
            commands::init_config(&path.unwrap_or_else(|| PathBuf::from(commands::DEFAULT_CONFIG_FILE))).await?;
        }
        Commands::Validate { config } => {
            let config_path = config.unwrap_or_else(|| PathBuf::from(commands::DEFAULT_CONFIG_FILE));
            commands::validate_config(&config_path).await?;
        }
        Commands::Engines { config } => {
            commands::show_engines(config.as_deref()).await?;
        }
        Commands::Recognize { image, engine, output, config } => {
            commands::recognize_image(&image, &engine, output.as_deref(), config.as_deref()).await?;
        }
        Commands::Sweep { config } => {
            commands::sweep_workspaces(config.as_deref()).await?;
        }
    }
    Ok(())
}
