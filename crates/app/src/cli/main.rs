//! Resonant CLI Application

mod keyboard;
mod play;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resonant_core::domain::config::{ConfigManager, ResonantConfig};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resonant")]
#[command(about = "Real-time streaming low-pass filter for audio files", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.config/resonant/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file (`play` logs nowhere otherwise)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play files interactively through the filter
    Play {
        /// WAV files; `o` cycles through them
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Initial cutoff in Hz
        #[arg(long)]
        cutoff: Option<f64>,

        /// Initial resonance
        #[arg(long)]
        q: Option<f64>,
    },

    /// Filter a file offline and write the result as WAV
    Render {
        input: PathBuf,
        output: PathBuf,

        #[arg(long)]
        cutoff: Option<f64>,

        #[arg(long)]
        q: Option<f64>,

        /// Ramp the cutoff linearly to this value over the file
        #[arg(long, value_name = "HZ")]
        sweep_to: Option<f64>,

        /// Frames played per simulated tick
        #[arg(long, value_name = "N")]
        frames_per_tick: Option<usize>,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration to the config file
        #[arg(long)]
        write_default: bool,
    },
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(path) = &cli.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else if matches!(cli.command, Command::Play { .. }) {
        // The terminal belongs to the status display
        builder.with_writer(std::io::sink).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }

    Ok(())
}

fn config_manager(cli: &Cli) -> Result<ConfigManager> {
    match &cli.config {
        Some(path) => Ok(ConfigManager::with_path(path.clone())),
        None => Ok(ConfigManager::new(ConfigManager::default_config_dir()?)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    tracing::info!("Resonant starting...");

    let manager = config_manager(&cli)?;
    let config = manager.load().await;

    match cli.command {
        Command::Play { files, cutoff, q } => {
            let options = play::PlayOptions { files, cutoff, q };
            tokio::task::spawn_blocking(move || play::run(options, config)).await??;
        }
        Command::Render {
            input,
            output,
            cutoff,
            q,
            sweep_to,
            frames_per_tick,
        } => {
            let options = render::RenderOptions {
                input,
                output,
                cutoff,
                q,
                sweep_to,
                frames_per_tick,
            };
            let summary =
                tokio::task::spawn_blocking(move || render::run(options, &config)).await??;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Config { write_default } => {
            if write_default {
                let config = ResonantConfig::default();
                manager.save(&config).await?;
                println!("# written to {}", manager.config_path().display());
                print!("{}", config.to_toml()?);
            } else {
                println!("# {}", manager.config_path().display());
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}
