//! Slingshot agent CLI.
//!
//! - `play`     -- Drive the scripted mock game through decision cycles
//! - `inspect`  -- Summarize the stored per-level shot datasets

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use slingshot_agent::config::AgentConfig;
use slingshot_agent::dataset::DatasetStore;
use slingshot_agent::env::mock::MockGame;
use slingshot_agent::runner::AgentRunner;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Slingshot agent with an online shot-quality classifier
#[derive(Parser)]
#[command(name = "slingshot-agent", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the dataset directory from the configuration.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the scripted mock game.
    Play {
        /// Level to start from (defaults to the configured start level).
        #[arg(long)]
        start_level: Option<u32>,

        /// Number of decision cycles to run (runs forever if omitted).
        #[arg(long)]
        cycles: Option<usize>,

        /// Seed for the planner's random choices.
        #[arg(long)]
        seed: Option<u64>,

        /// Skip the settle and pre-shot delays.
        #[arg(long)]
        no_delays: bool,
    },

    /// Summarize the stored shot datasets.
    Inspect,
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str::<AgentConfig>(&text)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        }
        None => AgentConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.dataset.data_dir = dir;
    }

    match cli.command {
        Commands::Play {
            start_level,
            cycles,
            seed,
            no_delays,
        } => {
            if let Some(level) = start_level {
                config.runner.start_level = level;
            }
            if no_delays {
                config.runner.settle_delay_ms = 0;
                config.runner.pre_shot_delay_ms = 0;
            }
            cmd_play(&config, cycles, seed).await
        }
        Commands::Inspect => cmd_inspect(&config),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_play(config: &AgentConfig, cycles: Option<usize>, seed: Option<u64>) -> Result<()> {
    let store = DatasetStore::open(&config.dataset)?;
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    tracing::info!(
        start_level = config.runner.start_level,
        ?cycles,
        ?seed,
        data_dir = %store.data_dir().display(),
        "Playing mock game"
    );

    let mut runner = AgentRunner::new(config, MockGame::new(), store, rng);
    runner.start().await?;
    let summary = runner.run(cycles).await;

    println!("Cycles: {}", summary.cycles);
    println!("  Shots fired:      {}", summary.shots_fired);
    println!("  Levels completed: {}", summary.levels_completed);
    println!("  Levels lost:      {}", summary.levels_lost);
    println!("  Failed cycles:    {}", summary.errors);
    println!();

    let scores = runner.scores();
    if !scores.is_empty() {
        println!("Best scores:");
        for (level, entry) in scores.iter() {
            println!(
                "  Level {level}: {} ({} completions, last {})",
                entry.best,
                entry.completions,
                entry.last_completed_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        println!("  Total: {}", scores.total());
    }

    Ok(())
}

fn cmd_inspect(config: &AgentConfig) -> Result<()> {
    let store = DatasetStore::open(&config.dataset)?;
    let levels = store.levels()?;

    println!("Datasets: {}", store.data_dir().display());
    println!("  Levels: {}", levels.len());
    println!();

    for level in levels {
        let data = store.snapshot(level)?;
        let (good, bad) = data.label_counts();
        println!(
            "  Level {level}: {} shots ({good} good, {bad} bad), {} attempts ended",
            data.len(),
            data.boundary_count()
        );
        if let Some(last) = data.last_record() {
            println!("    Last: {}", last.to_line());
        }
    }

    Ok(())
}
