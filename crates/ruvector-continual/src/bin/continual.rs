//! Continual CLI - drive and inspect the continual-learning engine
//!
//! ## Commands
//!
//! - `continual run` - Train over synthetic tasks, optionally checkpointing
//! - `continual verify <checkpoint>` - Check a checkpoint's integrity hash
//! - `continual inspect <checkpoint>` - Summarize a checkpoint
//! - `continual config` - Print the default configuration as TOML

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use ruvector_continual::{Checkpoint, ContinualConfig, ContinualEngine, EpochMetrics, TaskGenerator};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Continual - self-improving adapter training loop
#[derive(Parser)]
#[command(name = "continual")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the engine over synthetic tasks
    Run {
        /// Number of epochs to run
        #[arg(short, long, default_value = "10")]
        epochs: usize,

        /// Tasks per epoch
        #[arg(short, long, default_value = "32")]
        tasks_per_epoch: usize,

        /// TOML configuration file
        #[arg(short, long, env = "CONTINUAL_CONFIG")]
        config: Option<PathBuf>,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write a checkpoint here after the last epoch
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Resume from this checkpoint (cold start if unusable)
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Print metrics as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Verify a checkpoint's integrity hash
    Verify {
        /// Checkpoint file
        checkpoint: PathBuf,
    },

    /// Summarize a checkpoint
    Inspect {
        /// Checkpoint file
        checkpoint: PathBuf,
    },

    /// Print the default configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Run {
            epochs,
            tasks_per_epoch,
            config,
            seed,
            checkpoint,
            resume,
            json,
        } => run(
            epochs,
            tasks_per_epoch,
            config.as_deref(),
            seed,
            checkpoint.as_deref(),
            resume.as_deref(),
            json,
        ),
        Commands::Verify { checkpoint } => verify(&checkpoint),
        Commands::Inspect { checkpoint } => inspect(&checkpoint),
        Commands::Config => print_default_config(),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

fn run(
    epochs: usize,
    tasks_per_epoch: usize,
    config_path: Option<&Path>,
    seed: Option<u64>,
    checkpoint: Option<&Path>,
    resume: Option<&Path>,
    json: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ContinualConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ContinualConfig::default(),
    };
    if let Some(seed) = seed {
        config.seed = seed;
    }
    config.validate()?;

    let dim = config.embedding_dim;
    let task_seed = config.seed.wrapping_add(1);
    let mut engine = match resume {
        Some(path) => ContinualEngine::load_or_cold_start(config, path)?,
        None => ContinualEngine::new(config)?,
    };
    let mut generator = TaskGenerator::standard(dim, task_seed ^ engine.epoch());

    if !json {
        println!(
            "{} dim={} rank={} starting at epoch {}",
            "Continual:".bold().cyan(),
            dim,
            engine.adapter().rank(),
            engine.epoch()
        );
    }

    for _ in 0..epochs {
        let tasks = generator.generate(tasks_per_epoch, engine.curriculum_level());
        let report = engine.run_epoch(&tasks);
        if json {
            println!("{}", serde_json::to_string(&report.metrics)?);
        } else {
            print_epoch(&report.metrics);
        }
    }

    if let Some(path) = checkpoint {
        let ckpt = engine.checkpoint()?;
        ckpt.save(path)
            .with_context(|| format!("saving checkpoint {}", path.display()))?;
        if !json {
            println!(
                "{} {} ({})",
                "Saved".green().bold(),
                path.display(),
                &ckpt.integrity_hash[..16]
            );
        }
    }

    Ok(())
}

fn verify(path: &Path) -> Result<()> {
    let checkpoint = Checkpoint::load(path)
        .with_context(|| format!("verifying {}", path.display()))?;
    println!(
        "{} {} sha256:{}",
        "OK".green().bold(),
        path.display(),
        checkpoint.integrity_hash
    );
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let checkpoint = Checkpoint::load(path)
        .with_context(|| format!("reading {}", path.display()))?;

    println!();
    println!("{} {}", "Checkpoint:".bold().cyan(), path.display());
    println!("  {} {}", "Format version:".dimmed(), checkpoint.format_version);
    println!("  {} {}", "Created:".dimmed(), checkpoint.created_at.to_rfc3339());
    println!("  {} {}", "Dimension:".dimmed(), checkpoint.dim());
    println!("  {} {}", "Rank:".dimmed(), checkpoint.rank());
    println!("  {} {}", "Scale:".dimmed(), checkpoint.adapter.scale);
    println!(
        "  {} {}",
        "Tasks protected:".dimmed(),
        checkpoint.consolidation.task_count
    );
    println!("  {} {}", "Patterns:".dimmed(), checkpoint.patterns.len());
    println!(
        "  {} {} recorded, {} successful, avg quality {:.3}",
        "Buffer:".dimmed(),
        checkpoint.buffer.total,
        checkpoint.buffer.successful,
        checkpoint.buffer.avg_quality
    );
    println!("  {} {}", "Epochs:".dimmed(), checkpoint.metrics.len());

    if let Some(last) = checkpoint.metrics.last() {
        println!();
        println!("{}", "Last epoch:".bold());
        print_epoch(last);
    }
    println!();

    Ok(())
}

fn print_default_config() -> Result<()> {
    print!("{}", ContinualConfig::default().to_toml()?);
    Ok(())
}

fn print_epoch(m: &EpochMetrics) {
    let rate = format!("{:>5.1}%", m.resolve_rate * 100.0);
    let rate = if m.resolve_rate >= 0.7 {
        rate.green()
    } else if m.resolve_rate >= 0.4 {
        rate.yellow()
    } else {
        rate.red()
    };
    println!(
        "  epoch {:>3}  resolve {}  conf {:.3}  level {}  temp {:.2}  patterns {:>3}  protected {:>3}  lr {:.4}",
        m.epoch,
        rate,
        m.avg_confidence,
        m.curriculum_level,
        m.temperature,
        m.patterns_learned,
        m.tasks_protected,
        m.effective_learning_rate
    );
}
