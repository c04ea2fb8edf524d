//! lockpool CLI - run deadlock detection scenarios against a lock pool

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use lockpool_core::config::Config;
use lockpool_core::locking::LockPool;
use lockpool_core::scenarios;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "lockpool")]
#[command(author, version, about = "Lock pool with deadlock detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// One task takes every lock, then tries to take one twice
    Sequential {
        /// Number of locks (defaults to pool.lock_count)
        #[arg(short, long)]
        locks: Option<usize>,
    },

    /// Build a ring of waiting tasks and check that closing it is refused
    Ring {
        /// Number of locks (defaults to pool.lock_count)
        #[arg(short, long)]
        locks: Option<usize>,
    },

    /// Dining philosophers who grab left then right
    Philosophers {
        /// Number of philosophers (defaults to philosophers.seats)
        #[arg(short, long)]
        seats: Option<usize>,
        /// Meals per philosopher (defaults to philosophers.rounds)
        #[arg(short, long)]
        rounds: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lockpool=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sequential { locks } => cmd_sequential(locks, cli.format, cli.quiet).await,
        Commands::Ring { locks } => cmd_ring(locks, cli.format, cli.quiet).await,
        Commands::Philosophers { seats, rounds } => {
            cmd_philosophers(seats, rounds, cli.format, cli.quiet).await
        }
        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn build_pool(config: &Config, locks: Option<usize>) -> anyhow::Result<LockPool> {
    let mut pool_config = config.pool.clone();
    if let Some(locks) = locks {
        pool_config.lock_count = locks;
    }
    LockPool::from_config(&pool_config).context("Failed to create lock pool")
}

fn print_json<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

async fn cmd_sequential(
    locks: Option<usize>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let pool = build_pool(&config, locks)?;
    info!(pool_id = %pool.id(), "Running sequential scenario");

    let report = scenarios::sequential(&pool).await?;

    if format == OutputFormat::Json {
        print_json(&report)?;
    } else if !quiet {
        println!("Acquired {} of {} locks with one task", report.acquired, report.lock_count);
        println!(
            "Re-acquire of a held lock: {}",
            if report.reacquire_refused { "refused (deadlock)" } else { "granted" }
        );
        println!("Re-acquire after release: ok");
    }

    if !report.reacquire_refused {
        bail!("Re-acquiring a held lock was not refused");
    }
    Ok(())
}

async fn cmd_ring(locks: Option<usize>, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let pool = Arc::new(build_pool(&config, locks)?);
    info!(pool_id = %pool.id(), "Running ring scenario");

    let report = scenarios::ring(pool).await?;

    if format == OutputFormat::Json {
        print_json(&report)?;
    } else if !quiet {
        println!("Ring of {} workers over {} locks", report.workers, report.lock_count);
        if report.deadlock_detected {
            let chain: Vec<String> = report.cycle.iter().map(|t| t.to_string()).collect();
            println!("Deadlock detected: {}", chain.join(" -> "));
        } else {
            println!("Deadlock NOT detected");
        }
        println!("Recovered: {}", if report.recovered { "yes" } else { "no" });
    }

    if !report.deadlock_detected || !report.recovered {
        bail!("Ring scenario did not behave as expected");
    }
    Ok(())
}

async fn cmd_philosophers(
    seats: Option<usize>,
    rounds: Option<usize>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let mut table = config.philosophers.clone();
    if let Some(seats) = seats {
        table.seats = seats;
    }
    if let Some(rounds) = rounds {
        table.rounds = rounds;
    }

    let report = scenarios::philosophers(&table).await?;

    if format == OutputFormat::Json {
        return print_json(&report);
    }
    if !quiet {
        for (seat, meals) in report.meals.iter().enumerate() {
            println!("Philosopher {} ate {} times", seat, meals);
        }
        println!("Deadlocks avoided: {}", report.refusals);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
