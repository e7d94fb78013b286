mod commands;
mod config;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::analyze::AnalyzeArgs;
use commands::metrics::MetricsArgs;
use commands::optimize::{FrontierArgs, OptimizeArgs, StatsArgs, SweepArgs};

/// Maximum-Sharpe long-only portfolio allocation
#[derive(Parser)]
#[command(
    name = "salloc",
    version,
    about = "Maximum-Sharpe long-only portfolio allocation",
    long_about = "Builds annualized return statistics from daily close prices, finds the \
                  long-only fully-invested portfolio with the highest Sharpe ratio, and \
                  shows how that allocation moves as the risk-free rate changes."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Annualized expected returns, covariance and correlation
    Stats(StatsArgs),
    /// Maximum Sharpe portfolio at one or more risk-free rates
    Optimize(OptimizeArgs),
    /// Re-optimize across an evenly spaced grid of risk-free rates
    Sweep(SweepArgs),
    /// Return, volatility and Sharpe ratio of given weights
    Metrics(MetricsArgs),
    /// Long-only efficient frontier
    Frontier(FrontierArgs),
    /// Full analysis from a YAML or JSON run configuration
    Analyze(AnalyzeArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "sharpe_alloc=debug,salloc=debug"
    } else {
        "sharpe_alloc=info,salloc=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Stats(args) => commands::optimize::run_stats(args),
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Sweep(args) => commands::optimize::run_sweep(args),
        Commands::Metrics(args) => commands::metrics::run_metrics(args),
        Commands::Frontier(args) => commands::optimize::run_frontier(args),
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::Version => {
            println!("salloc {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
