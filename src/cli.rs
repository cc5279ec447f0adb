use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command line options for the test-particle sweep.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stability sweep of test particles orbiting a planet on an eccentric orbit"
)]
pub struct CliOptions {
    /// Path to the sweep TOML configuration file. Defaults to
    /// `config/sweep.toml` when that file exists, built-in values otherwise.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of worker threads (defaults to every hardware thread).
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Seed for the random mean anomalies.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Override the output directory configured in the TOML file.
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Override the integrator configured in the TOML file.
    #[arg(long, value_enum)]
    pub integrator: Option<IntegratorOverride>,

    /// Display configuration summary without running the sweep.
    #[arg(long)]
    pub dry_run: bool,

    /// Simulate a single grid point, print its final state and chart its path.
    #[arg(long, value_name = "INDEX", conflicts_with = "replot")]
    pub inspect: Option<usize>,

    /// Redraw the heatmaps from an existing results CSV instead of simulating.
    #[arg(long, value_name = "CSV")]
    pub replot: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Integrators selectable from the CLI.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum IntegratorOverride {
    WisdomHolman,
    Leapfrog,
    Yoshida4,
}
