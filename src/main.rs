mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use testparticle_sweep::config::{ConfigLoader, SweepConfig};
use testparticle_sweep::dynamics::{RunSettings, trace_particle};
use testparticle_sweep::grid::{ParameterGrid, generate_grid};
use testparticle_sweep::integrator::IntegratorKind;
use testparticle_sweep::orbit::YEAR;
use testparticle_sweep::output::{
    OutputArtifacts, ensure_directory, read_results_csv, resolve_artifacts, write_results_csv,
    write_summary_json, write_trajectory_csv,
};
use testparticle_sweep::plotting::{render_heatmaps, render_trajectory};
use testparticle_sweep::sweep::run_sweep;

use crate::cli::{CliOptions, IntegratorOverride};

const DEFAULT_CONFIG: &str = "config/sweep.toml";

fn main() -> Result<()> {
    let cli = CliOptions::parse();
    init_tracing(cli.verbose)?;

    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config);
    config.validate().context("invalid command line overrides")?;

    info!("Configuration summary:");
    for line in config.summary_lines() {
        info!("  - {line}");
    }

    if cli.dry_run {
        info!("Dry-run requested; exiting without running the sweep.");
        return Ok(());
    }

    let artifacts = resolve_artifacts(&config.output);
    ensure_directory(&artifacts.directory)?;

    if let Some(csv) = &cli.replot {
        return replot(csv, &config, &artifacts);
    }

    let grid = generate_grid(&config.grid)?;
    let settings = RunSettings::from_config(&config);

    if let Some(index) = cli.inspect {
        return inspect(&grid, index, &settings, &artifacts);
    }

    let outcome = run_sweep(&grid, &settings, config.run.threads)?;
    let counts = outcome.table.reason_counts();
    info!(
        "{} survived, {} ejected, {} escaped",
        counts.survived, counts.ejected, counts.escaped
    );

    let mut files = Vec::new();
    write_results_csv(&artifacts.results_csv, &outcome.table)?;
    files.push(artifacts.results_csv.clone());

    if let Some(path) = &artifacts.summary_json {
        write_summary_json(path, &config, &outcome)?;
        files.push(path.clone());
    }

    files.extend(render_heatmaps(&outcome.table, &artifacts, &config.output)?);
    log_written(&files);
    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// An explicit path must exist; the default path is optional.
fn load_config(path: Option<&Path>) -> Result<SweepConfig> {
    match path {
        Some(path) if path.exists() => ConfigLoader::load_from_path(path),
        Some(path) => Err(anyhow!(
            "configuration file {} does not exist",
            path.display()
        )),
        None => {
            let default = Path::new(DEFAULT_CONFIG);
            if default.exists() {
                ConfigLoader::load_from_path(default)
            } else {
                warn!("{DEFAULT_CONFIG} not found; using built-in defaults");
                Ok(SweepConfig::default())
            }
        }
    }
}

fn apply_overrides(cli: &CliOptions, config: &mut SweepConfig) {
    if let Some(threads) = cli.threads {
        config.run.threads = Some(threads);
    }
    if let Some(seed) = cli.seed {
        config.grid.seed = Some(seed);
    }
    if let Some(directory) = &cli.output {
        config.output.directory = directory.clone();
    }
    if let Some(integrator) = cli.integrator {
        config.system.integrator = match integrator {
            IntegratorOverride::WisdomHolman => IntegratorKind::WisdomHolman,
            IntegratorOverride::Leapfrog => IntegratorKind::Leapfrog,
            IntegratorOverride::Yoshida4 => IntegratorKind::Yoshida4,
        };
    }
}

fn inspect(
    grid: &ParameterGrid,
    index: usize,
    settings: &RunSettings,
    artifacts: &OutputArtifacts,
) -> Result<()> {
    let point = grid.get(index).ok_or_else(|| {
        anyhow!(
            "grid point {index} out of range; the grid has {} points",
            grid.len()
        )
    })?;
    info!(
        "Inspecting grid point {index}: a={} e={} M={:.6}",
        point.semi_major_axis, point.eccentricity, point.mean_anomaly
    );

    let trace = trace_particle(point, settings)?;
    let result = &trace.result;
    info!(
        "{} after {:.3} yr: max a={:.6} max e={:.6} max inc={:.3e}",
        result.reason.label(),
        result.lifetime / YEAR,
        result.max_semi_major_axis,
        result.max_eccentricity,
        result.max_inclination
    );
    for line in trace.state.status_lines() {
        info!("  {line}");
    }

    let csv = artifacts.trajectory_csv(index);
    write_trajectory_csv(&csv, &trace.trajectory)?;
    let mut files = vec![csv];
    if !trace.trajectory.is_empty() {
        files.extend(render_trajectory(&trace.trajectory, index, artifacts)?);
    }
    log_written(&files);
    Ok(())
}

fn replot(csv: &Path, config: &SweepConfig, artifacts: &OutputArtifacts) -> Result<()> {
    let table = read_results_csv(csv)?;
    let (n_a, n_e) = table.dims();
    info!("Loaded {} results ({n_a}x{n_e}) from {}", table.len(), csv.display());

    let files = render_heatmaps(&table, artifacts, &config.output)?;
    log_written(&files);
    Ok(())
}

fn log_written(files: &[PathBuf]) {
    info!("Wrote {} files:", files.len());
    for file in files {
        info!("  -> {}", file.display());
    }
}
