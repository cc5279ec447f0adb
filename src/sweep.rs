use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::dynamics::{RunSettings, simulate_particle};
use crate::grid::ParameterGrid;
use crate::table::ResultTable;

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub table: ResultTable,
    pub elapsed: Duration,
    pub threads: usize,
}

/// Worker count to use: the explicit request, else every hardware thread.
pub fn resolve_threads(requested: Option<usize>) -> usize {
    requested
        .filter(|&n| n > 0)
        .unwrap_or_else(rayon::current_num_threads)
}

/// Simulates every grid point on a dedicated thread pool.
///
/// Results come back in generation order regardless of which worker finished
/// first. The first failing point aborts the sweep.
pub fn run_sweep(
    grid: &ParameterGrid,
    settings: &RunSettings,
    threads: Option<usize>,
) -> Result<SweepOutcome> {
    let threads = resolve_threads(threads);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("failed to build worker pool")?;

    let total = grid.len();
    let completed = AtomicUsize::new(0);
    let report_every = (total / 10).max(1);

    info!(particles = total, threads, "starting sweep");
    let start = Instant::now();

    let rows = pool.install(|| {
        grid.points
            .par_iter()
            .map(|point| {
                let result = simulate_particle(point, settings).with_context(|| {
                    format!(
                        "simulation failed at grid point {} (a={}, e={}, M={})",
                        point.index,
                        point.semi_major_axis,
                        point.eccentricity,
                        point.mean_anomaly
                    )
                })?;

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(index = point.index, reason = result.reason.label(), "particle done");
                if done % report_every == 0 || done == total {
                    info!("progress {done}/{total}");
                }
                Ok(result)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let elapsed = start.elapsed();
    info!("sweep finished in {:.2} s", elapsed.as_secs_f64());

    Ok(SweepOutcome {
        table: ResultTable::new(rows, grid.n_a, grid.n_e)?,
        elapsed,
        threads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SweepConfig;
    use crate::dynamics::TerminationReason;
    use crate::grid::{MeanAnomaly, generate_grid};

    fn small_config() -> SweepConfig {
        let mut config = SweepConfig::default();
        config.grid.n_a = 3;
        config.grid.n_e = 2;
        config.grid.seed = Some(11);
        config.run.duration_years = 0.05;
        config.run.snapshots = 10;
        config
    }

    #[test]
    fn rows_follow_generation_order() {
        let config = small_config();
        let grid = generate_grid(&config.grid).unwrap();
        let outcome = run_sweep(&grid, &RunSettings::from_config(&config), Some(2)).unwrap();

        assert_eq!(outcome.threads, 2);
        assert_eq!(outcome.table.len(), 6);
        for (row, point) in outcome.table.rows().iter().zip(&grid.points) {
            assert_eq!(row.initial_semi_major_axis, point.semi_major_axis);
            assert_eq!(row.initial_eccentricity, point.eccentricity);
            assert_eq!(row.initial_mean_anomaly, point.mean_anomaly);
        }
    }

    #[test]
    fn thread_count_does_not_change_results() {
        let mut config = small_config();
        config.grid.mean_anomaly = MeanAnomaly::Fixed(0.3);
        let grid = generate_grid(&config.grid).unwrap();
        let settings = RunSettings::from_config(&config);

        let serial = run_sweep(&grid, &settings, Some(1)).unwrap();
        let parallel = run_sweep(&grid, &settings, Some(3)).unwrap();
        assert_eq!(serial.table.rows(), parallel.table.rows());
    }

    #[test]
    fn forced_ejection_marks_every_row() {
        let mut config = small_config();
        config.run.smaxis_limit = 0.001;
        let grid = generate_grid(&config.grid).unwrap();
        let outcome = run_sweep(&grid, &RunSettings::from_config(&config), Some(2)).unwrap();
        assert!(
            outcome
                .table
                .rows()
                .iter()
                .all(|row| row.reason == TerminationReason::Ejected && row.lifetime == 0.0)
        );
    }

    #[test]
    fn zero_threads_falls_back_to_hardware() {
        assert!(resolve_threads(Some(0)) >= 1);
        assert_eq!(resolve_threads(Some(4)), 4);
    }
}
