use std::fs;
use std::path::{Path, PathBuf};

use testparticle_sweep::config::ConfigLoader;
use testparticle_sweep::dynamics::{RunSettings, TerminationReason};
use testparticle_sweep::grid::generate_grid;
use testparticle_sweep::integrator::IntegratorKind;
use testparticle_sweep::output::{read_results_csv, resolve_artifacts, write_results_csv};
use testparticle_sweep::sweep::run_sweep;

const SMALL_SWEEP: &str = r#"
[grid]
n_a = 3
n_e = 3
e_max = 0.6
seed = 2024

[run]
duration_years = 0.2
snapshots = 40
threads = 2
"#;

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("testparticle-sweep-it-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn shipped_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/sweep.toml");
    let config = ConfigLoader::load_from_path(&path).unwrap();
    assert_eq!(config.grid.point_count(), 100);
    assert_eq!(config.run.snapshots, 10_000);
    assert_eq!(config.output.critical_marker(), Some(0.021));
    assert_eq!(config.system.integrator, IntegratorKind::WisdomHolman);
    assert_eq!(config.system.dt, 0.0005);
}

#[test]
fn small_sweep_round_trips_through_csv() {
    let mut config = ConfigLoader::load_from_str(SMALL_SWEEP).unwrap();
    let dir = scratch_dir();
    config.output.directory = dir.clone();

    let grid = generate_grid(&config.grid).unwrap();
    let settings = RunSettings::from_config(&config);
    let outcome = run_sweep(&grid, &settings, config.run.threads).unwrap();
    let table = &outcome.table;

    assert_eq!(table.len(), 9);
    assert_eq!(table.dims(), (3, 3));
    for row in table.rows() {
        assert!(row.lifetime <= settings.duration);
        if row.reason == TerminationReason::Survived {
            assert_eq!(row.lifetime, settings.duration);
        }
    }

    // Reshaped initial conditions reproduce the generated axes.
    let ecc = table.grid(|r| r.initial_eccentricity);
    let smaxis = table.grid(|r| r.initial_semi_major_axis);
    for (i, row) in ecc.iter().enumerate() {
        assert!(row.iter().all(|&e| e == grid.ecc_values[i]));
    }
    for row in &smaxis {
        assert_eq!(row, &grid.smaxis_values);
    }

    let artifacts = resolve_artifacts(&config.output);
    write_results_csv(&artifacts.results_csv, table).unwrap();
    let restored = read_results_csv(&artifacts.results_csv).unwrap();
    assert_eq!(restored.dims(), table.dims());
    assert_eq!(restored.rows(), table.rows());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn innermost_circular_orbit_survives() {
    let config = ConfigLoader::load_from_str(SMALL_SWEEP).unwrap();
    let grid = generate_grid(&config.grid).unwrap();
    let outcome = run_sweep(&grid, &RunSettings::from_config(&config), Some(1)).unwrap();

    let first = outcome.table.rows()[0];
    assert_eq!(first.initial_semi_major_axis, 0.01);
    assert_eq!(first.initial_eccentricity, 0.0);
    assert_eq!(first.reason, TerminationReason::Survived);
    assert_eq!(first.reason.code(), 0.5);
}
