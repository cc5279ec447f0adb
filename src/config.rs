use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::grid::MeanAnomaly;
use crate::integrator::IntegratorKind;
use crate::orbit::YEAR;

/// Load and validate sweep configuration from a TOML file.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load_from_path(path: &Path) -> Result<SweepConfig> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        Self::load_from_str(&raw)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn load_from_str(raw: &str) -> Result<SweepConfig> {
        let config: SweepConfig =
            toml::from_str(raw).context("failed to parse sweep configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Complete sweep configuration. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub system: SystemConfig,
    pub grid: GridConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
}

/// Star, planet and integrator settings shared by every simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    pub star_mass: f64,
    pub planet_mass: f64,
    pub planet_semi_major_axis: f64,
    pub planet_eccentricity: f64,
    pub dt: f64,
    pub integrator: IntegratorKind,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            star_mass: 1.0,
            planet_mass: 0.0009543,
            planet_semi_major_axis: 1.0,
            planet_eccentricity: 0.36,
            dt: 0.0005,
            integrator: IntegratorKind::WisdomHolman,
        }
    }
}

/// Initial planet-centric elements of the test particles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub a_min: f64,
    pub a_max: f64,
    pub n_a: usize,
    pub e_min: f64,
    pub e_max: f64,
    pub n_e: usize,
    pub inclination: f64,
    pub mean_anomaly: MeanAnomaly,
    pub seed: Option<u64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            a_min: 0.01,
            a_max: 0.03,
            n_a: 10,
            e_min: 0.0,
            e_max: 0.9,
            n_e: 10,
            inclination: 5e-5,
            mean_anomaly: MeanAnomaly::Random,
            seed: None,
        }
    }
}

impl GridConfig {
    pub fn point_count(&self) -> usize {
        self.n_a * self.n_e
    }
}

/// Time grid and termination thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub duration_years: f64,
    pub snapshots: usize,
    pub smaxis_limit: f64,
    pub ecc_limit: f64,
    pub threads: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_years: 100.0,
            snapshots: 10_000,
            smaxis_limit: 0.2,
            ecc_limit: 1.0,
            threads: None,
        }
    }
}

impl RunConfig {
    /// Total simulated time in program units.
    pub fn duration(&self) -> f64 {
        self.duration_years * YEAR
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub results_csv: PathBuf,
    pub summary_json: Option<PathBuf>,
    pub export_png: bool,
    pub export_svg: bool,
    pub width_px: u32,
    pub height_px: u32,
    /// Horizontal axis range of the heatmaps in AU.
    pub smaxis_range: [f64; 2],
    /// Dashed marker drawn on the eccentricity and lifetime maps.
    pub critical_smaxis: Option<f64>,
    /// Set to false to leave the `critical_smaxis` marker off.
    pub mark_critical: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            results_csv: PathBuf::from("testparticles01.csv"),
            summary_json: Some(PathBuf::from("summary.json")),
            export_png: true,
            export_svg: false,
            width_px: 700,
            height_px: 500,
            smaxis_range: [0.0, 0.03],
            critical_smaxis: Some(0.021),
            mark_critical: true,
        }
    }
}

impl OutputConfig {
    /// Semi-major axis to mark on the maps, if any.
    pub fn critical_marker(&self) -> Option<f64> {
        self.critical_smaxis.filter(|_| self.mark_critical)
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        self.validate_system()?;
        self.validate_grid()?;
        self.validate_run()?;
        self.validate_output()?;
        Ok(())
    }

    fn validate_system(&self) -> Result<()> {
        let system = &self.system;
        ensure!(system.star_mass > 0.0, "star mass must be positive, got {}", system.star_mass);
        ensure!(
            system.planet_mass > 0.0,
            "planet mass must be positive, got {}",
            system.planet_mass
        );
        ensure!(
            system.planet_semi_major_axis > 0.0,
            "planet semi-major axis must be positive, got {}",
            system.planet_semi_major_axis
        );
        ensure!(
            (0.0..1.0).contains(&system.planet_eccentricity),
            "planet eccentricity must lie in [0, 1), got {}",
            system.planet_eccentricity
        );
        ensure!(
            system.dt > 0.0 && system.dt.is_finite(),
            "time step dt must be positive, got {}",
            system.dt
        );
        Ok(())
    }

    fn validate_grid(&self) -> Result<()> {
        let grid = &self.grid;
        ensure!(grid.n_a >= 1, "grid.n_a must be at least 1");
        ensure!(grid.n_e >= 1, "grid.n_e must be at least 1");
        ensure!(
            grid.a_min > 0.0 && grid.a_min <= grid.a_max && grid.a_max.is_finite(),
            "semi-major axis range must satisfy 0 < a_min <= a_max, got [{}, {}]",
            grid.a_min,
            grid.a_max
        );
        ensure!(
            grid.e_min >= 0.0 && grid.e_min <= grid.e_max && grid.e_max < 1.0,
            "eccentricity range must satisfy 0 <= e_min <= e_max < 1, got [{}, {}]",
            grid.e_min,
            grid.e_max
        );
        // Repeated axis values would make the written table impossible to re-read.
        ensure!(
            grid.n_a == 1 || grid.a_min < grid.a_max,
            "semi-major axis range [{}, {}] is empty but grid.n_a = {}",
            grid.a_min,
            grid.a_max,
            grid.n_a
        );
        ensure!(
            grid.n_e == 1 || grid.e_min < grid.e_max,
            "eccentricity range [{}, {}] is empty but grid.n_e = {}",
            grid.e_min,
            grid.e_max,
            grid.n_e
        );
        ensure!(
            grid.inclination.is_finite(),
            "test particle inclination must be finite"
        );
        if let MeanAnomaly::Fixed(value) = grid.mean_anomaly {
            ensure!(value.is_finite(), "fixed mean anomaly must be finite");
        }
        Ok(())
    }

    fn validate_run(&self) -> Result<()> {
        let run = &self.run;
        ensure!(
            run.duration_years > 0.0 && run.duration_years.is_finite(),
            "run duration must be positive, got {} yr",
            run.duration_years
        );
        ensure!(
            run.snapshots >= 2,
            "run.snapshots must be at least 2 to cover both ends of the run"
        );
        ensure!(
            run.smaxis_limit > 0.0,
            "semi-major axis limit must be positive, got {}",
            run.smaxis_limit
        );
        ensure!(
            run.ecc_limit > 0.0,
            "eccentricity limit must be positive, got {}",
            run.ecc_limit
        );
        if let Some(threads) = run.threads {
            ensure!(threads >= 1, "run.threads must be at least 1");
        }
        Ok(())
    }

    fn validate_output(&self) -> Result<()> {
        let output = &self.output;
        ensure!(
            !output.results_csv.as_os_str().is_empty(),
            "output.results_csv must not be empty"
        );
        ensure!(
            output.width_px >= 200 && output.height_px >= 150,
            "plot canvas {}x{} is too small",
            output.width_px,
            output.height_px
        );
        ensure!(
            output.smaxis_range[0] < output.smaxis_range[1],
            "output.smaxis_range must be increasing, got {:?}",
            output.smaxis_range
        );
        Ok(())
    }

    /// Human friendly description of key configuration choices.
    pub fn summary_lines(&self) -> Vec<String> {
        let system = format!(
            "system: star {} Msun, planet {} Msun at a={} e={}",
            self.system.star_mass,
            self.system.planet_mass,
            self.system.planet_semi_major_axis,
            self.system.planet_eccentricity
        );
        let integrator = format!(
            "integrator: {:?} (dt={})",
            self.system.integrator, self.system.dt
        );
        let grid = format!(
            "grid: a in [{}, {}] x {}, e in [{}, {}] x {} ({} particles)",
            self.grid.a_min,
            self.grid.a_max,
            self.grid.n_a,
            self.grid.e_min,
            self.grid.e_max,
            self.grid.n_e,
            self.grid.point_count()
        );
        let anomaly = match (self.grid.mean_anomaly, self.grid.seed) {
            (MeanAnomaly::Random, Some(seed)) => format!("mean anomaly: random (seed {seed})"),
            (MeanAnomaly::Random, None) => "mean anomaly: random (unseeded)".to_string(),
            (MeanAnomaly::Fixed(value), _) => format!("mean anomaly: fixed {value}"),
        };
        let run = format!(
            "run: {} yr in {} snapshots, limits a>{} e>{}, threads={}",
            self.run.duration_years,
            self.run.snapshots,
            self.run.smaxis_limit,
            self.run.ecc_limit,
            self.run
                .threads
                .map_or_else(|| "auto".to_string(), |t| t.to_string())
        );
        let outputs = format!(
            "output dir: {} (csv={}, png={}, svg={})",
            self.output.directory.display(),
            self.output.results_csv.display(),
            self.output.export_png,
            self.output.export_svg
        );

        vec![system, integrator, grid, anomaly, run, outputs]
    }
}
