use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::config::{OutputConfig, SweepConfig};
use crate::dynamics::{SimulationResult, TerminationReason, TrajectorySample};
use crate::orbit::YEAR;
use crate::sweep::SweepOutcome;
use crate::table::{ReasonCounts, ResultTable};

pub const RESULTS_HEADER: [&str; 8] = [
    "Smaxis",
    "InitialEcc",
    "MeanAnomaly",
    "MaxEcc",
    "Lifetime",
    "MaxInc",
    "MaxSmaxis",
    "Reason",
];

const TRAJECTORY_HEADER: [&str; 6] = [
    "time",
    "time_years",
    "x",
    "y",
    "semi_major_axis",
    "eccentricity",
];

#[derive(Debug, Clone)]
pub struct OutputArtifacts {
    pub directory: PathBuf,
    pub results_csv: PathBuf,
    pub summary_json: Option<PathBuf>,
    pub export_png: bool,
    pub export_svg: bool,
}

impl OutputArtifacts {
    /// Plot file inside the output directory, e.g. `maxeccmap.png`.
    pub fn plot_path(&self, stem: &str, extension: &str) -> PathBuf {
        self.directory.join(format!("{stem}.{extension}"))
    }

    pub fn trajectory_stem(index: usize) -> String {
        format!("trajectory_{index:04}")
    }

    pub fn trajectory_csv(&self, index: usize) -> PathBuf {
        self.plot_path(&Self::trajectory_stem(index), "csv")
    }
}

pub fn resolve_artifacts(paths: &OutputConfig) -> OutputArtifacts {
    let directory = paths.directory.clone();

    OutputArtifacts {
        results_csv: resolve_path(&directory, &paths.results_csv),
        summary_json: paths
            .summary_json
            .as_ref()
            .map(|path| resolve_path(&directory, path)),
        export_png: paths.export_png,
        export_svg: paths.export_svg,
        directory,
    }
}

fn resolve_path(base: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        base.join(relative)
    }
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create output directory {}", path.display()))?;
    }
    Ok(())
}

/// Creates the directory a file is about to be written into.
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}

/// Writes one row per grid point in table order.
pub fn write_results_csv(path: &Path, table: &ResultTable) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Unable to create CSV file {}", path.display()))?;
    writer.write_record(RESULTS_HEADER)?;

    for (index, row) in table.rows().iter().enumerate() {
        writer
            .write_record([
                format!("{}", row.initial_semi_major_axis),
                format!("{}", row.initial_eccentricity),
                format!("{}", row.initial_mean_anomaly),
                format!("{}", row.max_eccentricity),
                format!("{}", row.lifetime),
                format!("{}", row.max_inclination),
                format!("{}", row.max_semi_major_axis),
                format!("{}", row.reason.code()),
            ])
            .with_context(|| format!("Failed to write result row {index}"))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultRecord {
    smaxis: f64,
    initial_ecc: f64,
    mean_anomaly: f64,
    max_ecc: f64,
    lifetime: f64,
    max_inc: f64,
    max_smaxis: f64,
    reason: f64,
}

impl ResultRecord {
    fn into_result(self) -> Result<SimulationResult> {
        Ok(SimulationResult {
            max_semi_major_axis: self.max_smaxis,
            max_eccentricity: self.max_ecc,
            max_inclination: self.max_inc,
            lifetime: self.lifetime,
            initial_semi_major_axis: self.smaxis,
            initial_eccentricity: self.initial_ecc,
            initial_mean_anomaly: self.mean_anomaly,
            reason: TerminationReason::from_code(self.reason)?,
        })
    }
}

/// Reads a results CSV back into a table, inferring the grid shape.
pub fn read_results_csv(path: &Path) -> Result<ResultTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Unable to open CSV file {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Unable to read header of {}", path.display()))?;
    ensure!(
        headers.iter().eq(RESULTS_HEADER.iter().copied()),
        "{} does not have the results header {}",
        path.display(),
        RESULTS_HEADER.join(",")
    );

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<ResultRecord>().enumerate() {
        let record =
            record.with_context(|| format!("Malformed row {} in {}", line + 1, path.display()))?;
        rows.push(
            record
                .into_result()
                .with_context(|| format!("Invalid row {} in {}", line + 1, path.display()))?,
        );
    }

    ResultTable::from_rows_inferring_dims(rows)
        .with_context(|| format!("{} is not a complete sweep", path.display()))
}

#[derive(Debug, Serialize)]
struct LifetimeSummary {
    min: f64,
    max: f64,
    min_years: f64,
    max_years: f64,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    config: &'a SweepConfig,
    n_a: usize,
    n_e: usize,
    particles: usize,
    threads: usize,
    reasons: ReasonCounts,
    lifetime: Option<LifetimeSummary>,
    wall_clock_seconds: f64,
}

pub fn write_summary_json(path: &Path, config: &SweepConfig, outcome: &SweepOutcome) -> Result<()> {
    ensure_parent(path)?;

    let (n_a, n_e) = outcome.table.dims();
    let summary = RunSummary {
        config,
        n_a,
        n_e,
        particles: outcome.table.len(),
        threads: outcome.threads,
        reasons: outcome.table.reason_counts(),
        lifetime: outcome
            .table
            .lifetime_range()
            .map(|(min, max)| LifetimeSummary {
                min,
                max,
                min_years: min / YEAR,
                max_years: max / YEAR,
            }),
        wall_clock_seconds: outcome.elapsed.as_secs_f64(),
    };

    let file = File::create(path)
        .with_context(|| format!("Unable to create JSON file {}", path.display()))?;
    serde_json::to_writer_pretty(file, &summary)
        .with_context(|| format!("Failed to write JSON payload to {}", path.display()))
}

pub fn write_trajectory_csv(path: &Path, samples: &[TrajectorySample]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Unable to create CSV file {}", path.display()))?;
    writer.write_record(TRAJECTORY_HEADER)?;

    for sample in samples {
        writer
            .write_record([
                format!("{:.12e}", sample.time),
                format!("{:.12e}", sample.time / YEAR),
                format!("{:.12e}", sample.x),
                format!("{:.12e}", sample.y),
                format!("{:.12e}", sample.semi_major_axis),
                format!("{:.12e}", sample.eccentricity),
            ])
            .with_context(|| format!("Failed to write sample at t={:.6}", sample.time))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush CSV writer for {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "testparticle-sweep-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn sample_table() -> ResultTable {
        let mut rows = Vec::new();
        for e in [0.0, 0.45] {
            for a in [0.01, 0.02 / 3.0 + 0.01] {
                rows.push(SimulationResult {
                    max_semi_major_axis: a * 1.01,
                    max_eccentricity: e + 0.013,
                    max_inclination: 5.000123e-5,
                    lifetime: if e > 0.0 { 12.345678901234 } else { 100.0 * YEAR },
                    initial_semi_major_axis: a,
                    initial_eccentricity: e,
                    initial_mean_anomaly: 3.7,
                    reason: if e > 0.0 {
                        TerminationReason::Escaped
                    } else {
                        TerminationReason::Survived
                    },
                });
            }
        }
        ResultTable::new(rows, 2, 2).unwrap()
    }

    #[test]
    fn relative_paths_land_in_output_directory() {
        let mut config = OutputConfig::default();
        config.directory = PathBuf::from("runs/a");
        config.summary_json = Some(PathBuf::from("/tmp/summary.json"));
        let artifacts = resolve_artifacts(&config);

        assert_eq!(artifacts.results_csv, PathBuf::from("runs/a/testparticles01.csv"));
        assert_eq!(artifacts.summary_json, Some(PathBuf::from("/tmp/summary.json")));
        assert_eq!(
            artifacts.plot_path("maxeccmap", "png"),
            PathBuf::from("runs/a/maxeccmap.png")
        );
        assert_eq!(
            artifacts.trajectory_csv(7),
            PathBuf::from("runs/a/trajectory_0007.csv")
        );
    }

    #[test]
    fn results_csv_has_exact_header_and_round_trips() {
        let dir = scratch_dir("results");
        let path = dir.join("results.csv");
        let table = sample_table();
        write_results_csv(&path, &table).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        assert_eq!(
            lines.next(),
            Some("Smaxis,InitialEcc,MeanAnomaly,MaxEcc,Lifetime,MaxInc,MaxSmaxis,Reason")
        );
        assert_eq!(raw.lines().count(), 5);
        assert!(raw.lines().nth(1).unwrap().ends_with(",0.5"));

        let restored = read_results_csv(&path).unwrap();
        assert_eq!(restored.dims(), (2, 2));
        assert_eq!(restored.rows(), table.rows());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn foreign_header_is_rejected() {
        let dir = scratch_dir("foreign");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("other.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(read_results_csv(&path).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn summary_reports_counts_and_timing() {
        let dir = scratch_dir("summary");
        let path = dir.join("summary.json");
        let outcome = SweepOutcome {
            table: sample_table(),
            elapsed: Duration::from_millis(1500),
            threads: 3,
        };
        write_summary_json(&path, &SweepConfig::default(), &outcome).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["particles"], 4);
        assert_eq!(value["threads"], 3);
        assert_eq!(value["reasons"]["survived"], 2);
        assert_eq!(value["reasons"]["escaped"], 2);
        assert_eq!(value["wall_clock_seconds"], 1.5);
        assert_eq!(value["config"]["grid"]["n_a"], 10);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn trajectory_csv_has_one_line_per_sample() {
        let dir = scratch_dir("trajectory");
        let path = dir.join("nested").join("trajectory.csv");
        let samples: Vec<TrajectorySample> = (0..4)
            .map(|i| TrajectorySample {
                time: i as f64,
                x: 0.01,
                y: -0.002 * i as f64,
                semi_major_axis: 0.01,
                eccentricity: 0.0,
            })
            .collect();
        write_trajectory_csv(&path, &samples).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("time,time_years,x,y,semi_major_axis,eccentricity"));
        assert_eq!(raw.lines().count(), 5);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn ensure_parent_creates_missing_directories() {
        let dir = scratch_dir("parents");
        let path = dir.join("a").join("b").join("map.png");
        ensure_parent(&path).unwrap();
        assert!(dir.join("a").join("b").is_dir());

        // Bare file names need no directory.
        ensure_parent(Path::new("map.png")).unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }
}
