use std::f64::consts::TAU;

use anyhow::{Result, ensure};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use serde::{Deserialize, Serialize};

use crate::config::GridConfig;

/// How the initial mean anomaly of each test particle is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeanAnomaly {
    /// Uniform in `[0, 2π)`, drawn independently per grid point.
    #[default]
    Random,
    Fixed(f64),
}

/// Initial planet-centric elements of one test particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPoint {
    /// Position in generation order.
    pub index: usize,
    /// Eccentricity index.
    pub row: usize,
    /// Semi-major axis index.
    pub col: usize,
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub mean_anomaly: f64,
}

/// All grid points in generation order: eccentricity is the outer loop and
/// semi-major axis the inner one, so point `k` sits at row `k / n_a`,
/// column `k % n_a`.
#[derive(Debug, Clone)]
pub struct ParameterGrid {
    pub points: Vec<GridPoint>,
    pub n_a: usize,
    pub n_e: usize,
    pub smaxis_values: Vec<f64>,
    pub ecc_values: Vec<f64>,
}

impl ParameterGrid {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GridPoint> {
        self.points.get(index)
    }
}

/// Builds the sweep grid. The random stream is seeded from `config.seed`
/// when set, otherwise from OS entropy.
pub fn generate_grid(config: &GridConfig) -> Result<ParameterGrid> {
    let mut rng = match config.seed {
        Some(seed) => ChaChaRng::seed_from_u64(seed),
        None => ChaChaRng::from_entropy(),
    };
    generate_grid_with_rng(config, &mut rng)
}

pub fn generate_grid_with_rng<R: Rng>(config: &GridConfig, rng: &mut R) -> Result<ParameterGrid> {
    ensure!(
        config.n_a >= 1 && config.n_e >= 1,
        "grid dimensions must be positive, got {}x{}",
        config.n_a,
        config.n_e
    );

    let smaxis_values = linspace(config.a_min, config.a_max, config.n_a);
    let ecc_values = linspace(config.e_min, config.e_max, config.n_e);

    let mut points = Vec::with_capacity(config.point_count());
    for (row, &eccentricity) in ecc_values.iter().enumerate() {
        for (col, &semi_major_axis) in smaxis_values.iter().enumerate() {
            let mean_anomaly = match config.mean_anomaly {
                MeanAnomaly::Random => rng.gen_range(0.0..TAU),
                MeanAnomaly::Fixed(value) => value,
            };
            points.push(GridPoint {
                index: points.len(),
                row,
                col,
                semi_major_axis,
                eccentricity,
                mean_anomaly,
            });
        }
    }

    Ok(ParameterGrid {
        points,
        n_a: config.n_a,
        n_e: config.n_e,
        smaxis_values,
        ecc_values,
    })
}

/// `count` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return vec![start];
    }

    let step = (end - start) / (count as f64 - 1.0);
    (0..count)
        .map(|i| if i + 1 == count { end } else { start + step * i as f64 })
        .collect()
}
