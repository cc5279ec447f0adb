use anyhow::{Result, bail, ensure};
use serde::Serialize;

use crate::dynamics::{SimulationResult, TerminationReason};

/// Sweep results in generation order, plus the grid shape they came from.
#[derive(Debug, Clone)]
pub struct ResultTable {
    rows: Vec<SimulationResult>,
    n_a: usize,
    n_e: usize,
}

/// Bounding box of the initial conditions, `[a_min, a_max, e_min, e_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub a_min: f64,
    pub a_max: f64,
    pub e_min: f64,
    pub e_max: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReasonCounts {
    pub ejected: usize,
    pub survived: usize,
    pub escaped: usize,
}

impl ResultTable {
    pub fn new(rows: Vec<SimulationResult>, n_a: usize, n_e: usize) -> Result<Self> {
        ensure!(n_a >= 1 && n_e >= 1, "grid dimensions must be positive, got {n_a}x{n_e}");
        ensure!(
            rows.len() == n_a * n_e,
            "result table has {} rows but the grid is {}x{}",
            rows.len(),
            n_a,
            n_e
        );
        Ok(Self { rows, n_a, n_e })
    }

    /// Rebuilds the grid shape from the distinct initial values, checking the
    /// rows are in eccentricity-major generation order.
    pub fn from_rows_inferring_dims(rows: Vec<SimulationResult>) -> Result<Self> {
        ensure!(!rows.is_empty(), "no result rows");

        let smaxis = distinct(rows.iter().map(|r| r.initial_semi_major_axis));
        let ecc = distinct(rows.iter().map(|r| r.initial_eccentricity));
        let (n_a, n_e) = (smaxis.len(), ecc.len());

        ensure!(
            rows.len() == n_a * n_e,
            "{} rows do not form a grid of {} semi-major axes by {} eccentricities",
            rows.len(),
            n_a,
            n_e
        );
        for (k, row) in rows.iter().enumerate() {
            if row.initial_semi_major_axis != smaxis[k % n_a]
                || row.initial_eccentricity != ecc[k / n_a]
            {
                bail!("row {k} is out of generation order");
            }
        }

        Ok(Self { rows, n_a, n_e })
    }

    pub fn rows(&self) -> &[SimulationResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(n_a, n_e)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.n_a, self.n_e)
    }

    pub fn column<F>(&self, accessor: F) -> Vec<f64>
    where
        F: Fn(&SimulationResult) -> f64,
    {
        self.rows.iter().map(accessor).collect()
    }

    /// One quantity reshaped to `n_e` rows of `n_a` values, row `i` holding
    /// eccentricity index `i`.
    pub fn grid<F>(&self, accessor: F) -> Vec<Vec<f64>>
    where
        F: Fn(&SimulationResult) -> f64,
    {
        self.rows
            .chunks(self.n_a)
            .map(|chunk| chunk.iter().map(&accessor).collect())
            .collect()
    }

    pub fn extent(&self) -> Extent {
        let mut extent = Extent {
            a_min: f64::INFINITY,
            a_max: f64::NEG_INFINITY,
            e_min: f64::INFINITY,
            e_max: f64::NEG_INFINITY,
        };
        for row in &self.rows {
            extent.a_min = extent.a_min.min(row.initial_semi_major_axis);
            extent.a_max = extent.a_max.max(row.initial_semi_major_axis);
            extent.e_min = extent.e_min.min(row.initial_eccentricity);
            extent.e_max = extent.e_max.max(row.initial_eccentricity);
        }
        extent
    }

    pub fn reason_counts(&self) -> ReasonCounts {
        self.rows
            .iter()
            .fold(ReasonCounts::default(), |mut counts, row| {
                match row.reason {
                    TerminationReason::Ejected => counts.ejected += 1,
                    TerminationReason::Survived => counts.survived += 1,
                    TerminationReason::Escaped => counts.escaped += 1,
                }
                counts
            })
    }

    /// Shortest and longest lifetime in the table.
    pub fn lifetime_range(&self) -> Option<(f64, f64)> {
        self.rows.iter().map(|r| r.lifetime).fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }
}

fn distinct(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut seen: Vec<f64> = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: f64, e: f64, lifetime: f64, reason: TerminationReason) -> SimulationResult {
        SimulationResult {
            max_semi_major_axis: a,
            max_eccentricity: e,
            max_inclination: 0.0,
            lifetime,
            initial_semi_major_axis: a,
            initial_eccentricity: e,
            initial_mean_anomaly: 0.0,
            reason,
        }
    }

    fn three_by_two() -> Vec<SimulationResult> {
        let mut rows = Vec::new();
        for (i, e) in [0.0, 0.5].into_iter().enumerate() {
            for (j, a) in [0.01, 0.02, 0.03].into_iter().enumerate() {
                let reason = if i == 1 && j == 2 {
                    TerminationReason::Escaped
                } else {
                    TerminationReason::Survived
                };
                rows.push(row(a, e, (i * 3 + j) as f64, reason));
            }
        }
        rows
    }

    #[test]
    fn length_must_match_grid() {
        assert!(ResultTable::new(three_by_two(), 3, 2).is_ok());
        assert!(ResultTable::new(three_by_two(), 2, 2).is_err());
    }

    #[test]
    fn grid_reshape_puts_eccentricity_on_rows() {
        let table = ResultTable::new(three_by_two(), 3, 2).unwrap();
        let lifetimes = table.grid(|r| r.lifetime);
        assert_eq!(lifetimes, vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]]);

        let ecc = table.grid(|r| r.initial_eccentricity);
        assert!(ecc[0].iter().all(|&e| e == 0.0));
        assert!(ecc[1].iter().all(|&e| e == 0.5));
        let smaxis = table.grid(|r| r.initial_semi_major_axis);
        assert_eq!(smaxis[0], smaxis[1]);
    }

    #[test]
    fn extent_and_counts() {
        let table = ResultTable::new(three_by_two(), 3, 2).unwrap();
        assert_eq!(
            table.extent(),
            Extent {
                a_min: 0.01,
                a_max: 0.03,
                e_min: 0.0,
                e_max: 0.5
            }
        );
        assert_eq!(
            table.reason_counts(),
            ReasonCounts {
                ejected: 0,
                survived: 5,
                escaped: 1
            }
        );
        assert_eq!(table.lifetime_range(), Some((0.0, 5.0)));
    }

    #[test]
    fn dims_are_inferred_from_initial_values() {
        let table = ResultTable::from_rows_inferring_dims(three_by_two()).unwrap();
        assert_eq!(table.dims(), (3, 2));
    }

    #[test]
    fn shuffled_rows_are_rejected() {
        let mut rows = three_by_two();
        rows.swap(0, 4);
        assert!(ResultTable::from_rows_inferring_dims(rows).is_err());

        let mut ragged = three_by_two();
        ragged.pop();
        assert!(ResultTable::from_rows_inferring_dims(ragged).is_err());
    }
}
