use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{SweepConfig, SystemConfig};
use crate::grid::{GridPoint, linspace};
use crate::orbit::Orbit;
use crate::state::SystemState;
use crate::system::{PLANET_INDEX, add_test_particle, build_reference_system};

/// Why a test particle's simulation stopped.
///
/// The numeric codes are the values written to the `Reason` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Semi-major axis grew past the ejection limit.
    Ejected,
    /// Reached the end of the run.
    Survived,
    /// Eccentricity exceeded the escape limit (hyperbolic orbit).
    Escaped,
}

impl TerminationReason {
    pub const ALL: [TerminationReason; 3] = [Self::Ejected, Self::Survived, Self::Escaped];

    pub fn code(self) -> f64 {
        match self {
            Self::Ejected => 0.0,
            Self::Survived => 0.5,
            Self::Escaped => 1.0,
        }
    }

    pub fn from_code(code: f64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|reason| (reason.code() - code).abs() < 1e-9)
            .ok_or_else(|| anyhow!("unknown termination reason code {code}"))
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ejected => "ejected",
            Self::Survived => "survived",
            Self::Escaped => "escaped",
        }
    }
}

/// Summary statistics of one test particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationResult {
    pub max_semi_major_axis: f64,
    pub max_eccentricity: f64,
    pub max_inclination: f64,
    pub lifetime: f64,
    pub initial_semi_major_axis: f64,
    pub initial_eccentricity: f64,
    pub initial_mean_anomaly: f64,
    pub reason: TerminationReason,
}

/// Planet-centric position of the test particle at one snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrajectorySample {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub semi_major_axis: f64,
    pub eccentricity: f64,
}

/// Everything a single particle simulation needs besides its grid point.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub system: SystemConfig,
    pub inclination: f64,
    /// Total simulated time in program units.
    pub duration: f64,
    pub snapshots: usize,
    pub smaxis_limit: f64,
    pub ecc_limit: f64,
}

impl RunSettings {
    pub fn from_config(config: &SweepConfig) -> Self {
        Self {
            system: config.system.clone(),
            inclination: config.grid.inclination,
            duration: config.run.duration(),
            snapshots: config.run.snapshots,
            smaxis_limit: config.run.smaxis_limit,
            ecc_limit: config.run.ecc_limit,
        }
    }

    pub fn snapshot_times(&self) -> Vec<f64> {
        linspace(0.0, self.duration, self.snapshots)
    }

    /// Termination check for one snapshot. Escape wins when both limits trip.
    pub fn classify(&self, orbit: &Orbit) -> Option<TerminationReason> {
        if orbit.eccentricity > self.ecc_limit {
            Some(TerminationReason::Escaped)
        } else if orbit.semi_major_axis > self.smaxis_limit {
            Some(TerminationReason::Ejected)
        } else {
            None
        }
    }
}

/// Full record of one inspected particle.
#[derive(Debug, Clone)]
pub struct ParticleTrace {
    pub result: SimulationResult,
    /// Simulation state when the run stopped.
    pub state: SystemState,
    /// Planet-centric samples, one per non-terminating snapshot.
    pub trajectory: Vec<TrajectorySample>,
}

fn run_particle(point: &GridPoint, settings: &RunSettings, record: bool) -> Result<ParticleTrace> {
    let mut system = build_reference_system(&settings.system)?;
    let tp = add_test_particle(&mut system, point, settings.inclination)?;
    let integrator = settings.system.integrator.build();

    let initial = system.orbit_of(tp, PLANET_INDEX)?;
    debug!(
        index = point.index,
        a = initial.semi_major_axis,
        a_requested = point.semi_major_axis,
        e = initial.eccentricity,
        e_requested = point.eccentricity,
        m = initial.mean_anomaly,
        m_requested = point.mean_anomaly,
        "started simulation"
    );

    let mut max_semi_major_axis: f64 = 0.0;
    let mut max_eccentricity: f64 = 0.0;
    let mut max_inclination: f64 = 0.0;
    let mut reason = TerminationReason::Survived;
    let mut trajectory = Vec::new();

    for time in settings.snapshot_times() {
        integrator
            .integrate_to(&mut system, time, settings.system.dt)
            .with_context(|| format!("grid point {} diverged", point.index))?;
        let orbit = system.orbit_of(tp, PLANET_INDEX)?;

        if let Some(stop) = settings.classify(&orbit) {
            reason = stop;
            break;
        }

        max_semi_major_axis = max_semi_major_axis.max(orbit.semi_major_axis);
        max_eccentricity = max_eccentricity.max(orbit.eccentricity);
        max_inclination = max_inclination.max(orbit.inclination);

        if record {
            let relative =
                system.particles[tp].position - system.particles[PLANET_INDEX].position;
            trajectory.push(TrajectorySample {
                time: system.time,
                x: relative.x,
                y: relative.y,
                semi_major_axis: orbit.semi_major_axis,
                eccentricity: orbit.eccentricity,
            });
        }
    }

    let result = SimulationResult {
        max_semi_major_axis,
        max_eccentricity,
        max_inclination,
        lifetime: system.time,
        initial_semi_major_axis: point.semi_major_axis,
        initial_eccentricity: point.eccentricity,
        initial_mean_anomaly: point.mean_anomaly,
        reason,
    };
    debug!(
        index = point.index,
        reason = reason.label(),
        lifetime = result.lifetime,
        "completed simulation"
    );

    Ok(ParticleTrace {
        result,
        state: system,
        trajectory,
    })
}

/// Simulates one grid point and returns its summary statistics.
pub fn simulate_particle(point: &GridPoint, settings: &RunSettings) -> Result<SimulationResult> {
    run_particle(point, settings, false).map(|run| run.result)
}

/// Simulates one grid point and returns the final simulation state instead of
/// the statistics, for inspecting a single run.
pub fn simulate_particle_state(point: &GridPoint, settings: &RunSettings) -> Result<SystemState> {
    run_particle(point, settings, false).map(|run| run.state)
}

/// Like [`simulate_particle`], also keeping the final state and the
/// planet-centric path at every surviving snapshot.
pub fn trace_particle(point: &GridPoint, settings: &RunSettings) -> Result<ParticleTrace> {
    run_particle(point, settings, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orbit::YEAR;
    use crate::system::TEST_PARTICLE_LABEL;
    use approx::assert_relative_eq;

    fn short_run(years: f64, snapshots: usize) -> RunSettings {
        let mut config = SweepConfig::default();
        config.run.duration_years = years;
        config.run.snapshots = snapshots;
        RunSettings::from_config(&config)
    }

    fn point(a: f64, e: f64, m: f64) -> GridPoint {
        GridPoint {
            index: 0,
            row: 0,
            col: 0,
            semi_major_axis: a,
            eccentricity: e,
            mean_anomaly: m,
        }
    }

    #[test]
    fn tight_circular_orbit_survives_full_duration() {
        let settings = short_run(1.0, 200);
        let result = simulate_particle(&point(0.01, 0.0, 0.0), &settings).unwrap();

        assert_eq!(result.reason, TerminationReason::Survived);
        assert_eq!(result.reason.code(), 0.5);
        assert_eq!(result.lifetime, settings.duration);
        assert!(result.max_eccentricity < 0.1, "e_max = {}", result.max_eccentricity);
        assert!(result.max_semi_major_axis > 0.009 && result.max_semi_major_axis < 0.011);
        assert!(result.max_inclination < 1e-3);
        assert_eq!(result.initial_semi_major_axis, 0.01);
        assert_eq!(result.initial_eccentricity, 0.0);
    }

    #[test]
    fn grazing_pericentre_orbit_survives_at_default_settings() {
        let settings = short_run(1.0, 200);
        assert_eq!(settings.system.dt, 0.0005);
        let result = simulate_particle(&point(0.01, 0.9, 0.0), &settings).unwrap();

        assert_eq!(result.reason, TerminationReason::Survived);
        assert_eq!(result.lifetime, settings.duration);
        assert!(result.max_eccentricity < 0.95, "e_max = {}", result.max_eccentricity);
        assert!(result.max_semi_major_axis < 0.012, "a_max = {}", result.max_semi_major_axis);
    }

    #[test]
    fn orbit_outside_the_limit_is_ejected_at_first_snapshot() {
        let mut settings = short_run(1.0, 50);
        settings.smaxis_limit = 0.005;
        let result = simulate_particle(&point(0.01, 0.0, 0.0), &settings).unwrap();

        assert_eq!(result.reason, TerminationReason::Ejected);
        assert_eq!(result.lifetime, 0.0);
        assert_eq!(result.max_semi_major_axis, 0.0);
        assert_eq!(result.max_eccentricity, 0.0);
    }

    #[test]
    fn eccentric_orbit_over_escape_limit_escapes() {
        let mut settings = short_run(1.0, 50);
        settings.ecc_limit = 0.5;
        let result = simulate_particle(&point(0.01, 0.8, 0.0), &settings).unwrap();

        assert_eq!(result.reason, TerminationReason::Escaped);
        assert_eq!(result.reason.code(), 1.0);
        assert_eq!(result.lifetime, 0.0);
    }

    #[test]
    fn escape_takes_precedence_over_ejection() {
        let mut settings = short_run(1.0, 10);
        settings.smaxis_limit = 0.001;
        settings.ecc_limit = 0.1;
        let result = simulate_particle(&point(0.01, 0.5, 0.0), &settings).unwrap();
        assert_eq!(result.reason, TerminationReason::Escaped);
    }

    #[test]
    fn lifetime_never_exceeds_duration() {
        let settings = short_run(0.5, 64);
        for (a, e) in [(0.01, 0.0), (0.02, 0.5), (0.03, 0.9)] {
            let result = simulate_particle(&point(a, e, 1.0), &settings).unwrap();
            assert!(result.lifetime <= settings.duration);
        }
    }

    #[test]
    fn state_mode_returns_live_system() {
        let settings = short_run(0.1, 20);
        let state = simulate_particle_state(&point(0.015, 0.2, 0.5), &settings).unwrap();
        assert_eq!(state.len(), 3);
        assert_eq!(state.active_count(), 2);
        assert!(state.index_of(TEST_PARTICLE_LABEL).is_some());
        assert_relative_eq!(state.time, 0.1 * YEAR, max_relative = 1e-12);
    }

    #[test]
    fn trace_records_every_surviving_snapshot() {
        let settings = short_run(0.1, 25);
        let trace = trace_particle(&point(0.01, 0.0, 0.0), &settings).unwrap();
        assert_eq!(trace.result.reason, TerminationReason::Survived);
        assert_eq!(trace.trajectory.len(), 25);
        assert_eq!(trace.state.time, settings.duration);
        for sample in &trace.trajectory {
            let r = (sample.x * sample.x + sample.y * sample.y).sqrt();
            assert!((r - 0.01).abs() < 1e-3, "r = {r}");
        }
    }

    #[test]
    fn reason_codes_round_trip() {
        for reason in TerminationReason::ALL {
            assert_eq!(TerminationReason::from_code(reason.code()).unwrap(), reason);
        }
        assert!(TerminationReason::from_code(0.25).is_err());
    }
}
