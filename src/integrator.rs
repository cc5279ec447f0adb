//! Fixed-step symplectic integrators for a system of active bodies plus
//! passive test particles.
//!
//! Only the first `SystemState::active_count()` particles contribute to the
//! gravitational field. Test particles feel it but never perturb anything,
//! so adding thousands of them would not change the star/planet motion.

use anyhow::{Context, Result, anyhow, ensure};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::orbit::{G, kepler_drift};
use crate::state::SystemState;

/// A time integrator for the restricted N-body problem.
pub trait Integrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Advance the system by one step of length `dt` (which may be negative).
    fn step(&self, state: &mut SystemState, dt: f64) -> Result<()>;

    /// Advance the system to exactly `target` using steps no longer than `dt`.
    ///
    /// The last step is shortened so the state lands on `target`. Returns the
    /// number of steps taken.
    fn integrate_to(&self, state: &mut SystemState, target: f64, dt: f64) -> Result<usize> {
        ensure!(dt > 0.0 && dt.is_finite(), "time step must be positive, got {dt}");
        ensure!(target.is_finite(), "integration target must be finite");

        let mut steps = 0;
        while state.time < target {
            let remaining = target - state.time;
            if remaining <= dt * 1e-9 {
                state.time = target;
                break;
            }
            let h = remaining.min(dt);
            self.step(state, h)
                .with_context(|| format!("{} step at t = {:.6}", self.name(), state.time))?;
            steps += 1;
            if h == remaining {
                state.time = target;
            }
        }

        if !state.is_finite() {
            return Err(anyhow!(
                "state became non-finite while integrating to t = {:.6}",
                target
            ));
        }
        Ok(steps)
    }
}

/// Which integrator to build from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    #[default]
    WisdomHolman,
    Leapfrog,
    Yoshida4,
}

impl IntegratorKind {
    pub fn build(self) -> Box<dyn Integrator> {
        match self {
            IntegratorKind::WisdomHolman => Box::new(WisdomHolman),
            IntegratorKind::Leapfrog => Box::new(Leapfrog),
            IntegratorKind::Yoshida4 => Box::new(Yoshida4::new()),
        }
    }
}

/// Gravitational acceleration of every particle due to the active bodies.
pub fn accelerations(state: &SystemState) -> Vec<Vector3<f64>> {
    let n_active = state.active_count();
    let particles = &state.particles;

    particles
        .iter()
        .enumerate()
        .map(|(i, body)| {
            particles[..n_active]
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .fold(Vector3::zeros(), |acc, (_, source)| {
                    acc + pull(source.mass, &source.position, &body.position)
                })
        })
        .collect()
}

/// Acceleration at `at` due to a point mass at `source`.
fn pull(mass: f64, source: &Vector3<f64>, at: &Vector3<f64>) -> Vector3<f64> {
    let separation = source - at;
    let distance_sq = separation.norm_squared();
    let inv_r3 = 1.0 / (distance_sq * distance_sq.sqrt());
    separation * (G * mass * inv_r3)
}

fn kick(state: &mut SystemState, dt: f64) {
    let accel = accelerations(state);
    state
        .particles
        .iter_mut()
        .zip(accel.iter())
        .for_each(|(particle, a)| particle.velocity += a * dt);
}

fn drift(state: &mut SystemState, dt: f64) {
    state
        .particles
        .iter_mut()
        .for_each(|particle| particle.position += particle.velocity * dt);
}

/// Kick-drift-kick leapfrog without touching the clock.
fn leapfrog_substep(state: &mut SystemState, dt: f64) {
    kick(state, 0.5 * dt);
    drift(state, dt);
    kick(state, 0.5 * dt);
}

/// Symplectic kick-drift-kick leapfrog (2nd order).
#[derive(Debug, Clone, Copy, Default)]
pub struct Leapfrog;

impl Integrator for Leapfrog {
    fn name(&self) -> &'static str {
        "leapfrog"
    }

    fn step(&self, state: &mut SystemState, dt: f64) -> Result<()> {
        leapfrog_substep(state, dt);
        state.time += dt;
        Ok(())
    }
}

/// Fourth-order Yoshida composition of three leapfrog substeps.
#[derive(Debug, Clone, Copy)]
pub struct Yoshida4 {
    outer: f64,
    inner: f64,
}

impl Yoshida4 {
    pub fn new() -> Self {
        let cbrt2 = 2f64.cbrt();
        let outer = 1.0 / (2.0 - cbrt2);
        Self {
            outer,
            inner: -cbrt2 * outer,
        }
    }
}

impl Default for Yoshida4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Integrator for Yoshida4 {
    fn name(&self) -> &'static str {
        "yoshida4"
    }

    fn step(&self, state: &mut SystemState, dt: f64) -> Result<()> {
        leapfrog_substep(state, self.outer * dt);
        leapfrog_substep(state, self.inner * dt);
        leapfrog_substep(state, self.outer * dt);
        state.time += dt;
        Ok(())
    }
}

/// Wisdom-Holman map with a per-particle host.
///
/// Each test particle moves on an exact Kepler orbit around the active body
/// that dominates its motion, and the remaining bodies enter as half-step
/// kicks of the tidal difference between particle and host. A pair of active
/// bodies is advanced exactly as a two-body orbit; any other active set uses
/// a leapfrog step among itself. Pericentre passages around the host need
/// no shorter step.
#[derive(Debug, Clone, Copy, Default)]
pub struct WisdomHolman;

/// Snapshot of an active body used while its particle list is borrowed.
#[derive(Debug, Clone, Copy)]
struct Source {
    mass: f64,
    position: Vector3<f64>,
    velocity: Vector3<f64>,
}

/// A passive particle in the frame of its host, or in the barycentric frame
/// when no active body has mass.
struct Relative {
    index: usize,
    host: Option<usize>,
    position: Vector3<f64>,
    velocity: Vector3<f64>,
}

impl WisdomHolman {
    fn sources(state: &SystemState) -> Vec<Source> {
        state.particles[..state.active_count()]
            .iter()
            .map(|p| Source {
                mass: p.mass,
                position: p.position,
                velocity: p.velocity,
            })
            .collect()
    }

    /// Interaction term for a particle at `offset` from its host.
    fn perturbation(sources: &[Source], host: Option<usize>, offset: &Vector3<f64>) -> Vector3<f64> {
        let origin = host.map_or_else(Vector3::zeros, |h| sources[h].position);
        let at = origin + offset;
        sources
            .iter()
            .enumerate()
            .filter(|(j, _)| Some(*j) != host)
            .fold(Vector3::zeros(), |acc, (_, source)| {
                let direct = pull(source.mass, &source.position, &at);
                match host {
                    Some(_) => acc + direct - pull(source.mass, &source.position, &origin),
                    None => acc + direct,
                }
            })
    }

    /// Active body whose Kepler term outweighs the remaining interaction by
    /// the widest margin at `position`.
    fn host_for(sources: &[Source], position: &Vector3<f64>) -> Option<usize> {
        sources
            .iter()
            .enumerate()
            .filter(|(_, source)| source.mass > 0.0)
            .map(|(h, source)| {
                let offset = position - source.position;
                let kepler = G * source.mass / offset.norm_squared();
                let ratio = Self::perturbation(sources, Some(h), &offset).norm() / kepler;
                (h, ratio)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h)
    }

    fn kick(sources: &[Source], particles: &mut [Relative], dt: f64) {
        for particle in particles {
            particle.velocity += Self::perturbation(sources, particle.host, &particle.position) * dt;
        }
    }

    fn advance_active(state: &mut SystemState, dt: f64) -> Result<()> {
        let n_active = state.active_count();
        let total: f64 = state.particles[..n_active].iter().map(|p| p.mass).sum();
        if n_active != 2 || total <= 0.0 {
            active_leapfrog(state, n_active, dt);
            return Ok(());
        }

        let (first, second) = (&state.particles[0], &state.particles[1]);
        let com_position = (first.position * first.mass + second.position * second.mass) / total;
        let com_velocity = (first.velocity * first.mass + second.velocity * second.mass) / total;
        let (offset, offset_velocity) = kepler_drift(
            &(second.position - first.position),
            &(second.velocity - first.velocity),
            G * total,
            dt,
        )
        .with_context(|| format!("two-body drift of '{}' around '{}'", second.label, first.label))?;

        let (share_first, share_second) = (second.mass / total, first.mass / total);
        let com_position = com_position + com_velocity * dt;
        state.particles[0].position = com_position - offset * share_first;
        state.particles[0].velocity = com_velocity - offset_velocity * share_first;
        state.particles[1].position = com_position + offset * share_second;
        state.particles[1].velocity = com_velocity + offset_velocity * share_second;
        Ok(())
    }
}

/// Kick-drift-kick of the active bodies only.
fn active_leapfrog(state: &mut SystemState, n_active: usize, dt: f64) {
    let half_kick = |state: &mut SystemState| {
        let accel = accelerations(state);
        state.particles[..n_active]
            .iter_mut()
            .zip(accel.iter())
            .for_each(|(particle, a)| particle.velocity += a * (0.5 * dt));
    };
    half_kick(state);
    state.particles[..n_active]
        .iter_mut()
        .for_each(|particle| particle.position += particle.velocity * dt);
    half_kick(state);
}

impl Integrator for WisdomHolman {
    fn name(&self) -> &'static str {
        "wisdom_holman"
    }

    fn step(&self, state: &mut SystemState, dt: f64) -> Result<()> {
        let n_active = state.active_count();
        let before = Self::sources(state);

        let mut passive: Vec<Relative> = state.particles[n_active..]
            .iter()
            .enumerate()
            .map(|(k, particle)| {
                let host = Self::host_for(&before, &particle.position);
                let (origin, origin_velocity) = host.map_or_else(
                    || (Vector3::zeros(), Vector3::zeros()),
                    |h| (before[h].position, before[h].velocity),
                );
                Relative {
                    index: n_active + k,
                    host,
                    position: particle.position - origin,
                    velocity: particle.velocity - origin_velocity,
                }
            })
            .collect();

        Self::kick(&before, &mut passive, 0.5 * dt);
        Self::advance_active(state, dt)?;
        let after = Self::sources(state);

        for particle in &mut passive {
            match particle.host {
                Some(h) => {
                    let (position, velocity) =
                        kepler_drift(&particle.position, &particle.velocity, G * before[h].mass, dt)
                            .with_context(|| {
                                format!("Kepler drift of '{}'", state.particles[particle.index].label)
                            })?;
                    particle.position = position;
                    particle.velocity = velocity;
                }
                None => particle.position += particle.velocity * dt,
            }
        }

        Self::kick(&after, &mut passive, 0.5 * dt);

        for particle in passive {
            let (origin, origin_velocity) = particle.host.map_or_else(
                || (Vector3::zeros(), Vector3::zeros()),
                |h| (after[h].position, after[h].velocity),
            );
            let target = &mut state.particles[particle.index];
            target.position = origin + particle.position;
            target.velocity = origin_velocity + particle.velocity;
        }

        state.time += dt;
        Ok(())
    }
}
