use anyhow::{Context, Result, anyhow, ensure};
use nalgebra::Vector3;

use crate::orbit::{G, Orbit, OrbitalElements, elements_to_state, state_to_orbit};

/// A point mass. Test particles have zero mass.
#[derive(Debug, Clone)]
pub struct Particle {
    pub label: String,
    pub mass: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl Particle {
    pub fn new(label: impl Into<String>, mass: f64) -> Self {
        Self {
            label: label.into(),
            mass,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().chain(self.velocity.iter()).all(|v| v.is_finite())
    }
}

/// Complete state of a simulation at a given time.
///
/// Only the first `active_count()` particles source gravity; everything after
/// them is a passive test particle.
#[derive(Debug, Clone)]
pub struct SystemState {
    pub time: f64,
    pub particles: Vec<Particle>,
    n_active: Option<usize>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemState {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            particles: Vec::new(),
            n_active: None,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of gravitating particles; all of them unless limited.
    pub fn active_count(&self) -> usize {
        self.n_active
            .map_or(self.particles.len(), |n| n.min(self.particles.len()))
    }

    pub fn set_active_count(&mut self, n_active: usize) {
        self.n_active = Some(n_active);
    }

    pub fn add(&mut self, particle: Particle) -> usize {
        self.particles.push(particle);
        self.particles.len() - 1
    }

    /// Adds a particle on `elements` around the particle at `primary`.
    pub fn add_orbiting(
        &mut self,
        mut particle: Particle,
        primary: usize,
        elements: &OrbitalElements,
    ) -> Result<usize> {
        let host = self
            .particles
            .get(primary)
            .ok_or_else(|| anyhow!("primary index {primary} out of range"))?;
        let mu = G * (host.mass + particle.mass);
        let (position, velocity) = elements_to_state(elements, mu)
            .with_context(|| format!("cannot place '{}' around '{}'", particle.label, host.label))?;
        particle.position = host.position + position;
        particle.velocity = host.velocity + velocity;
        Ok(self.add(particle))
    }

    /// Adds a particle on `elements` around the centre of mass of every
    /// particle already in the system.
    pub fn add_orbiting_barycentre(
        &mut self,
        mut particle: Particle,
        elements: &OrbitalElements,
    ) -> Result<usize> {
        let (com_position, com_velocity, total_mass) = self.center_of_mass();
        ensure!(
            total_mass > 0.0,
            "cannot orbit the barycentre of a massless system"
        );
        let mu = G * (total_mass + particle.mass);
        let (position, velocity) = elements_to_state(elements, mu)
            .with_context(|| format!("cannot place '{}' around the barycentre", particle.label))?;
        particle.position = com_position + position;
        particle.velocity = com_velocity + velocity;
        Ok(self.add(particle))
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.particles.iter().position(|p| p.label == label)
    }

    /// Barycentre position, velocity and total mass.
    pub fn center_of_mass(&self) -> (Vector3<f64>, Vector3<f64>, f64) {
        let mut position = Vector3::zeros();
        let mut velocity = Vector3::zeros();
        let mut mass = 0.0;
        for particle in &self.particles {
            position += particle.position * particle.mass;
            velocity += particle.velocity * particle.mass;
            mass += particle.mass;
        }
        if mass > 0.0 {
            position /= mass;
            velocity /= mass;
        }
        (position, velocity, mass)
    }

    /// Shifts into the barycentric frame.
    pub fn move_to_com(&mut self) {
        let (position, velocity, _) = self.center_of_mass();
        for particle in &mut self.particles {
            particle.position -= position;
            particle.velocity -= velocity;
        }
    }

    /// Osculating orbit of particle `index` around particle `primary`.
    pub fn orbit_of(&self, index: usize, primary: usize) -> Result<Orbit> {
        let body = self
            .particles
            .get(index)
            .ok_or_else(|| anyhow!("particle index {index} out of range"))?;
        let host = self
            .particles
            .get(primary)
            .ok_or_else(|| anyhow!("primary index {primary} out of range"))?;
        let mu = G * (body.mass + host.mass);
        state_to_orbit(
            &(body.position - host.position),
            &(body.velocity - host.velocity),
            mu,
        )
        .with_context(|| format!("orbit of '{}' around '{}'", body.label, host.label))
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.particles.iter().all(Particle::is_finite)
    }

    #[cfg(test)]
    pub fn total_energy(&self) -> f64 {
        let kinetic: f64 = self
            .particles
            .iter()
            .map(|p| 0.5 * p.mass * p.velocity.norm_squared())
            .sum();
        let mut potential = 0.0;
        for i in 0..self.particles.len() {
            for j in (i + 1)..self.particles.len() {
                let pi = &self.particles[i];
                let pj = &self.particles[j];
                potential -= G * pi.mass * pj.mass / (pi.position - pj.position).norm();
            }
        }
        kinetic + potential
    }

    /// Human readable dump of the system, one line per particle.
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "time: {:.6} ({:.6} yr)",
                self.time,
                self.time / crate::orbit::YEAR
            ),
            format!(
                "particles: {} ({} active)",
                self.particles.len(),
                self.active_count()
            ),
        ];
        for particle in &self.particles {
            lines.push(format!(
                "{}: m={:.6e} x=({:.6e}, {:.6e}, {:.6e}) v=({:.6e}, {:.6e}, {:.6e})",
                particle.label,
                particle.mass,
                particle.position.x,
                particle.position.y,
                particle.position.z,
                particle.velocity.x,
                particle.velocity.y,
                particle.velocity.z,
            ));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn star_and_planet() -> SystemState {
        let mut system = SystemState::new();
        system.add(Particle::new("star", 1.0));
        system
            .add_orbiting_barycentre(
                Particle::new("planet", 0.001),
                &OrbitalElements::new(1.0, 0.2, 0.0, 0.0),
            )
            .unwrap();
        system
    }

    #[test]
    fn move_to_com_zeroes_barycentre() {
        let mut system = star_and_planet();
        system.move_to_com();
        let (position, velocity, mass) = system.center_of_mass();
        assert_relative_eq!(mass, 1.001, max_relative = 1e-12);
        assert!(position.norm() < 1e-15);
        assert!(velocity.norm() < 1e-15);
    }

    #[test]
    fn orbit_of_recovers_placement_elements() {
        let mut system = star_and_planet();
        system.move_to_com();
        let planet = system.index_of("planet").unwrap();
        let tp = system
            .add_orbiting(
                Particle::new("tp", 0.0),
                planet,
                &OrbitalElements::new(0.015, 0.4, 5e-5, 2.5),
            )
            .unwrap();
        let orbit = system.orbit_of(tp, planet).unwrap();
        assert_relative_eq!(orbit.semi_major_axis, 0.015, max_relative = 1e-10);
        assert_relative_eq!(orbit.eccentricity, 0.4, max_relative = 1e-10);
        assert_relative_eq!(orbit.mean_anomaly, 2.5, max_relative = 1e-9);
    }

    #[test]
    fn active_count_defaults_to_all_particles() {
        let mut system = star_and_planet();
        assert_eq!(system.active_count(), 2);
        system.add(Particle::new("tp", 0.0));
        assert_eq!(system.active_count(), 3);
        system.set_active_count(2);
        assert_eq!(system.active_count(), 2);
    }

    #[test]
    fn unknown_labels_and_indices_are_errors() {
        let system = star_and_planet();
        assert!(system.index_of("moon").is_none());
        assert!(system.orbit_of(5, 0).is_err());
    }

    #[test]
    fn status_lists_every_particle() {
        let system = star_and_planet();
        let lines = system.status_lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("star:"));
        assert!(lines[3].starts_with("planet:"));
    }
}
