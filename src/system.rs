use anyhow::{Context, Result};

use crate::config::SystemConfig;
use crate::grid::GridPoint;
use crate::orbit::OrbitalElements;
use crate::state::{Particle, SystemState};

pub const STAR_LABEL: &str = "star";
pub const PLANET_LABEL: &str = "planet";
pub const TEST_PARTICLE_LABEL: &str = "tp";

pub const STAR_INDEX: usize = 0;
pub const PLANET_INDEX: usize = 1;

/// Star plus planet in the barycentric frame, planet starting at periapsis.
pub fn build_reference_system(config: &SystemConfig) -> Result<SystemState> {
    let mut system = SystemState::new();
    system.add(Particle::new(STAR_LABEL, config.star_mass));
    system
        .add_orbiting_barycentre(
            Particle::new(PLANET_LABEL, config.planet_mass),
            &OrbitalElements::new(
                config.planet_semi_major_axis,
                config.planet_eccentricity,
                0.0,
                0.0,
            ),
        )
        .context("failed to place the planet")?;
    system.move_to_com();
    Ok(system)
}

/// Adds a massless particle on the grid point's orbit around the planet and
/// freezes the active set at the star and planet. Returns its index.
pub fn add_test_particle(
    system: &mut SystemState,
    point: &GridPoint,
    inclination: f64,
) -> Result<usize> {
    let elements = OrbitalElements::new(
        point.semi_major_axis,
        point.eccentricity,
        inclination,
        point.mean_anomaly,
    );
    let index = system
        .add_orbiting(Particle::new(TEST_PARTICLE_LABEL, 0.0), PLANET_INDEX, &elements)
        .with_context(|| format!("failed to place test particle for grid point {}", point.index))?;
    system.set_active_count(2);
    Ok(index)
}
