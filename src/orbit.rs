//! Two-body orbital elements in the yr/2π, AU, solar-mass unit system.
//!
//! In these units the gravitational constant is exactly one and one year is
//! `2π` time units, so a body at 1 AU around a 1 M☉ star has a period of `2π`.

use std::f64::consts::{PI, TAU};

use anyhow::{Result, anyhow, bail, ensure};
use nalgebra::Vector3;

/// Gravitational constant.
pub const G: f64 = 1.0;

/// Length of one year in program time units.
pub const YEAR: f64 = TAU;

const KEPLER_TOLERANCE: f64 = 1e-15;
const KEPLER_MAX_ITERATIONS: usize = 100;
const ANGLE_EPSILON: f64 = 1e-14;
const UNIVERSAL_TOLERANCE: f64 = 1e-13;
const UNIVERSAL_MAX_ITERATIONS: usize = 60;
/// Laguerre order used for the universal Kepler equation.
const LAGUERRE_ORDER: f64 = 5.0;

/// Classical elements used to place a body on a bound orbit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalElements {
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub inclination: f64,
    pub longitude_of_node: f64,
    pub argument_of_periapsis: f64,
    pub mean_anomaly: f64,
}

impl OrbitalElements {
    /// Elements with the node and periapsis angles set to zero.
    pub fn new(semi_major_axis: f64, eccentricity: f64, inclination: f64, mean_anomaly: f64) -> Self {
        Self {
            semi_major_axis,
            eccentricity,
            inclination,
            longitude_of_node: 0.0,
            argument_of_periapsis: 0.0,
            mean_anomaly,
        }
    }

    /// Rejects anything that is not a finite, bound ellipse.
    pub fn ensure_bound(&self) -> Result<()> {
        ensure!(
            self.semi_major_axis.is_finite() && self.semi_major_axis > 0.0,
            "semi-major axis must be positive and finite, got {}",
            self.semi_major_axis
        );
        ensure!(
            self.eccentricity.is_finite() && (0.0..1.0).contains(&self.eccentricity),
            "eccentricity must lie in [0, 1), got {}",
            self.eccentricity
        );
        ensure!(
            self.inclination.is_finite()
                && self.longitude_of_node.is_finite()
                && self.argument_of_periapsis.is_finite()
                && self.mean_anomaly.is_finite(),
            "orbital angles must be finite"
        );
        Ok(())
    }
}

/// Osculating orbit of a body relative to its primary.
///
/// `semi_major_axis` is negative for hyperbolic orbits and infinite for an
/// exactly parabolic one.
#[derive(Debug, Clone, Copy)]
pub struct Orbit {
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub inclination: f64,
    pub longitude_of_node: f64,
    pub argument_of_periapsis: f64,
    pub true_anomaly: f64,
    pub mean_anomaly: f64,
    pub specific_energy: f64,
    pub specific_angular_momentum: f64,
    pub distance: f64,
}

impl Orbit {
    pub fn is_bound(&self) -> bool {
        self.eccentricity < 1.0 && self.specific_energy < 0.0
    }
}

/// Solves Kepler's equation `E - e sin E = M` for the eccentric anomaly.
pub fn solve_kepler(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let m = wrap_angle(mean_anomaly);
    let mut ecc_anomaly = if eccentricity < 0.8 { m } else { PI };

    for _ in 0..KEPLER_MAX_ITERATIONS {
        let f = ecc_anomaly - eccentricity * ecc_anomaly.sin() - m;
        let f_prime = 1.0 - eccentricity * ecc_anomaly.cos();
        let delta = f / f_prime;
        ecc_anomaly -= delta;
        if delta.abs() < KEPLER_TOLERANCE {
            break;
        }
    }

    ecc_anomaly
}

pub fn true_anomaly_from_eccentric(ecc_anomaly: f64, eccentricity: f64) -> f64 {
    let half = 0.5 * ecc_anomaly;
    2.0 * ((1.0 + eccentricity).sqrt() * half.sin())
        .atan2((1.0 - eccentricity).sqrt() * half.cos())
}

/// Cartesian position and velocity of a body on `elements` around a primary
/// with gravitational parameter `mu`, relative to that primary.
pub fn elements_to_state(
    elements: &OrbitalElements,
    mu: f64,
) -> Result<(Vector3<f64>, Vector3<f64>)> {
    elements.ensure_bound()?;
    ensure!(mu > 0.0 && mu.is_finite(), "gravitational parameter must be positive, got {mu}");

    let a = elements.semi_major_axis;
    let e = elements.eccentricity;

    let ecc_anomaly = solve_kepler(elements.mean_anomaly, e);
    let f = true_anomaly_from_eccentric(ecc_anomaly, e);

    let semi_latus = a * (1.0 - e * e);
    let r = semi_latus / (1.0 + e * f.cos());
    let v0 = (mu / semi_latus).sqrt();

    let (s_node, c_node) = elements.longitude_of_node.sin_cos();
    let (s_peri, c_peri) = elements.argument_of_periapsis.sin_cos();
    let (s_inc, c_inc) = elements.inclination.sin_cos();
    let (s_f, c_f) = f.sin_cos();

    let position = Vector3::new(
        r * (c_node * (c_peri * c_f - s_peri * s_f)
            - s_node * (s_peri * c_f + c_peri * s_f) * c_inc),
        r * (s_node * (c_peri * c_f - s_peri * s_f)
            + c_node * (s_peri * c_f + c_peri * s_f) * c_inc),
        r * (s_peri * c_f + c_peri * s_f) * s_inc,
    );

    let velocity = Vector3::new(
        v0 * ((e + c_f) * (-c_inc * c_peri * s_node - c_node * s_peri)
            - s_f * (c_peri * c_node - c_inc * s_peri * s_node)),
        v0 * ((e + c_f) * (c_inc * c_peri * c_node - s_node * s_peri)
            - s_f * (c_peri * s_node + c_inc * s_peri * c_node)),
        v0 * ((e + c_f) * c_peri * s_inc - s_f * s_inc * s_peri),
    );

    Ok((position, velocity))
}

/// Osculating elements of a relative state vector.
pub fn state_to_orbit(position: &Vector3<f64>, velocity: &Vector3<f64>, mu: f64) -> Result<Orbit> {
    let r = position.norm();
    if !r.is_finite() || r <= 0.0 {
        return Err(anyhow!("Invalid radius {:.6e} for orbital element calculation", r));
    }
    if !velocity.iter().all(|v| v.is_finite()) {
        return Err(anyhow!("Non-finite velocity in orbital element calculation"));
    }

    let v2 = velocity.norm_squared();
    let r_dot_v = position.dot(velocity);
    let h = position.cross(velocity);
    let h_norm = h.norm();

    let specific_energy = 0.5 * v2 - mu / r;
    let e_vec = ((v2 - mu / r) * position - r_dot_v * velocity) / mu;
    let eccentricity = e_vec.norm();
    let semi_major_axis = -mu / (2.0 * specific_energy);

    let inclination = if h_norm > 0.0 {
        (h.z / h_norm).clamp(-1.0, 1.0).acos()
    } else {
        0.0
    };

    // Node vector z × h.
    let node = Vector3::new(-h.y, h.x, 0.0);
    let node_norm = node.norm();
    let equatorial = node_norm <= ANGLE_EPSILON * h_norm.max(f64::MIN_POSITIVE);
    let circular = eccentricity <= ANGLE_EPSILON;

    let longitude_of_node = if equatorial {
        0.0
    } else {
        let angle = (node.x / node_norm).clamp(-1.0, 1.0).acos();
        if node.y < 0.0 { TAU - angle } else { angle }
    };

    let argument_of_periapsis = if circular {
        0.0
    } else if equatorial {
        let angle = e_vec.y.atan2(e_vec.x);
        wrap_angle(if h.z < 0.0 { -angle } else { angle })
    } else {
        let angle = (node.dot(&e_vec) / (node_norm * eccentricity))
            .clamp(-1.0, 1.0)
            .acos();
        if e_vec.z < 0.0 { TAU - angle } else { angle }
    };

    let true_anomaly = if !circular {
        let angle = (e_vec.dot(position) / (eccentricity * r)).clamp(-1.0, 1.0).acos();
        if r_dot_v < 0.0 { TAU - angle } else { angle }
    } else if !equatorial {
        // Argument of latitude.
        let angle = (node.dot(position) / (node_norm * r)).clamp(-1.0, 1.0).acos();
        if position.z < 0.0 { TAU - angle } else { angle }
    } else {
        let angle = position.y.atan2(position.x);
        wrap_angle(if h.z < 0.0 { -angle } else { angle })
    };

    Ok(Orbit {
        semi_major_axis,
        eccentricity,
        inclination,
        longitude_of_node,
        argument_of_periapsis,
        true_anomaly,
        mean_anomaly: mean_from_true_anomaly(true_anomaly, eccentricity),
        specific_energy,
        specific_angular_momentum: h_norm,
        distance: r,
    })
}

/// Advances a relative state along its two-body orbit by `dt`.
///
/// Works in the universal variable so elliptic, parabolic and hyperbolic
/// orbits share one path. Bound orbits drop whole periods first, which keeps
/// the root bracket small when `dt` spans several revolutions.
pub fn kepler_drift(
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    mu: f64,
    dt: f64,
) -> Result<(Vector3<f64>, Vector3<f64>)> {
    ensure!(mu > 0.0 && mu.is_finite(), "gravitational parameter must be positive, got {mu}");
    let r0 = position.norm();
    if !r0.is_finite() || r0 <= 0.0 {
        bail!("invalid radius {r0:.6e} for a Kepler drift");
    }
    if dt == 0.0 {
        return Ok((*position, *velocity));
    }

    let sqrt_mu = mu.sqrt();
    let alpha = 2.0 / r0 - velocity.norm_squared() / mu;
    let sigma = position.dot(velocity) / sqrt_mu;

    let dt = if alpha > 0.0 {
        let period = TAU / (sqrt_mu * alpha * alpha.sqrt());
        dt % period
    } else {
        dt
    };

    let mut chi = initial_universal_anomaly(r0, sigma, alpha, sqrt_mu, dt);
    let mut converged = false;
    for _ in 0..UNIVERSAL_MAX_ITERATIONS {
        let chi2 = chi * chi;
        let psi = alpha * chi2;
        let (c2, c3) = stumpff(psi);

        let f = r0 * chi * (1.0 - psi * c3) + sigma * chi2 * c2 + chi2 * chi * c3 - sqrt_mu * dt;
        let df = chi2 * c2 + sigma * chi * (1.0 - psi * c3) + r0 * (1.0 - psi * c2);
        let ddf = sigma * (1.0 - psi * c2) + (1.0 - alpha * r0) * chi * (1.0 - psi * c3);

        let n = LAGUERRE_ORDER;
        let root = ((n - 1.0).powi(2) * df * df - n * (n - 1.0) * f * ddf).abs().sqrt();
        let delta = n * f / (df + df.signum() * root);
        chi -= delta;

        if !chi.is_finite() {
            break;
        }
        if delta.abs() <= UNIVERSAL_TOLERANCE * chi.abs().max(f64::MIN_POSITIVE) {
            converged = true;
            break;
        }
    }
    if !converged {
        bail!("universal Kepler equation did not converge (r = {r0:.6e}, dt = {dt:.6e})");
    }

    let chi2 = chi * chi;
    let psi = alpha * chi2;
    let (c2, c3) = stumpff(psi);
    let r = chi2 * c2 + sigma * chi * (1.0 - psi * c3) + r0 * (1.0 - psi * c2);

    let f = 1.0 - chi2 / r0 * c2;
    let g = dt - chi2 * chi / sqrt_mu * c3;
    let f_dot = sqrt_mu / (r * r0) * chi * (psi * c3 - 1.0);
    let g_dot = 1.0 - chi2 / r * c2;

    Ok((
        position * f + velocity * g,
        position * f_dot + velocity * g_dot,
    ))
}

fn initial_universal_anomaly(r0: f64, sigma: f64, alpha: f64, sqrt_mu: f64, dt: f64) -> f64 {
    let near_parabolic = sqrt_mu * dt / r0;
    if alpha > 1e-12 {
        return sqrt_mu * dt * alpha;
    }
    if alpha < -1e-12 {
        let a = 1.0 / alpha;
        let sign = dt.signum();
        let ratio = (-2.0 * alpha * sqrt_mu * sqrt_mu * dt * dt)
            / (sigma * sqrt_mu + sign * (-a * sqrt_mu * sqrt_mu).sqrt() * (1.0 - r0 * alpha));
        let guess = sign * (-a).sqrt() * ratio.ln();
        if guess.is_finite() {
            return guess;
        }
    }
    near_parabolic
}

/// Stumpff functions `c2(psi)` and `c3(psi)`.
fn stumpff(psi: f64) -> (f64, f64) {
    if psi.abs() < 0.1 {
        let c2 = 1.0 / 2.0
            - psi * (1.0 / 24.0
                - psi * (1.0 / 720.0
                    - psi * (1.0 / 40_320.0
                        - psi * (1.0 / 3_628_800.0 - psi / 479_001_600.0))));
        let c3 = 1.0 / 6.0
            - psi * (1.0 / 120.0
                - psi * (1.0 / 5_040.0
                    - psi * (1.0 / 362_880.0
                        - psi * (1.0 / 39_916_800.0 - psi / 6_227_020_800.0))));
        (c2, c3)
    } else if psi > 0.0 {
        let s = psi.sqrt();
        let half = (0.5 * s).sin();
        (2.0 * half * half / psi, (s - s.sin()) / (psi * s))
    } else {
        let s = (-psi).sqrt();
        let half = (0.5 * s).sinh();
        (2.0 * half * half / -psi, (s.sinh() - s) / (-psi * s))
    }
}

/// Mean anomaly for elliptic, parabolic and hyperbolic orbits.
pub fn mean_from_true_anomaly(true_anomaly: f64, eccentricity: f64) -> f64 {
    let half_tan = (0.5 * true_anomaly).tan();
    if eccentricity < 1.0 {
        let ecc_anomaly =
            2.0 * (((1.0 - eccentricity) / (1.0 + eccentricity)).sqrt() * half_tan).atan();
        wrap_angle(ecc_anomaly - eccentricity * ecc_anomaly.sin())
    } else if eccentricity > 1.0 {
        let hyp_anomaly =
            2.0 * (((eccentricity - 1.0) / (eccentricity + 1.0)).sqrt() * half_tan).atanh();
        eccentricity * hyp_anomaly.sinh() - hyp_anomaly
    } else {
        half_tan + half_tan.powi(3) / 3.0
    }
}

/// Wraps an angle into `[0, 2π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU { 0.0 } else { wrapped }
}
