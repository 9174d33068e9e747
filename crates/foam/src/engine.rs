//! The per-frame diffuse particle engine.
//!
//! Runs the multi-pass reduction over a frame's fluid particles (trapped
//! air, color field, gradient, wave crests), seeds new diffuse particles
//! on a cylinder around each seed's velocity axis, then advects,
//! reclassifies and retires the persistent diffuse set.

use std::f64::consts::PI;

use glam::DVec3;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::grid::BucketGrid;
use crate::kernels::{w_spike, w_wendland};
use crate::params::SimulationParams;
use crate::particle::DiffuseParticle;

/// Gravitational acceleration in m/s^2; the z axis points up.
pub const GRAVITY: f64 = 9.81;

/// Color-field value below which a fluid particle counts as surface.
const SURFACE: f64 = 0.75;

/// Band-pass clamp: 0 below `tmin`, 1 above `tmax`, linear in between.
#[inline]
pub fn phi(i: f64, tmin: f64, tmax: f64) -> f64 {
    (i.min(tmax) - i.min(tmin)) / (tmax - tmin)
}

/// Per-frame fluid field responses, kept for the fluid diagnostics output
/// and the driver's progress reporting.
pub struct FrameDiagnostics {
    /// Trapped-air response per fluid particle, after clamping.
    pub trapped_air: Vec<f64>,
    /// Wave-crest response per fluid particle, after clamping.
    pub wave_crests: Vec<f64>,
    /// Kinetic-energy response per fluid particle, after clamping.
    pub energy: Vec<f64>,
    /// Number of diffuse particles seeded by each fluid particle.
    pub ndiffuse: Vec<i32>,
    /// Total newly seeded diffuse particles this frame.
    pub seeded: usize,
    /// Persistent diffuse particles retired this frame.
    pub deleted: usize,
}

/// Stateful engine carrying the persistent diffuse set across frames.
pub struct DiffuseEngine {
    params: SimulationParams,
    persistent: Vec<DiffuseParticle>,
    next_id: u64,
    rng: ChaCha8Rng,
}

impl DiffuseEngine {
    pub fn new(params: &SimulationParams) -> Self {
        let rng = match params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            params: params.clone(),
            persistent: Vec::new(),
            next_id: 0,
            rng,
        }
    }

    /// Resume from a previous run's diffuse set. `next_id` must be larger
    /// than every id in `particles` so ids stay unique.
    pub fn with_state(
        params: &SimulationParams,
        particles: Vec<DiffuseParticle>,
        next_id: u64,
    ) -> Self {
        let mut engine = Self::new(params);
        engine.persistent = particles;
        engine.next_id = next_id;
        engine
    }

    /// The persistent diffuse set, newest particles last.
    pub fn particles(&self) -> &[DiffuseParticle] {
        &self.persistent
    }

    /// Run one frame: reductions over the fluid, seeding, advection of the
    /// persistent set, retirement and append.
    pub fn step(&mut self, grid: &BucketGrid, dt: f64) -> FrameDiagnostics {
        let fluid = grid.particles();
        let n = fluid.len();
        let h = self.params.h;
        let mass = self.params.mass;

        // Trapped-air potential, kinetic energy and color field.
        let mut ita = vec![0.0f64; n];
        let mut color_field = vec![0.0f64; n];
        let mut energy = vec![0.0f64; n];
        ita.par_iter_mut()
            .zip(color_field.par_iter_mut())
            .zip(energy.par_iter_mut())
            .zip(fluid.par_iter())
            .for_each(|(((ita_i, cf_i), en_i), pi)| {
                for bucket in grid.neighborhood_at(pi.position) {
                    for pj in bucket {
                        if pj.id == pi.id {
                            continue;
                        }
                        let xij = pi.position - pj.position;
                        let mp = xij.length();
                        let q = mp / h;

                        if mp <= h {
                            let vij = pi.velocity - pj.velocity;
                            let mv = vij.length();
                            let e = 1.0 - (vij / mv).dot(xij / mp);
                            *ita_i += mv * e * (1.0 - q);
                        }
                        if q <= 2.0 {
                            *cf_i += mass / pj.rest_density * w_wendland(xij, h);
                        }
                    }
                }
                *en_i = 0.5 * mass * pi.velocity.length_squared();
            });

        // Gradient of the color field. The j == i term stays in: the
        // Wendland kernel contributes its peak and xij is zero there.
        let mut gradient = vec![DVec3::ZERO; n];
        gradient
            .par_iter_mut()
            .zip(fluid.par_iter())
            .for_each(|(grad_i, pi)| {
                for bucket in grid.neighborhood_at(pi.position) {
                    for pj in bucket {
                        let xij = pi.position - pj.position;
                        if xij.length() / h <= 2.0 {
                            *grad_i += color_field[pj.id] * w_wendland(xij, h) * xij;
                        }
                    }
                }
            });

        // Wave crests, surface particles only.
        let mut wave_crest = vec![0.0f64; n];
        wave_crest
            .par_iter_mut()
            .zip(fluid.par_iter())
            .for_each(|(wc_i, pi)| {
                if color_field[pi.id] >= SURFACE {
                    return;
                }
                let nni = gradient[pi.id].normalize_or_zero();
                let nvi = pi.velocity.normalize_or_zero();
                if nvi.dot(nni) < 0.6 {
                    return;
                }
                for bucket in grid.neighborhood_at(pi.position) {
                    for pj in bucket {
                        let xji = (pj.position - pi.position).normalize_or_zero();
                        if xji.dot(nni) < 0.0 {
                            let nnj = gradient[pj.id].normalize_or_zero();
                            *wc_i +=
                                (1.0 - nni.dot(nnj)) * w_spike(pi.position - pj.position, h);
                        }
                    }
                }
            });

        log_field_stats("wave crests", &wave_crest);
        log_field_stats("trapped air", &ita);
        log_field_stats("energy", &energy);

        // Clamp the raw magnitudes to [0, 1] band-pass responses.
        let sp = &self.params;
        wave_crest
            .par_iter_mut()
            .for_each(|wc| *wc = phi(*wc, sp.min_wc, sp.max_wc));
        ita.par_iter_mut()
            .for_each(|ta| *ta = phi(*ta, sp.min_ta, sp.max_ta));
        energy
            .par_iter_mut()
            .for_each(|en| *en = phi(*en, sp.min_k, sp.max_k));

        // Diffuse particle counts per seed.
        let mut ndiffuse = vec![0i32; n];
        ndiffuse.par_iter_mut().enumerate().for_each(|(i, nd)| {
            *nd = (energy[i] * (sp.k_ta * ita[i] + sp.k_wc * wave_crest[i]) * dt).floor() as i32;
        });

        let mut seeded = self.seed_particles(grid, &ndiffuse, dt);

        // Initial density for the newly seeded particles.
        seeded.par_iter_mut().for_each(|dp| {
            dp.density = fluid_neighbor_count(grid, dp.position, h);
        });

        self.advect_persistent(grid, dt);
        let deleted = self.retire(grid.bounds());
        let seeded_count = seeded.len();
        self.persistent.extend(seeded);

        FrameDiagnostics {
            trapped_air: ita,
            wave_crests: wave_crest,
            energy,
            ndiffuse,
            seeded: seeded_count,
            deleted,
        }
    }

    /// Emit new diffuse particles on a cylinder around each seed's
    /// velocity axis.
    ///
    /// Random samples are drawn serially up front (the generator is not
    /// thread safe); child `k` of seed `i` consumes the three samples at
    /// `3 * (prefix[i] + k)`, so emission is deterministic for a fixed
    /// seed regardless of thread count.
    fn seed_particles(
        &mut self,
        grid: &BucketGrid,
        ndiffuse: &[i32],
        dt: f64,
    ) -> Vec<DiffuseParticle> {
        let fluid = grid.particles();
        let n = fluid.len();
        let sp = &self.params;

        let mut prefix = vec![0usize; n + 1];
        for i in 0..n {
            prefix[i + 1] = prefix[i] + ndiffuse[i] as usize;
        }
        let total = prefix[n];

        let samples: Vec<f64> = (0..total * 3).map(|_| self.rng.gen::<f64>()).collect();
        let base_id = self.next_id;
        self.next_id += total as u64;

        let mut seeded = Vec::with_capacity(total);
        (0..total)
            .into_par_iter()
            .map(|idif| {
                let i = prefix.partition_point(|&p| p <= idif) - 1;
                let pi = &fluid[i];
                let (e1, e2, nvel) = jitter_frame(pi.position, pi.velocity);

                let u = &samples[idif * 3..idif * 3 + 3];
                let height = u[0] * pi.velocity.length() * dt * 0.5;
                let r = sp.h * u[1].sqrt();
                let theta = u[2] * 2.0 * PI;
                let radial = r * theta.cos() * e1 + r * theta.sin() * e2;

                DiffuseParticle {
                    id: base_id + idif as u64,
                    position: pi.position + radial + height * nvel,
                    velocity: radial + pi.velocity,
                    ttl: ndiffuse[i] * sp.lifetime,
                    density: 0.0,
                }
            })
            .collect_into_vec(&mut seeded);
        seeded
    }

    /// Reclassify every persistent particle by its local fluid density and
    /// advance it: ballistic for spray, drag plus buoyancy for bubbles,
    /// carried with the fluid for foam.
    fn advect_persistent(&mut self, grid: &BucketGrid, dt: f64) {
        let sp = &self.params;
        let h = sp.h;
        self.persistent.par_iter_mut().for_each(|dp| {
            dp.density = fluid_neighbor_count(grid, dp.position, h);

            // Spray needs no fluid velocity average.
            let mut num = DVec3::ZERO;
            let mut den = 0.0;
            if dp.density >= sp.spray {
                for bucket in grid.neighborhood_at(dp.position) {
                    for pj in bucket {
                        let w = w_wendland(dp.position - pj.position, h);
                        num += pj.velocity * w;
                        den += w;
                    }
                }
            }

            if dp.density < sp.spray {
                dp.velocity.z -= GRAVITY * dt;
                dp.position += dp.velocity * dt;
            } else if dp.density > sp.bubbles {
                let avg = num / den;
                let drag = sp.k_d * (avg - dp.velocity) / dt;
                let buoyancy = DVec3::new(0.0, 0.0, sp.k_b * GRAVITY);
                dp.velocity += dt * (drag + buoyancy);
                dp.position += dp.velocity * dt;
            } else {
                let avg = num / den;
                dp.velocity = avg;
                dp.position += avg * dt;
            }
        });
    }

    /// Age foam particles and drop everything expired or outside the
    /// domain box. Compaction preserves order.
    fn retire(&mut self, bounds: crate::grid::Aabb) -> usize {
        let sp = &self.params;
        let before = self.persistent.len();
        self.persistent.retain_mut(|dp| {
            if dp.density > sp.spray && dp.density < sp.bubbles {
                dp.ttl -= 1;
            }
            dp.ttl >= 0 && bounds.contains_strict(dp.position)
        });
        before - self.persistent.len()
    }
}

/// Number of fluid particles within `h` of a position.
fn fluid_neighbor_count(grid: &BucketGrid, position: DVec3, h: f64) -> f64 {
    let mut count = 0.0;
    for bucket in grid.neighborhood_at(position) {
        for pj in bucket {
            if (position - pj.position).length() <= h {
                count += 1.0;
            }
        }
    }
    count
}

/// Jitter basis around a seed's velocity axis: a vector `e1` in the plane
/// through the seed perpendicular to the velocity, a second spanning
/// vector `e2`, and the normalized velocity.
///
/// `e1` normalizes the solved plane *point*, and `e2`'s middle component
/// keeps its historical unnegated sign, so the pair is not orthonormal.
/// It only has to span the sampling disc.
fn jitter_frame(position: DVec3, velocity: DVec3) -> (DVec3, DVec3, DVec3) {
    let (p, v) = (position, velocity);
    // Pick a nonzero velocity component, x then y then z, to keep the
    // plane solve away from division by zero.
    let q = if v.x != 0.0 {
        DVec3::new(
            solve_plane(p.z, p.y, p.x, v.z, v.y, v.x, 0.0, 1.0),
            1.0,
            0.0,
        )
    } else if v.y != 0.0 {
        DVec3::new(
            1.0,
            solve_plane(p.x, p.z, p.y, v.x, v.z, v.y, 1.0, 0.0),
            0.0,
        )
    } else {
        DVec3::new(
            1.0,
            0.0,
            solve_plane(p.x, p.y, p.z, v.x, v.y, v.z, 1.0, 0.0),
        )
    };
    let e1 = q.normalize();
    let e2 = DVec3::new(
        e1.y * v.z - v.y * e1.z,
        e1.x * v.z - v.x * e1.z,
        e1.x * v.y - v.x * e1.y,
    )
    .normalize();
    (e1, e2, v.normalize())
}

/// Solve `v . (q - p) = 0` for the third coordinate of `q = (x, y, _)`,
/// with `p` and `v` permuted by the caller so the divisor is nonzero.
#[inline]
fn solve_plane(px: f64, py: f64, pz: f64, vx: f64, vy: f64, vz: f64, x: f64, y: f64) -> f64 {
    (-(x - px) * vx - (y - py) * vy) / vz + pz
}

fn log_field_stats(name: &str, values: &[f64]) {
    if values.is_empty() || !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    debug!(
        "{name}: min {min:.3e} max {max:.3e} mean {:.3e}",
        sum / values.len() as f64
    );
}
