//! Per-step kernels. Each function is one full-population data-parallel pass
//! over buffers owned by the solver; the solver runs them strictly in order.
//!
//! Passes that read neighbors never write the buffer they read: results are
//! collected first and committed in a second pass.

use glam::{Quat, Vec3};
use rayon::prelude::*;

use crate::constants::PARTICLE_BLOCK_SIZE;
use crate::geometry::Aabb;
use crate::grid::SpatialGrid;
use crate::kernels::KernelCoefficients;
use crate::params::PbfParams;
use crate::particle::Particle;
use crate::rigid::RigidBodyParticle;
use crate::sort::CellParticlePair;

/// Every pass the solver can dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Predict,
    Hash,
    ClearGrid,
    Sort,
    BuildGrid,
    Reorder,
    ComputeLambda,
    ComputeDeltaP,
    UpdatePosition,
    UpdateVelocity,
    VorticityViscosity,
    ApplyForce,
    GatherRigid,
    RigidReset,
    RigidBarycenter,
    RigidCovariance,
    RigidTransform,
    RigidWriteBack,
    ScatterRigid,
    SwapBuffers,
}

impl Stage {
    /// Neighbor search setup, once per step.
    pub const NEIGHBORHOOD: [Stage; 6] = [
        Stage::Predict,
        Stage::Hash,
        Stage::ClearGrid,
        Stage::Sort,
        Stage::BuildGrid,
        Stage::Reorder,
    ];

    /// One constraint projection iteration.
    pub const CONSTRAINT: [Stage; 3] = [
        Stage::ComputeLambda,
        Stage::ComputeDeltaP,
        Stage::UpdatePosition,
    ];

    pub const FINALIZE: [Stage; 3] = [
        Stage::UpdateVelocity,
        Stage::VorticityViscosity,
        Stage::ApplyForce,
    ];

    pub const SHAPE_MATCHING: [Stage; 7] = [
        Stage::GatherRigid,
        Stage::RigidReset,
        Stage::RigidBarycenter,
        Stage::RigidCovariance,
        Stage::RigidTransform,
        Stage::RigidWriteBack,
        Stage::ScatterRigid,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Predict => "predict",
            Stage::Hash => "hash",
            Stage::ClearGrid => "clear grid",
            Stage::Sort => "sort",
            Stage::BuildGrid => "build grid",
            Stage::Reorder => "reorder",
            Stage::ComputeLambda => "lambda",
            Stage::ComputeDeltaP => "delta p + collision",
            Stage::UpdatePosition => "update position",
            Stage::UpdateVelocity => "update velocity",
            Stage::VorticityViscosity => "vorticity + viscosity",
            Stage::ApplyForce => "apply force",
            Stage::GatherRigid => "gather rigid",
            Stage::RigidReset => "rigid reset",
            Stage::RigidBarycenter => "rigid barycenter",
            Stage::RigidCovariance => "rigid covariance",
            Stage::RigidTransform => "rigid transform",
            Stage::RigidWriteBack => "rigid write back",
            Stage::ScatterRigid => "scatter rigid",
            Stage::SwapBuffers => "swap buffers",
        }
    }
}

/// Read-only state shared by the neighbor passes.
pub struct NeighborContext<'a> {
    pub grid: &'a SpatialGrid,
    pub kernels: &'a KernelCoefficients,
    pub params: &'a PbfParams,
}

/// Rigid surface data used for fluid collision.
pub struct RigidSurface<'a> {
    pub particles: &'a [RigidBodyParticle],
    /// Current orientation per body
    pub rotations: &'a [Quat],
}

impl RigidSurface<'_> {
    /// Push `p` out of the local surface plane of rigid particle `r`.
    pub fn push_out(&self, p: Vec3, r: usize) -> Vec3 {
        let Some(rp) = self.particles.get(r) else {
            return p;
        };
        let Some(rotation) = self.rotations.get(rp.body as usize) else {
            return p;
        };
        let normal = *rotation * rp.gradient;
        let surface = rp.pos_world + normal * rp.distance;
        let depth = (p - surface).dot(normal);
        if depth < 0.0 {
            p - normal * depth
        } else {
            p
        }
    }
}

/// Run `f` on every lane below `live`, one block of lanes per task.
fn for_each_live_lane<F>(particles: &mut [Particle], live: usize, f: F)
where
    F: Fn(&mut Particle) + Send + Sync,
{
    particles
        .par_chunks_mut(PARTICLE_BLOCK_SIZE)
        .enumerate()
        .for_each(|(block, lanes)| {
            let base = block * PARTICLE_BLOCK_SIZE;
            for (lane, p) in lanes.iter_mut().enumerate() {
                if base + lane < live {
                    f(p);
                }
            }
        });
}

/// Run `f` on every particle whose id is below `live`, wherever it sits in
/// the buffer. Used before the sort, when live particles are not yet packed.
fn for_each_live_id<F>(particles: &mut [Particle], live: usize, f: F)
where
    F: Fn(&mut Particle) + Send + Sync,
{
    particles.par_chunks_mut(PARTICLE_BLOCK_SIZE).for_each(|lanes| {
        for p in lanes.iter_mut().filter(|p| p.is_live(live)) {
            f(p);
        }
    });
}

/// Gravity and explicit integration of the predicted position.
pub fn predict(particles: &mut [Particle], live: usize, gravity: Vec3, dt: f32, domain: &Aabb) {
    for_each_live_id(particles, live, |p| {
        if p.is_fixed() {
            p.new_pos = p.old_pos;
            return;
        }
        p.velocity += gravity * dt;
        p.new_pos = domain.clamp(p.old_pos + p.velocity * dt);
    });
}

/// Cell id per live particle; everything else gets the sentinel. After the
/// sort the `live` packed prefix holds exactly the live ids.
pub fn hash(particles: &mut [Particle], pairs: &mut [CellParticlePair], live: usize, grid: &SpatialGrid) {
    for_each_live_id(particles, live, |p| p.grid_coord = grid.world_to_cell(p.new_pos));

    let particles = &*particles;
    pairs.par_iter_mut().enumerate().for_each(|(i, pair)| {
        *pair = match particles.get(i) {
            Some(p) if p.is_live(live) => CellParticlePair::new(grid.cell_index(p.grid_coord), i as u32),
            _ => CellParticlePair::inactive(i as u32),
        };
    });
}

/// Gather particle records into cell order.
pub fn reorder(unsorted: &[Particle], sorted: &mut [Particle], pairs: &[CellParticlePair]) {
    sorted
        .par_iter_mut()
        .zip(pairs.par_iter())
        .for_each(|(out, pair)| {
            if let Some(p) = unsorted.get(pair.particle as usize) {
                *out = *p;
            }
        });
}

/// Density and Lagrange multiplier. Rigid particles contribute density to
/// the fluid but carry no constraint of their own.
pub fn compute_lambda(particles: &mut [Particle], neighbor_counts: &mut [u32], live: usize, ctx: &NeighborContext) {
    let (kernels, params) = (ctx.kernels, ctx.params);
    let results: Vec<(f32, f32, u32)> = {
        let particles = &*particles;
        particles[..live]
            .par_iter()
            .map(|pi| {
                let mut density = 0.0;
                let mut grad_i = Vec3::ZERO;
                let mut grad_sum_sq = 0.0;
                let mut neighbors = 0;
                ctx.grid.for_each_neighbor(pi.grid_coord, |j| {
                    let pj = &particles[j];
                    let r = pi.new_pos - pj.new_pos;
                    let r2 = r.length_squared();
                    if r2 >= kernels.h2 {
                        return;
                    }
                    neighbors += 1;
                    density += pj.mass * kernels.poly6(r2);
                    let grad = kernels.spiky_gradient(r) * (pj.mass / params.rest_density);
                    grad_i += grad;
                    grad_sum_sq += grad.length_squared();
                });

                let lambda = if pi.is_rigid() {
                    0.0
                } else {
                    let constraint = density / params.rest_density - 1.0;
                    let denom = grad_sum_sq + grad_i.length_squared() + params.epsilon_lambda;
                    if denom > 1e-12 {
                        -constraint / denom
                    } else {
                        0.0
                    }
                };
                (density, lambda, neighbors)
            })
            .collect()
    };

    particles[..live]
        .par_iter_mut()
        .zip(neighbor_counts[..live].par_iter_mut())
        .zip(results.par_iter())
        .for_each(|((p, count), &(density, lambda, neighbors))| {
            p.density = density;
            p.lambda = lambda;
            *count = neighbors;
        });
}

/// Position correction from the density constraints, followed by rigid
/// surface and domain collision.
pub fn compute_delta_p(
    particles: &mut [Particle],
    live: usize,
    ctx: &NeighborContext,
    rigid: &RigidSurface,
    domain: &Aabb,
) {
    let (kernels, params) = (ctx.kernels, ctx.params);
    let deltas: Vec<Vec3> = {
        let particles = &*particles;
        particles[..live]
            .par_iter()
            .map(|pi| {
                if pi.is_fixed() {
                    return Vec3::ZERO;
                }

                let mut delta = Vec3::ZERO;
                let mut nearest_rigid: Option<(f32, usize)> = None;
                ctx.grid.for_each_neighbor(pi.grid_coord, |j| {
                    let pj = &particles[j];
                    if pi.is_rigid() && pj.is_rigid() {
                        return;
                    }
                    if pj.is_rigid() {
                        let r = pj.rigid_particle as usize;
                        if let Some(rp) = rigid.particles.get(r) {
                            let d2 = pi.new_pos.distance_squared(rp.pos_world);
                            if nearest_rigid.map_or(true, |(best, _)| d2 < best) {
                                nearest_rigid = Some((d2, r));
                            }
                        }
                    }

                    let r = pi.new_pos - pj.new_pos;
                    let r2 = r.length_squared();
                    if r2 >= kernels.h2 {
                        return;
                    }
                    let s_corr = kernels.tensile_correction(r2, params.tensile_k, params.tensile_n);
                    delta += kernels.spiky_gradient(r) * (pi.lambda + pj.lambda + s_corr);
                });

                let mut corrected = pi.new_pos + delta * (pi.inv_mass / params.rest_density);
                if let Some((_, r)) = nearest_rigid {
                    corrected = rigid.push_out(corrected, r);
                }
                domain.clamp(corrected) - pi.new_pos
            })
            .collect()
    };

    particles[..live]
        .par_iter_mut()
        .zip(deltas.par_iter())
        .for_each(|(p, &d)| p.delta_p = d);
}

pub fn update_position(particles: &mut [Particle], live: usize) {
    for_each_live_lane(particles, live, |p| p.new_pos += p.delta_p);
}

pub fn update_velocity(particles: &mut [Particle], live: usize, dt: f32) {
    let inv_dt = 1.0 / dt;
    for_each_live_lane(particles, live, |p| p.velocity = (p.new_pos - p.old_pos) * inv_dt);
}

/// Vorticity from neighbor velocity curls, plus the XSPH velocity blend.
pub fn vorticity_viscosity(particles: &mut [Particle], live: usize, ctx: &NeighborContext) {
    let kernels = ctx.kernels;
    let results: Vec<(Vec3, Vec3)> = {
        let particles = &*particles;
        particles[..live]
            .par_iter()
            .map(|pi| {
                if pi.is_rigid() {
                    return (Vec3::ZERO, Vec3::ZERO);
                }
                let mut vorticity = Vec3::ZERO;
                let mut blend = Vec3::ZERO;
                ctx.grid.for_each_neighbor(pi.grid_coord, |j| {
                    let pj = &particles[j];
                    let r = pi.new_pos - pj.new_pos;
                    let r2 = r.length_squared();
                    if r2 >= kernels.h2 {
                        return;
                    }
                    let v_ij = pj.velocity - pi.velocity;
                    vorticity += v_ij.cross(kernels.spiky_gradient(r));
                    blend += v_ij * kernels.poly6(r2);
                });
                (vorticity, blend * ctx.params.xsph_viscosity)
            })
            .collect()
    };

    particles[..live]
        .par_iter_mut()
        .zip(results.par_iter())
        .for_each(|(p, &(vorticity, delta_v))| {
            p.vorticity = vorticity;
            p.delta_v = delta_v;
        });
}

/// Vorticity confinement force, then commit velocity and position.
pub fn apply_force(particles: &mut [Particle], live: usize, ctx: &NeighborContext, dt: f32) {
    let (kernels, epsilon) = (ctx.kernels, ctx.params.epsilon_vorticity);
    let forces: Vec<Vec3> = {
        let particles = &*particles;
        particles[..live]
            .par_iter()
            .map(|pi| {
                if pi.is_rigid() || epsilon == 0.0 {
                    return Vec3::ZERO;
                }
                let mut eta = Vec3::ZERO;
                ctx.grid.for_each_neighbor(pi.grid_coord, |j| {
                    let pj = &particles[j];
                    if pj.is_rigid() {
                        return;
                    }
                    let r = pi.new_pos - pj.new_pos;
                    if r.length_squared() >= kernels.h2 {
                        return;
                    }
                    eta += kernels.spiky_gradient(r) * pj.vorticity.length();
                });
                let len = eta.length();
                if len < 1e-6 {
                    return Vec3::ZERO;
                }
                (eta / len).cross(pi.vorticity) * epsilon
            })
            .collect()
    };

    particles[..live]
        .par_iter_mut()
        .zip(forces.par_iter())
        .for_each(|(p, &force)| {
            p.force = force;
            if !p.is_rigid() && !p.is_fixed() {
                p.velocity += p.delta_v + force * (p.inv_mass * dt);
            }
            p.old_pos = p.new_pos;
        });
}

/// Copy the fluid-side positions of rigid-affiliated particles into the
/// rigid particle array, remembering where each one lives this step.
pub fn gather_rigid(
    particles: &[Particle],
    live: usize,
    rigid_particles: &mut [RigidBodyParticle],
    slots: &mut [u32],
) {
    slots.par_iter_mut().for_each(|slot| *slot = u32::MAX);
    let found: Vec<(usize, u32)> = particles[..live]
        .par_iter()
        .enumerate()
        .filter_map(|(k, p)| p.is_rigid().then_some((p.rigid_particle as usize, k as u32)))
        .collect();
    for (r, k) in found {
        if let Some(slot) = slots.get_mut(r) {
            *slot = k;
        }
    }

    rigid_particles
        .par_iter_mut()
        .zip(slots.par_iter())
        .for_each(|(rp, &k)| {
            if let Some(p) = particles.get(k as usize) {
                rp.pos_world = p.new_pos;
            }
        });
}

/// Shape matching is authoritative: overwrite rigid-affiliated particles
/// with their matched positions and fold the correction into velocity.
pub fn scatter_rigid(particles: &mut [Particle], live: usize, rigid_particles: &[RigidBodyParticle], dt: f32) {
    let inv_dt = 1.0 / dt;
    for_each_live_lane(particles, live, |p| {
        if !p.is_rigid() {
            return;
        }
        let Some(rp) = rigid_particles.get(p.rigid_particle as usize) else {
            return;
        };
        p.velocity += (rp.pos_world - p.new_pos) * inv_dt;
        p.new_pos = rp.pos_world;
        p.old_pos = rp.pos_world;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_out_moves_point_to_surface_plane() {
        let rigid = [RigidBodyParticle {
            pos_world: Vec3::ZERO,
            gradient: Vec3::X,
            distance: 1.0,
            ..Default::default()
        }];
        let rotations = [Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)];
        let surface = RigidSurface {
            particles: &rigid,
            rotations: &rotations,
        };
        // Body rotated 90 degrees about z: the local +x normal now faces +y
        let pushed = surface.push_out(Vec3::new(0.3, 0.5, 0.0), 0);
        assert!((pushed - Vec3::new(0.3, 1.0, 0.0)).length() < 1e-5);
        // Already outside: unchanged
        let outside = Vec3::new(0.0, 2.0, 0.0);
        assert_eq!(surface.push_out(outside, 0), outside);
        // Unknown particle index: unchanged
        assert_eq!(surface.push_out(Vec3::ZERO, 5), Vec3::ZERO);
    }

    #[test]
    fn test_predict_skips_idle_lanes_and_fixed_particles() {
        let domain = Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0));
        // Buffer order differs from id order, as after a reorder
        let mut particles = vec![
            Particle::fluid(Vec3::Y).with_id(2),
            Particle::fluid(Vec3::ZERO).with_id(0),
            Particle::new(Vec3::ONE, f32::INFINITY).with_id(1),
        ];
        predict(&mut particles, 2, Vec3::new(0.0, -10.0, 0.0), 0.1, &domain);
        assert!((particles[1].new_pos.y + 0.1).abs() < 1e-6);
        assert_eq!(particles[2].new_pos, Vec3::ONE);
        // Id 2 is past the live count
        assert_eq!(particles[0].new_pos, Vec3::Y);
        assert_eq!(particles[0].velocity, Vec3::ZERO);
    }

    #[test]
    fn test_hash_marks_inactive_lanes() {
        let grid = SpatialGrid::new(Aabb::new(Vec3::ZERO, Vec3::splat(4.8)), 2.4);
        let mut particles = vec![
            Particle::fluid(Vec3::ZERO).with_id(1),
            Particle::fluid(Vec3::splat(3.0)).with_id(0),
        ];
        let mut pairs = vec![CellParticlePair::default(); 4];
        hash(&mut particles, &mut pairs, 1, &grid);
        assert!(pairs[0].is_inactive());
        assert_eq!(pairs[1], CellParticlePair::new(7, 1));
        assert!(pairs[2..].iter().all(CellParticlePair::is_inactive));
        assert_eq!(pairs[3].particle, 3);
    }

    #[test]
    fn test_gather_rigid_forgets_previous_slots() {
        let mut rigid = vec![RigidBodyParticle::default(); 2];
        let mut slots = vec![0, 1];
        // Rigid particle 1 now sits in slot 0; slot 1 holds fluid
        let particles = [Particle::rigid(Vec3::X, 1.0, 1), Particle::fluid(Vec3::Y)];
        gather_rigid(&particles, 2, &mut rigid, &mut slots);
        assert_eq!(slots, vec![u32::MAX, 0]);
        assert_eq!(rigid[0].pos_world, Vec3::ZERO);
        assert_eq!(rigid[1].pos_world, Vec3::X);
    }
}
