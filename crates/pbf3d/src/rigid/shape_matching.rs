//! Shape matching: recover each body's best-fit rigid transform from its
//! particles' current positions and snap the particles back onto it.
//!
//! Per-body sums use a segmented tree reduction. Every round halves the number
//! of live partial sums in each body; the round count comes from the largest
//! body so smaller bodies simply stop changing.

use glam::{Mat3, Mat4, Quat, Vec3};
use rayon::prelude::*;

use super::body::RigidBodyParticle;
use super::registry::RigidBodyData;

const ROTATION_ITERATIONS: usize = 20;

/// Scratch accumulators, one slot per rigid particle.
#[derive(Debug, Default)]
pub struct ShapeMatcher {
    barycenter_sums: Vec<Vec3>,
    covariance_sums: Vec<Mat3>,
    max_body_particles: usize,
}

impl ShapeMatcher {
    pub fn new(particle_count: usize, max_body_particles: usize) -> Self {
        Self {
            barycenter_sums: vec![Vec3::ZERO; particle_count],
            covariance_sums: vec![Mat3::ZERO; particle_count],
            max_body_particles,
        }
    }

    /// Run every stage in order.
    pub fn solve(&mut self, bodies: &mut [RigidBodyData], particles: &mut [RigidBodyParticle]) {
        self.reset();
        self.reduce_barycenters(bodies, particles);
        self.reduce_covariance(bodies, particles);
        self.update_transforms(bodies);
        write_back(bodies, particles);
    }

    /// Zero the accumulators.
    pub fn reset(&mut self) {
        self.barycenter_sums.par_iter_mut().for_each(|s| *s = Vec3::ZERO);
        self.covariance_sums.par_iter_mut().for_each(|s| *s = Mat3::ZERO);
    }

    /// Current world barycenter of every dynamic body.
    pub fn reduce_barycenters(&mut self, bodies: &mut [RigidBodyData], particles: &[RigidBodyParticle]) {
        self.barycenter_sums
            .par_iter_mut()
            .zip(particles.par_iter())
            .for_each(|(sum, p)| *sum = p.pos_world);
        segmented_reduce(&mut self.barycenter_sums, bodies, self.max_body_particles);

        bodies.par_iter_mut().for_each(|body| {
            let count = body.particle_count();
            if body.is_static || count == 0 {
                return;
            }
            body.world_barycenter = self.barycenter_sums[body.first as usize] / count as f32;
        });
    }

    /// Refresh world offsets and accumulate `A = sum(r_world * r_local^T)`.
    pub fn reduce_covariance(&mut self, bodies: &[RigidBodyData], particles: &mut [RigidBodyParticle]) {
        particles
            .par_iter_mut()
            .zip(self.covariance_sums.par_iter_mut())
            .for_each(|(p, sum)| {
                let Some(body) = bodies.get(p.body as usize) else {
                    return;
                };
                p.r_world = p.pos_world - body.world_barycenter;
                *sum = outer(p.r_world, p.r_local);
            });
        segmented_reduce(&mut self.covariance_sums, bodies, self.max_body_particles);
    }

    /// Rotation + barycenter -> local-to-world transform. Static bodies keep
    /// the externally driven pose.
    pub fn update_transforms(&self, bodies: &mut [RigidBodyData]) {
        fit_transforms(bodies, &self.covariance_sums);
    }
}

fn fit_transforms(bodies: &mut [RigidBodyData], covariance_sums: &[Mat3]) {
    bodies.par_iter_mut().for_each(|body| {
        if body.is_static {
            body.world_barycenter = body.local_to_world.transform_point3(body.barycenter);
            return;
        }
        if body.particle_count() == 0 {
            return;
        }
        let a = covariance_sums[body.first as usize];
        let rotation = extract_rotation(&a, body.rotation(), ROTATION_ITERATIONS);
        body.local_to_world = Mat4::from_rotation_translation(
            rotation,
            body.world_barycenter - rotation * body.barycenter,
        );
    });
}

/// Place every particle at `rotation * r_local + world_barycenter`.
pub fn write_back(bodies: &[RigidBodyData], particles: &mut [RigidBodyParticle]) {
    let rotations: Vec<Quat> = bodies.iter().map(RigidBodyData::rotation).collect();
    particles.par_iter_mut().for_each(|p| {
        let b = p.body as usize;
        let (Some(body), Some(rotation)) = (bodies.get(b), rotations.get(b)) else {
            return;
        };
        p.r_world = *rotation * p.r_local;
        p.pos_world = p.r_world + body.world_barycenter;
    });
}

/// Rotational part of `a` by iterative quaternion refinement, warm-started
/// from `q` (Müller et al. 2016). Degenerate `a` leaves `q` unchanged.
pub fn extract_rotation(a: &Mat3, mut q: Quat, max_iterations: usize) -> Quat {
    for _ in 0..max_iterations {
        let r = Mat3::from_quat(q);
        let torque = r.x_axis.cross(a.x_axis) + r.y_axis.cross(a.y_axis) + r.z_axis.cross(a.z_axis);
        let alignment = r.x_axis.dot(a.x_axis) + r.y_axis.dot(a.y_axis) + r.z_axis.dot(a.z_axis);
        let omega = torque / (alignment.abs() + 1e-9);
        let angle = omega.length();
        if angle < 1e-9 {
            break;
        }
        q = (Quat::from_axis_angle(omega / angle, angle) * q).normalize();
    }
    q
}

fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// In-place tree sum over each body's particle range; the total ends up in
/// the body's first slot. An odd element out is carried into the next round.
///
/// Body ranges must be contiguous and in order, as the registry builds them.
fn segmented_reduce<T>(values: &mut [T], bodies: &[RigidBodyData], max_body_particles: usize)
where
    T: Copy + Send + Sync + std::ops::AddAssign,
{
    let mut segments = Vec::with_capacity(bodies.len());
    let mut rest = values;
    for body in bodies {
        let len = body.reduction_len().min(rest.len());
        let (segment, tail) = std::mem::take(&mut rest).split_at_mut(len);
        segments.push(segment);
        rest = tail;
    }

    let mut stride = 1;
    while stride < max_body_particles {
        segments.par_iter_mut().for_each(|segment| {
            segment.chunks_mut(2 * stride).for_each(|pair| {
                if pair.len() > stride {
                    let partial = pair[stride];
                    pair[0] += partial;
                }
            });
        });
        stride *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(first: i32, count: i32) -> RigidBodyData {
        RigidBodyData {
            first,
            last: first + count - 1,
            local_to_world: Mat4::IDENTITY,
            barycenter: Vec3::ZERO,
            world_barycenter: Vec3::ZERO,
            mass: 1.0,
            sum_border: first + count - 1,
            is_static: false,
        }
    }

    #[test]
    fn test_segmented_reduce_handles_odd_counts() {
        let bodies = [body(0, 7), body(7, 1), body(8, 0), body(8, 4)];
        let mut values: Vec<f32> = (1..=12).map(|v| v as f32).collect();
        segmented_reduce(&mut values, &bodies, 7);
        assert_eq!(values[0], (1..=7).sum::<i32>() as f32);
        assert_eq!(values[7], 8.0);
        assert_eq!(values[8], (9..=12).sum::<i32>() as f32);
    }

    #[test]
    fn test_extract_rotation_recovers_known_rotation() {
        let target = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -0.5, 0.6);
        let offsets = [Vec3::X, Vec3::Y * 2.0, Vec3::Z * 0.5, Vec3::new(1.0, -1.0, 0.3)];
        let a = offsets
            .iter()
            .fold(Mat3::ZERO, |acc, &r| acc + outer(target * r, r));
        let q = extract_rotation(&a, Quat::IDENTITY, 100);
        assert!(q.angle_between(target) < 1e-3, "angle {}", q.angle_between(target));
    }

    #[test]
    fn test_extract_rotation_degenerate_keeps_guess() {
        let guess = Quat::from_rotation_x(0.5);
        let q = extract_rotation(&Mat3::ZERO, guess, 10);
        assert!(q.angle_between(guess) < 1e-6);
    }
}
