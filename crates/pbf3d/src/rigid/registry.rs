//! Packs every rigid body into one contiguous particle array plus per-body
//! metadata for the solver.

use glam::{Mat4, Quat, Vec3};

use super::body::{RigidBody, RigidBodyDesc, RigidBodyParticle};

/// Per-body record handed to the solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidBodyData {
    /// First particle index (inclusive)
    pub first: i32,
    /// Last particle index (inclusive); `last < first` for empty bodies
    pub last: i32,
    pub local_to_world: Mat4,
    /// Barycenter in the scaled rest frame
    pub barycenter: Vec3,
    pub world_barycenter: Vec3,
    /// Per-particle mass (infinite for static bodies)
    pub mass: f32,
    /// Upper bound for the segmented reductions over this body
    pub sum_border: i32,
    pub is_static: bool,
}

impl RigidBodyData {
    pub fn particle_count(&self) -> usize {
        (self.last - self.first + 1).max(0) as usize
    }

    /// Slots covered by the segmented reductions, up to `sum_border`.
    pub fn reduction_len(&self) -> usize {
        (self.sum_border - self.first + 1).max(0) as usize
    }

    pub fn particle_range(&self) -> std::ops::Range<usize> {
        let start = self.first.max(0) as usize;
        start..start + self.particle_count()
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.is_static || !self.mass.is_finite() || self.mass <= 0.0 {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    pub fn rotation(&self) -> Quat {
        let (_, rotation, _) = self.local_to_world.to_scale_rotation_translation();
        rotation.normalize()
    }

    /// Replace the pose, keeping the world barycenter in sync.
    pub fn set_pose(&mut self, translation: Vec3, rotation: Quat) {
        self.local_to_world = Mat4::from_rotation_translation(rotation, translation);
        self.world_barycenter = self.local_to_world.transform_point3(self.barycenter);
    }
}

/// Global rigid arrays consumed by the solver.
#[derive(Clone, Debug, Default)]
pub struct RigidBodySet {
    pub bodies: Vec<RigidBodyData>,
    pub particles: Vec<RigidBodyParticle>,
    pub max_body_particles: usize,
    pub has_static: bool,
}

impl RigidBodySet {
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RigidBodyManager {
    bodies: Vec<RigidBody>,
    max_particle_count: usize,
    has_static: bool,
}

impl RigidBodyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descs(descs: impl IntoIterator<Item = RigidBodyDesc>) -> Self {
        Self {
            bodies: descs.into_iter().map(RigidBody::new).collect(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, desc: RigidBodyDesc) -> usize {
        self.bodies.push(RigidBody::new(desc));
        self.bodies.len() - 1
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    /// Voxelize and extract every body, in registration order.
    pub fn init(&mut self) {
        for (i, body) in self.bodies.iter_mut().enumerate() {
            body.init(i as u32);
        }
        self.max_particle_count = self
            .bodies
            .iter()
            .map(|b| b.particles().len())
            .max()
            .unwrap_or(0);
        self.has_static = self.bodies.iter().any(RigidBody::is_static);

        log::info!(
            "RigidBodyManager: {} bodies, {} particles, largest body {}",
            self.bodies.len(),
            self.particle_count(),
            self.max_particle_count
        );
    }

    pub fn particle_count(&self) -> usize {
        self.bodies.iter().map(|b| b.particles().len()).sum()
    }

    pub fn max_particle_count(&self) -> usize {
        self.max_particle_count
    }

    pub fn has_static(&self) -> bool {
        self.has_static
    }

    /// Concatenate all bodies' particles, recording each body's range.
    pub fn build_global_arrays(&self) -> RigidBodySet {
        let mut bodies = Vec::with_capacity(self.bodies.len());
        let mut particles = Vec::with_capacity(self.particle_count());

        for body in &self.bodies {
            let first = particles.len() as i32;
            let last = first + body.particles().len() as i32 - 1;
            particles.extend_from_slice(body.particles());

            let local_to_world = body.local_to_world();
            bodies.push(RigidBodyData {
                first,
                last,
                local_to_world,
                barycenter: body.barycenter(),
                world_barycenter: local_to_world.transform_point3(body.barycenter()),
                mass: body.mass(),
                sum_border: last,
                is_static: body.is_static(),
            });
        }

        RigidBodySet {
            bodies,
            particles,
            max_body_particles: self.max_particle_count,
            has_static: self.has_static,
        }
    }
}
