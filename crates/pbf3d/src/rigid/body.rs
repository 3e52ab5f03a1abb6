//! Rigid particle extraction from a voxelized mesh.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use crate::accel::MeshClassifier;
use crate::mesh::TriMesh;
use crate::voxel::MeshVoxel;

/// One interior voxel promoted to a simulation particle.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RigidBodyParticle {
    /// Offset from the body barycenter in the scaled rest frame
    pub r_local: Vec3,
    /// `r_local` rotated by the current body orientation
    pub r_world: Vec3,
    pub pos_world: Vec3,
    /// Rest-frame direction toward the nearest surface
    pub gradient: Vec3,
    /// Depth below the surface (always positive, particles are interior)
    pub distance: f32,
    /// Index of the owning body
    pub body: u32,
}

/// Everything needed to turn a mesh into a rigid body.
#[derive(Clone, Debug)]
pub struct RigidBodyDesc {
    pub mesh: Option<TriMesh>,
    /// World-space voxel (particle) spacing
    pub voxel_size: f32,
    pub translation: Vec3,
    pub rotation: Quat,
    /// Uniform scale applied to the mesh
    pub scale: f32,
    /// Mass of each particle
    pub particle_mass: f32,
    pub is_static: bool,
}

impl Default for RigidBodyDesc {
    fn default() -> Self {
        Self {
            mesh: None,
            voxel_size: 1.0,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
            particle_mass: 1.0,
            is_static: false,
        }
    }
}

/// A mesh-backed rigid body and the particles extracted from it.
#[derive(Clone, Debug)]
pub struct RigidBody {
    desc: RigidBodyDesc,
    voxels: MeshVoxel,
    /// Mean of the scaled interior voxel positions, in the rest frame
    barycenter: Vec3,
    particles: Vec<RigidBodyParticle>,
}

impl RigidBody {
    pub fn new(desc: RigidBodyDesc) -> Self {
        Self {
            desc,
            voxels: MeshVoxel::default(),
            barycenter: Vec3::ZERO,
            particles: Vec::new(),
        }
    }

    /// Voxelize the mesh and build this body's particles.
    ///
    /// A missing mesh or an empty voxelization leaves the body with no
    /// particles; it then never moves or collides.
    pub fn init(&mut self, body_index: u32) {
        self.particles.clear();
        self.barycenter = Vec3::ZERO;

        let Some(mesh) = &self.desc.mesh else {
            log::warn!("RigidBody {}: no mesh attached, body is inert", body_index);
            self.voxels = MeshVoxel::default();
            return;
        };

        let classifier = MeshClassifier::build(mesh);
        self.voxels = MeshVoxel::build(&classifier, self.desc.voxel_size, self.desc.scale);

        let scale = self.desc.scale;
        let interior: Vec<_> = self.voxels.voxels().iter().filter(|v| v.inside).collect();
        if interior.is_empty() {
            log::warn!("RigidBody {}: no interior voxels, body is inert", body_index);
            return;
        }

        self.barycenter =
            interior.iter().map(|v| v.position * scale).sum::<Vec3>() / interior.len() as f32;

        let local_to_world = self.local_to_world();
        self.particles = interior
            .iter()
            .map(|v| {
                let scaled = v.position * scale;
                let r_local = scaled - self.barycenter;
                RigidBodyParticle {
                    r_local,
                    r_world: self.desc.rotation * r_local,
                    pos_world: local_to_world.transform_point3(scaled),
                    gradient: v.gradient,
                    distance: v.distance.abs() * scale,
                    body: body_index,
                }
            })
            .collect();

        log::info!(
            "RigidBody {}: {} particles{}",
            body_index,
            self.particles.len(),
            if self.desc.is_static { " (static)" } else { "" }
        );
    }

    pub fn particles(&self) -> &[RigidBodyParticle] {
        &self.particles
    }

    pub fn voxels(&self) -> &MeshVoxel {
        &self.voxels
    }

    pub fn barycenter(&self) -> Vec3 {
        self.barycenter
    }

    pub fn is_static(&self) -> bool {
        self.desc.is_static
    }

    /// Per-particle mass, infinite for static bodies.
    pub fn mass(&self) -> f32 {
        if self.desc.is_static {
            f32::INFINITY
        } else {
            self.desc.particle_mass
        }
    }

    /// Maps the scaled rest frame to world space (scale is baked into the
    /// particle offsets, so it is not part of this transform).
    pub fn local_to_world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.desc.rotation, self.desc.translation)
    }
}
