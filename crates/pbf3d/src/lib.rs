//! Position Based Fluids with voxelized rigid body coupling.
//!
//! Fluid incompressibility is enforced with iterative density constraints
//! (Macklin & Müller 2013) over a uniform hash grid rebuilt every step with a
//! bitonic sort. Rigid bodies are voxelized into interior particles that take
//! part in the fluid solve and are kept rigid by shape matching.
//!
//! Setup runs in dependency order: mesh classifier -> voxelizer -> particle
//! extraction -> registry -> solver.
//!
//! # Example
//!
//! ```
//! use pbf3d::{PbfParams, PbfSolver, RigidBodyDesc, RigidBodyManager, TriMesh};
//! use glam::Vec3;
//!
//! let mut bodies = RigidBodyManager::new();
//! bodies.add(RigidBodyDesc {
//!     mesh: Some(TriMesh::cuboid(Vec3::ZERO, Vec3::ONE)),
//!     voxel_size: 0.5,
//!     translation: Vec3::new(8.0, 4.0, 8.0),
//!     ..Default::default()
//! });
//! bodies.init();
//!
//! let params = PbfParams {
//!     domain_max: Vec3::splat(16.0),
//!     ..Default::default()
//! };
//! let fluid = pbf3d::seed::lattice_block(Vec3::splat(2.0), Vec3::splat(5.0), 1.0);
//! let mut solver = PbfSolver::new(params, &fluid, bodies.build_global_arrays()).unwrap();
//!
//! solver.step();
//! assert!(solver.rigid_particle_count() > 0);
//! assert_eq!(solver.live_count(), fluid.len() + solver.rigid_particle_count());
//! ```

pub mod accel;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod injection;
pub mod kernels;
pub mod mesh;
pub mod params;
pub mod particle;
pub mod rigid;
pub mod seed;
pub mod serde_utils;
pub mod solver;
pub mod sort;
pub mod test_geometry;
pub mod voxel;

pub use accel::{BvhStats, MeshClassifier};
pub use error::{PbfError, Result};
pub use geometry::{Aabb, Triangle};
pub use glam::{Mat4, Quat, Vec3};
pub use grid::{GridCell, SpatialGrid};
pub use injection::SplashInjection;
pub use kernels::KernelCoefficients;
pub use mesh::TriMesh;
pub use params::{ParticleCountMode, PbfParams};
pub use particle::Particle;
pub use rigid::{
    RigidBody, RigidBodyData, RigidBodyDesc, RigidBodyManager, RigidBodyParticle, RigidBodySet,
};
pub use solver::{FrameMetrics, PbfSolver, Stage};
pub use sort::CellParticlePair;
pub use test_geometry::{TestBox, TestSphere};
pub use voxel::{MeshVoxel, Voxel};
