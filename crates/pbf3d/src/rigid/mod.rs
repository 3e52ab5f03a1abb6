//! Rigid bodies represented as clusters of voxel particles.
//!
//! Setup runs once per body: classify -> voxelize -> extract particles, then
//! the registry packs every body into one contiguous particle array. Each step
//! the solver keeps those clusters rigid with shape matching.

pub mod body;
pub mod registry;
pub mod shape_matching;

pub use body::{RigidBody, RigidBodyDesc, RigidBodyParticle};
pub use registry::{RigidBodyData, RigidBodyManager, RigidBodySet};
pub use shape_matching::{extract_rotation, ShapeMatcher};
