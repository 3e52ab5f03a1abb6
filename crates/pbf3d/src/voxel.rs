//! Voxelization of a closed mesh into a lattice with an approximate signed
//! distance field.
//!
//! Distances are measured to the nearest triangle centroid, which is coarse
//! but only runs once at setup. Sign convention: negative inside the mesh.

use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;

use crate::accel::MeshClassifier;
use crate::geometry::Aabb;

/// One lattice sample in mesh-local space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Voxel {
    /// Cell center
    pub position: Vec3,
    /// Signed distance to the nearest triangle centroid (negative inside)
    pub distance: f32,
    /// Unit direction toward that centroid
    pub gradient: Vec3,
    pub inside: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MeshVoxel {
    bounds: Aabb,
    /// Cell size in mesh-local units
    voxel_size: f32,
    scale: f32,
    dims: UVec3,
    voxels: Vec<Voxel>,
}

impl MeshVoxel {
    /// Voxelize the classifier's mesh so that cells are `world_voxel_size`
    /// wide after the body's uniform `scale` is applied.
    ///
    /// Returns an empty lattice when the classifier is unbuilt or the sizes
    /// are unusable.
    pub fn build(classifier: &MeshClassifier, world_voxel_size: f32, scale: f32) -> Self {
        if !classifier.is_built() {
            log::warn!("MeshVoxel: classifier not built, no voxels generated");
            return Self::default();
        }
        if !(world_voxel_size > 0.0 && world_voxel_size.is_finite() && scale > 0.0 && scale.is_finite()) {
            log::warn!(
                "MeshVoxel: invalid voxel size {} or scale {}, no voxels generated",
                world_voxel_size,
                scale
            );
            return Self::default();
        }

        let bounds = classifier.bounding_box();
        let voxel_size = world_voxel_size / scale;
        let dims = (bounds.extent() / voxel_size).ceil().as_uvec3();

        let mut lattice = Self {
            bounds,
            voxel_size,
            scale,
            dims,
            voxels: Vec::new(),
        };

        let centroids: Vec<Vec3> = classifier.triangles().iter().map(|t| t.centroid()).collect();
        let count = lattice.len();
        lattice.voxels = (0..count)
            .into_par_iter()
            .map(|idx| {
                let position = lattice.position_of(lattice.coord_of(idx));
                let inside = classifier.point_inside(position);

                let mut distance = f32::INFINITY;
                let mut gradient = Vec3::ZERO;
                for &c in &centroids {
                    let d = c.distance(position);
                    if d < distance {
                        distance = d;
                        gradient = (c - position).normalize_or_zero();
                    }
                }
                if inside {
                    distance = -distance;
                }

                Voxel {
                    position,
                    distance,
                    gradient,
                    inside,
                }
            })
            .collect();

        log::info!(
            "MeshVoxel: {}x{}x{} lattice, {} inside, cell {:.4} (local)",
            dims.x,
            dims.y,
            dims.z,
            lattice.inside_count(),
            voxel_size
        );
        lattice
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Lattice cell count.
    pub fn len(&self) -> usize {
        (self.dims.x * self.dims.y * self.dims.z) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inside_count(&self) -> usize {
        self.voxels.iter().filter(|v| v.inside).count()
    }

    /// Linear index to lattice coordinate (x fastest). Out of range gives zero.
    pub fn coord_of(&self, idx: usize) -> IVec3 {
        if idx >= self.len() {
            return IVec3::ZERO;
        }
        let (dx, dy) = (self.dims.x as usize, self.dims.y as usize);
        IVec3::new(
            (idx % dx) as i32,
            (idx / dx % dy) as i32,
            (idx / (dx * dy)) as i32,
        )
    }

    pub fn index_of(&self, coord: IVec3) -> Option<usize> {
        if !self.in_lattice(coord) {
            return None;
        }
        let c = coord.as_uvec3();
        Some((c.x + c.y * self.dims.x + c.z * self.dims.x * self.dims.y) as usize)
    }

    /// Local-space cell center. Out of range gives zero.
    pub fn position_of(&self, coord: IVec3) -> Vec3 {
        if !self.in_lattice(coord) {
            return Vec3::ZERO;
        }
        self.bounds.min + (coord.as_vec3() + 0.5) * self.voxel_size
    }

    fn in_lattice(&self, coord: IVec3) -> bool {
        coord.cmpge(IVec3::ZERO).all() && coord.as_uvec3().cmplt(self.dims).all()
    }
}
