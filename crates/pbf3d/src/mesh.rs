//! Triangle mesh input: a position array plus triangle index triples.

use glam::Vec3;

use crate::error::{PbfError, Result};
use crate::geometry::{Aabb, Triangle};

/// Indexed triangle mesh in the body's local space.
#[derive(Clone, Debug, Default)]
pub struct TriMesh {
    positions: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Build a mesh, rejecting triangles that reference missing vertices.
    pub fn new(positions: Vec<Vec3>, indices: Vec<[u32; 3]>) -> Result<Self> {
        let vertex_count = positions.len();
        for (triangle, tri) in indices.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(PbfError::MeshIndexOutOfRange {
                    triangle,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(Self { positions, indices })
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle(&self, i: usize) -> Triangle {
        let [a, b, c] = self.indices[i];
        Triangle::new(
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        )
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.indices.len()).map(move |i| self.triangle(i))
    }

    /// Bounds of the vertex array (not just referenced vertices).
    pub fn bounds(&self) -> Aabb {
        if self.positions.is_empty() {
            return Aabb::ZERO;
        }
        Aabb::from_points(&self.positions)
    }

    /// Signed enclosed volume; positive for outward-wound closed meshes.
    pub fn signed_volume(&self) -> f32 {
        self.triangles()
            .map(|t| t.points[0].dot(t.points[1].cross(t.points[2])) / 6.0)
            .sum()
    }

    /// Axis-aligned box with outward winding, two triangles per face.
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        let corner = |i: u32| {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            center + sign * half_extents
        };
        let positions = (0..8).map(corner).collect();
        let indices = vec![
            [0, 4, 6],
            [0, 6, 2],
            [1, 3, 7],
            [1, 7, 5],
            [0, 1, 5],
            [0, 5, 4],
            [2, 6, 7],
            [2, 7, 3],
            [0, 2, 3],
            [0, 3, 1],
            [4, 5, 7],
            [4, 7, 6],
        ];
        Self { positions, indices }
    }

    /// Latitude/longitude sphere with poles on the y axis.
    ///
    /// `segments` is clamped to at least 3 and `rings` to at least 2.
    pub fn uv_sphere(center: Vec3, radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);

        let mut positions = Vec::with_capacity((segments * (rings - 1) + 2) as usize);
        positions.push(center + Vec3::Y * radius);
        for i in 1..rings {
            let theta = std::f32::consts::PI * i as f32 / rings as f32;
            let (ring_radius, y) = (radius * theta.sin(), radius * theta.cos());
            for j in 0..segments {
                let phi = std::f32::consts::TAU * j as f32 / segments as f32;
                positions.push(center + Vec3::new(ring_radius * phi.cos(), y, ring_radius * phi.sin()));
            }
        }
        let bottom = positions.len() as u32;
        positions.push(center - Vec3::Y * radius);

        let ring_vertex = |i: u32, j: u32| 1 + (i - 1) * segments + (j % segments);
        let mut indices = Vec::with_capacity((2 * segments * (rings - 1)) as usize);
        for j in 0..segments {
            indices.push([0, ring_vertex(1, j + 1), ring_vertex(1, j)]);
        }
        for i in 1..rings - 1 {
            for j in 0..segments {
                let a = ring_vertex(i, j);
                let b = ring_vertex(i, j + 1);
                let c = ring_vertex(i + 1, j);
                let d = ring_vertex(i + 1, j + 1);
                indices.push([a, b, d]);
                indices.push([a, d, c]);
            }
        }
        for j in 0..segments {
            indices.push([ring_vertex(rings - 1, j), ring_vertex(rings - 1, j + 1), bottom]);
        }
        Self { positions, indices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_index() {
        let err = TriMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 3]]);
        assert!(matches!(
            err,
            Err(PbfError::MeshIndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_cuboid_volume_is_positive() {
        let mesh = TriMesh::cuboid(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 0.5, 2.0));
        assert_eq!(mesh.triangle_count(), 12);
        // 2 * 1 * 4 = 8
        assert!((mesh.signed_volume() - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_uv_sphere_is_closed_and_outward() {
        let mesh = TriMesh::uv_sphere(Vec3::ZERO, 2.0, 24, 16);
        let exact = 4.0 / 3.0 * std::f32::consts::PI * 8.0;
        let volume = mesh.signed_volume();
        assert!(volume > 0.9 * exact && volume < exact, "volume {volume}");

        let b = mesh.bounds();
        assert!((b.max.y - 2.0).abs() < 1e-5);
        assert!((b.min.y + 2.0).abs() < 1e-5);
    }
}
