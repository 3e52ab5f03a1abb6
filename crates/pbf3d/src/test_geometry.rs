//! Analytic shapes for tests and scenario setup.
//!
//! Each shape provides an exact signed distance (negative inside) and a mesh
//! approximation. [`winding_number`] gives an independent point-in-mesh test
//! to check the parity classifier against.

use glam::Vec3;

use crate::mesh::TriMesh;

#[derive(Clone, Copy, Debug)]
pub struct TestSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl TestSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn sdf(&self, p: Vec3) -> f32 {
        (p - self.center).length() - self.radius
    }

    pub fn mesh(&self, segments: u32, rings: u32) -> TriMesh {
        TriMesh::uv_sphere(self.center, self.radius, segments, rings)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TestBox {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl TestBox {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    /// Exact box distance: outside via the clamped offset, inside via the
    /// nearest face.
    pub fn sdf(&self, p: Vec3) -> f32 {
        let q = (p - self.center).abs() - self.half_extents;
        q.max(Vec3::ZERO).length() + q.max_element().min(0.0)
    }

    pub fn mesh(&self) -> TriMesh {
        TriMesh::cuboid(self.center, self.half_extents)
    }
}

/// Generalized winding number of `mesh` around `p` (Jacobson et al. 2013):
/// about 1 inside a closed outward-wound mesh, about 0 outside.
pub fn winding_number(mesh: &TriMesh, p: Vec3) -> f64 {
    let p = p.as_dvec3();
    let solid_angle: f64 = mesh
        .triangles()
        .map(|t| {
            let [a, b, c] = t.points.map(|v| v.as_dvec3() - p);
            let (la, lb, lc) = (a.length(), b.length(), c.length());
            let numerator = a.dot(b.cross(c));
            let denominator = la * lb * lc + a.dot(b) * lc + b.dot(c) * la + c.dot(a) * lb;
            2.0 * numerator.atan2(denominator)
        })
        .sum();
    solid_angle / (4.0 * std::f64::consts::PI)
}

/// Inside test built on [`winding_number`], independent of winding sign.
pub fn winding_inside(mesh: &TriMesh, p: Vec3) -> bool {
    winding_number(mesh, p).abs() > 0.5
}
