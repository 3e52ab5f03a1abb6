//! Axis-aligned boxes and triangles used by the mesh classifier and voxelizer.
//!
//! Inside/outside tests cast a ray from the query point toward `+axis`
//! (always z for the classifier). Boxes and triangles both project onto the
//! two remaining axes, and ties on shared edges are broken with a top-left
//! rule so a ray through an edge is counted exactly once.

use glam::{Vec2, Vec3};

/// Projected area below which a triangle is treated as edge-on to the ray.
pub const DEGENERATE_AREA: f32 = 1e-5;

/// Barycentric coordinate returned for edge-on triangles; never covers.
pub const NO_COVER: Vec3 = Vec3::new(-1.0, 1.0, 1.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const ZERO: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    /// Inverted box that any `grow` call will replace.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.grow(*p);
        }
        aabb
    }

    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Strictly longest axis; any tie picks z.
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x > e.y && e.x > e.z {
            0
        } else if e.y > e.x && e.y > e.z {
            1
        } else {
            2
        }
    }

    /// Can a ray cast from `p` toward `+axis` enter this box?
    ///
    /// The two projected axes are closed on both ends; along `axis` the point
    /// only needs to lie below `max`.
    pub fn covers(&self, p: Vec3, axis: usize) -> bool {
        (0..3).all(|i| {
            if i == axis {
                p[i] < self.max[i]
            } else {
                p[i] >= self.min[i] && p[i] <= self.max[i]
            }
        })
    }

    /// Closed containment on every axis.
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn clamp(&self, p: Vec3) -> Vec3 {
        p.clamp(self.min, self.max)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::ZERO
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub points: [Vec3; 3],
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { points: [a, b, c] }
    }

    pub fn centroid(&self) -> Vec3 {
        (self.points[0] + self.points[1] + self.points[2]) / 3.0
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.points)
    }

    /// Barycentric coordinates of `p` projected along `axis`.
    ///
    /// Returns [`NO_COVER`] when the triangle is edge-on to the projection.
    pub fn barycentric(&self, p: Vec3, axis: usize) -> Vec3 {
        match self.edge_weights(p, axis) {
            Some((w, area)) => w / area,
            None => NO_COVER,
        }
    }

    /// Does a ray from `p` toward `+axis` pass through this triangle?
    pub fn covers(&self, p: Vec3, axis: usize) -> bool {
        let Some((w, area)) = self.edge_weights(p, axis) else {
            return false;
        };
        // Orient everything counter-clockwise so the tie rule is consistent.
        let sign = area.signum();
        let w = w * sign;
        let q = self.projected(axis);
        for (i, wi) in w.to_array().into_iter().enumerate() {
            if wi < 0.0 {
                return false;
            }
            if wi == 0.0 {
                let edge = (q[(i + 2) % 3] - q[(i + 1) % 3]) * sign;
                if !is_top_left(edge) {
                    return false;
                }
            }
        }
        let bary = w / area.abs();
        let depth = bary.x * self.points[0][axis]
            + bary.y * self.points[1][axis]
            + bary.z * self.points[2][axis];
        p[axis] < depth
    }

    fn projected(&self, axis: usize) -> [Vec2; 3] {
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        self.points.map(|pt| Vec2::new(pt[u], pt[v]))
    }

    /// Unnormalized edge functions (one per opposite vertex) and the signed
    /// projected area, or `None` for edge-on triangles.
    fn edge_weights(&self, p: Vec3, axis: usize) -> Option<(Vec3, f32)> {
        let [a, b, c] = self.projected(axis);
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let q = Vec2::new(p[u], p[v]);

        let area = (b - a).perp_dot(c - a);
        if area.abs() < DEGENERATE_AREA {
            return None;
        }
        let w0 = (c - b).perp_dot(q - b);
        let w1 = (a - c).perp_dot(q - c);
        let w2 = (b - a).perp_dot(q - a);
        Some((Vec3::new(w0, w1, w2), area))
    }
}

/// Top-left fill rule for a counter-clockwise edge direction.
fn is_top_left(edge: Vec2) -> bool {
    edge.y < 0.0 || (edge.y == 0.0 && edge.x < 0.0)
}
