//! Bounding volume tree over a mesh's triangles, used to classify points as
//! inside or outside a closed mesh.
//!
//! A point is inside when a ray cast from it toward `+z` crosses the surface
//! an odd number of times. The tree only narrows down which triangles the ray
//! can hit.

use crate::geometry::{Aabb, Triangle};
use crate::mesh::TriMesh;

/// Nodes holding this many triangles or fewer become leaves.
pub const LEAF_TRIANGLES: usize = 5;

/// Axis the parity ray travels along.
pub const RAY_AXIS: usize = 2;

#[derive(Debug)]
enum BvhNode {
    Leaf {
        bounds: Aabb,
        triangles: Vec<u32>,
    },
    Split {
        bounds: Aabb,
        children: Box<[BvhNode; 2]>,
    },
}

impl BvhNode {
    fn bounds(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Split { bounds, .. } => bounds,
        }
    }
}

/// Tree shape, reported after a build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BvhStats {
    pub max_depth: usize,
    pub node_count: usize,
    pub leaf_count: usize,
}

/// Point-in-mesh classifier. An unbuilt classifier answers every query with
/// "outside" and a zero bounding box.
#[derive(Debug, Default)]
pub struct MeshClassifier {
    triangles: Vec<Triangle>,
    root: Option<BvhNode>,
    stats: BvhStats,
}

impl MeshClassifier {
    /// Build the tree. Meshes without triangles leave the classifier unbuilt.
    pub fn build(mesh: &TriMesh) -> Self {
        if mesh.is_empty() {
            log::warn!("MeshClassifier: mesh has no triangles, classifier left unbuilt");
            return Self::default();
        }

        let triangles: Vec<Triangle> = mesh.triangles().collect();
        let centroids: Vec<_> = triangles.iter().map(Triangle::centroid).collect();
        let mut stats = BvhStats::default();

        let all = (0..triangles.len() as u32).collect();
        let root = build_node(&triangles, &centroids, all, mesh.bounds(), 0, &mut stats);

        log::info!(
            "MeshClassifier: {} triangles, {} nodes, {} leaves, max depth {}",
            triangles.len(),
            stats.node_count,
            stats.leaf_count,
            stats.max_depth
        );

        Self {
            triangles,
            root: Some(root),
            stats,
        }
    }

    pub fn is_built(&self) -> bool {
        self.root.is_some()
    }

    pub fn stats(&self) -> BvhStats {
        self.stats
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn bounding_box(&self) -> Aabb {
        self.root.as_ref().map_or(Aabb::ZERO, |root| *root.bounds())
    }

    /// Number of triangles a `+z` ray from `p` passes through.
    pub fn crossing_count(&self, p: glam::Vec3) -> usize {
        let Some(root) = &self.root else {
            return 0;
        };

        let mut count = 0;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !node.bounds().covers(p, RAY_AXIS) {
                continue;
            }
            match node {
                BvhNode::Leaf { triangles, .. } => {
                    count += triangles
                        .iter()
                        .filter(|&&t| self.triangles[t as usize].covers(p, RAY_AXIS))
                        .count();
                }
                BvhNode::Split { children, .. } => {
                    stack.push(&children[0]);
                    stack.push(&children[1]);
                }
            }
        }
        count
    }

    pub fn point_inside(&self, p: glam::Vec3) -> bool {
        self.crossing_count(p) % 2 == 1
    }
}

fn build_node(
    triangles: &[Triangle],
    centroids: &[glam::Vec3],
    mut members: Vec<u32>,
    bounds: Aabb,
    depth: usize,
    stats: &mut BvhStats,
) -> BvhNode {
    stats.node_count += 1;
    stats.max_depth = stats.max_depth.max(depth);

    if members.len() <= LEAF_TRIANGLES {
        stats.leaf_count += 1;
        return BvhNode::Leaf {
            bounds,
            triangles: members,
        };
    }

    // Equal-count split on sorted centroids, not a spatial median.
    let axis = bounds.longest_axis();
    members.sort_by(|&a, &b| centroids[a as usize][axis].total_cmp(&centroids[b as usize][axis]));
    let right = members.split_off(members.len() / 2);
    let left = members;

    let child_bounds = |set: &[u32]| {
        set.iter()
            .fold(Aabb::EMPTY, |acc, &t| acc.union(&triangles[t as usize].bounds()))
    };
    let (left_bounds, right_bounds) = (child_bounds(&left), child_bounds(&right));

    let children = Box::new([
        build_node(triangles, centroids, left, left_bounds, depth + 1, stats),
        build_node(triangles, centroids, right, right_bounds, depth + 1, stats),
    ]);
    BvhNode::Split { bounds, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_unbuilt_classifier_is_inert() {
        let classifier = MeshClassifier::build(&TriMesh::default());
        assert!(!classifier.is_built());
        assert!(!classifier.point_inside(Vec3::ZERO));
        assert_eq!(classifier.bounding_box(), Aabb::ZERO);
    }

    #[test]
    fn test_small_mesh_is_single_leaf() {
        let tri = TriMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 2]]).unwrap();
        let classifier = MeshClassifier::build(&tri);
        assert_eq!(
            classifier.stats(),
            BvhStats {
                max_depth: 0,
                node_count: 1,
                leaf_count: 1
            }
        );
    }

    #[test]
    fn test_cube_inside_outside() {
        let mesh = TriMesh::cuboid(Vec3::ZERO, Vec3::ONE);
        let classifier = MeshClassifier::build(&mesh);
        // 12 -> 6 + 6 -> four leaves of 3
        assert_eq!(
            classifier.stats(),
            BvhStats {
                max_depth: 2,
                node_count: 7,
                leaf_count: 4
            }
        );
        assert!(classifier.point_inside(Vec3::new(0.1, 0.2, 0.3)));
        assert!(classifier.point_inside(Vec3::new(-0.9, 0.9, -0.9)));
        assert!(!classifier.point_inside(Vec3::new(1.5, 0.0, 0.0)));
        assert!(!classifier.point_inside(Vec3::new(0.0, 0.0, 1.5)));
        assert!(!classifier.point_inside(Vec3::new(0.0, 0.0, -1.5)));
    }

    #[test]
    fn test_cube_diagonal_points_inside() {
        // Points on the face diagonals as seen along z
        let classifier = MeshClassifier::build(&TriMesh::cuboid(Vec3::ZERO, Vec3::ONE));
        for s in [-0.75_f32, -0.25, 0.25, 0.75] {
            assert!(classifier.point_inside(Vec3::new(s, s, 0.0)), "({s}, {s})");
            assert!(classifier.point_inside(Vec3::new(s, -s, 0.5)), "({s}, {})", -s);
        }
    }

    #[test]
    fn test_child_bounds_recomputed_from_members() {
        let mesh = TriMesh::uv_sphere(Vec3::ZERO, 1.0, 16, 8);
        let classifier = MeshClassifier::build(&mesh);
        let Some(BvhNode::Split { children, bounds }) = &classifier.root else {
            panic!("sphere should split at the root");
        };
        for child in children.iter() {
            let b = child.bounds();
            assert!(b.min.cmpge(bounds.min - 1e-6).all());
            assert!(b.max.cmple(bounds.max + 1e-6).all());
        }
        let s = classifier.stats();
        assert!(s.leaf_count > 1 && s.node_count == 2 * s.leaf_count - 1);
    }
}
