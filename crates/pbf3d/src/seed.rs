//! Initial fluid placement.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geometry::Aabb;

/// Shrink a box by `fraction` of its extent on every side.
pub fn shrink(aabb: &Aabb, fraction: f32) -> Aabb {
    let margin = aabb.extent() * fraction;
    Aabb::new(aabb.min + margin, aabb.max - margin)
}

/// `count` uniformly random positions inside `region`, reproducible from `seed`.
pub fn random_in_box(region: &Aabb, count: usize, seed: u64) -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    let extent = region.extent();
    (0..count)
        .map(|_| region.min + Vec3::new(rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>()) * extent)
        .collect()
}

/// Regular lattice filling `[min, max]` with the given spacing, x fastest.
pub fn lattice_block(min: Vec3, max: Vec3, spacing: f32) -> Vec<Vec3> {
    if !(spacing > 0.0) {
        return Vec::new();
    }
    let counts = ((max - min) / spacing).floor().as_uvec3() + 1;
    let mut positions = Vec::with_capacity((counts.x * counts.y * counts.z) as usize);
    for k in 0..counts.z {
        for j in 0..counts.y {
            for i in 0..counts.x {
                positions.push(min + Vec3::new(i as f32, j as f32, k as f32) * spacing);
            }
        }
    }
    positions
}
