//! Hash, sort and cell-table properties over random particle sets.

use glam::Vec3;
use pbf3d::sort::bitonic_sort;
use pbf3d::{Aabb, CellParticlePair, SpatialGrid};
use proptest::prelude::*;

const H: f32 = 1.0;

fn domain() -> Aabb {
    Aabb::new(Vec3::ZERO, Vec3::new(10.0, 6.0, 8.0))
}

/// Hash `live` positions into a power-of-two pair buffer and sort it.
fn hash_and_sort(grid: &SpatialGrid, positions: &[Vec3], live: usize) -> Vec<CellParticlePair> {
    let len = positions.len().next_power_of_two();
    let mut pairs: Vec<_> = (0..len as u32)
        .map(|i| match positions.get(i as usize) {
            Some(&p) if (i as usize) < live => {
                CellParticlePair::new(grid.cell_index(grid.world_to_cell(p)), i)
            }
            _ => CellParticlePair::inactive(i),
        })
        .collect();
    let mut scratch = Vec::new();
    bitonic_sort(&mut pairs, &mut scratch, live.next_power_of_two().min(len));
    pairs
}

fn positions_strategy() -> impl Strategy<Value = Vec<Vec3>> {
    prop::collection::vec((0.0f32..10.0, 0.0f32..6.0, 0.0f32..8.0), 1..300)
        .prop_map(|v| v.into_iter().map(|(x, y, z)| Vec3::new(x, y, z)).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sorted_pairs_are_ordered_and_complete(positions in positions_strategy(), live_frac in 0.0f32..=1.0) {
        let live = ((positions.len() as f32 * live_frac) as usize).min(positions.len());
        let grid = SpatialGrid::new(domain(), 2.0 * H);
        let pairs = hash_and_sort(&grid, &positions, live);

        prop_assert!(pairs.windows(2).all(|w| w[0].key() < w[1].key()));
        // Every particle index appears exactly once
        let mut seen: Vec<u32> = pairs.iter().map(|p| p.particle).collect();
        seen.sort_unstable();
        prop_assert!(seen.iter().enumerate().all(|(i, &p)| p as usize == i));
        // Live pairs first; inactive ones trail in index order
        prop_assert!(pairs[..live].iter().all(|p| !p.is_inactive()));
        for (k, pair) in pairs.iter().enumerate().skip(live) {
            prop_assert!(pair.is_inactive());
            prop_assert_eq!(pair.particle as usize, k);
        }
    }

    #[test]
    fn grid_neighbors_match_brute_force(positions in positions_strategy()) {
        let live = positions.len();
        let mut grid = SpatialGrid::new(domain(), 2.0 * H);
        let pairs = hash_and_sort(&grid, &positions, live);
        grid.clear();
        grid.build(&pairs);

        let sorted: Vec<Vec3> = pairs[..live].iter().map(|p| positions[p.particle as usize]).collect();

        // Cell runs are exact: every live sorted index lies in its own cell's run
        for (k, pair) in pairs[..live].iter().enumerate() {
            let cell = grid.cell(pair.cell);
            prop_assert!(cell.range().contains(&k));
        }

        for (i, &pi) in sorted.iter().enumerate() {
            let mut found: Vec<usize> = Vec::new();
            grid.for_each_neighbor(grid.world_to_cell(pi), |j| {
                if pi.distance(sorted[j]) < H {
                    found.push(j);
                }
            });
            found.sort_unstable();

            let expected: Vec<usize> = (0..live).filter(|&j| pi.distance(sorted[j]) < H).collect();
            prop_assert_eq!(found, expected, "particle {}", i);
        }
    }
}

#[test]
fn test_rebuild_leaves_no_stale_cells() {
    let mut grid = SpatialGrid::new(domain(), 2.0 * H);
    let first = [Vec3::new(1.0, 1.0, 1.0), Vec3::new(9.0, 5.0, 7.0)];
    let pairs = hash_and_sort(&grid, &first, 2);
    grid.clear();
    grid.build(&pairs);
    let old_cell = pairs[1].cell;
    assert!(!grid.cell(old_cell).is_empty());

    let second = [Vec3::new(1.0, 1.0, 1.0), Vec3::new(1.5, 1.5, 1.5)];
    let pairs = hash_and_sort(&grid, &second, 2);
    grid.clear();
    grid.build(&pairs);
    assert!(grid.cell(old_cell).is_empty());
    let occupied = grid.cells().iter().filter(|c| !c.is_empty()).count();
    assert_eq!(occupied, 1);
}
