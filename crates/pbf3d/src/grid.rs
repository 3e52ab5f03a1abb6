//! Uniform spatial hash grid over the fluid domain.
//!
//! Rebuilt from scratch every step: particles are hashed to cells, the pairs
//! are sorted by cell, and each cell records the (start, end) run of sorted
//! indices that fall inside it.

use bytemuck::{Pod, Zeroable};
use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;

use crate::constants::PARTICLE_BLOCK_SIZE;
use crate::geometry::Aabb;
use crate::sort::CellParticlePair;

/// Inclusive run `[start, end]` of sorted pair indices. Empty when
/// `start > end`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GridCell {
    pub start: u32,
    pub end: u32,
}

impl GridCell {
    pub const EMPTY: Self = Self {
        start: u32::MAX,
        end: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn range(&self) -> std::ops::RangeInclusive<usize> {
        if self.is_empty() {
            // An empty inclusive range
            return 1..=0;
        }
        self.start as usize..=self.end as usize
    }
}

impl Default for GridCell {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Clone, Debug)]
pub struct SpatialGrid {
    origin: Vec3,
    cell_width: f32,
    dims: UVec3,
    /// Padded to a whole number of blocks; the padding is always empty
    cells: Vec<GridCell>,
}

impl SpatialGrid {
    pub fn new(domain: Aabb, cell_width: f32) -> Self {
        let dims = (domain.extent() / cell_width).ceil().as_uvec3().max(UVec3::ONE);
        let cell_count = (dims.x * dims.y * dims.z) as usize;
        let padded = cell_count.div_ceil(PARTICLE_BLOCK_SIZE) * PARTICLE_BLOCK_SIZE;
        Self {
            origin: domain.min,
            cell_width,
            dims,
            cells: vec![GridCell::EMPTY; padded],
        }
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Number of real cells (excluding padding).
    pub fn cell_count(&self) -> usize {
        (self.dims.x * self.dims.y * self.dims.z) as usize
    }

    /// The (start, end) table, including block padding.
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cell(&self, id: u32) -> GridCell {
        self.cells.get(id as usize).copied().unwrap_or(GridCell::EMPTY)
    }

    /// Cell containing `p`, clamped onto the grid.
    #[inline]
    pub fn world_to_cell(&self, p: Vec3) -> IVec3 {
        let c = ((p - self.origin) / self.cell_width).floor().as_ivec3();
        c.clamp(IVec3::ZERO, self.dims.as_ivec3() - IVec3::ONE)
    }

    #[inline]
    pub fn cell_in_bounds(&self, c: IVec3) -> bool {
        c.cmpge(IVec3::ZERO).all() && c.cmplt(self.dims.as_ivec3()).all()
    }

    /// Linear id, x fastest. Callers pass in-bounds coordinates.
    #[inline]
    pub fn cell_index(&self, c: IVec3) -> u32 {
        c.x as u32 + c.y as u32 * self.dims.x + c.z as u32 * self.dims.x * self.dims.y
    }

    pub fn clear(&mut self) {
        self.cells.par_iter_mut().for_each(|c| *c = GridCell::EMPTY);
    }

    /// Record the run of every occupied cell. `sorted` must be sorted by
    /// cell; inactive pairs at the tail are ignored.
    pub fn build(&mut self, sorted: &[CellParticlePair]) {
        let live = sorted.partition_point(|p| !p.is_inactive());
        let sorted = &sorted[..live];

        let starts: Vec<usize> = (0..live)
            .into_par_iter()
            .filter(|&i| i == 0 || sorted[i - 1].cell != sorted[i].cell)
            .collect();

        for (n, &start) in starts.iter().enumerate() {
            let end = starts.get(n + 1).copied().unwrap_or(live) - 1;
            if let Some(cell) = self.cells.get_mut(sorted[start].cell as usize) {
                *cell = GridCell {
                    start: start as u32,
                    end: end as u32,
                };
            }
        }
    }

    /// Visit every sorted index in the 3x3x3 block of cells around `center`.
    #[inline]
    pub fn for_each_neighbor(&self, center: IVec3, mut f: impl FnMut(usize)) {
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let c = center + IVec3::new(dx, dy, dz);
                    if !self.cell_in_bounds(c) {
                        continue;
                    }
                    for j in self.cells[self.cell_index(c) as usize].range() {
                        f(j);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid {
        SpatialGrid::new(Aabb::new(Vec3::ZERO, Vec3::new(10.0, 5.0, 2.4)), 2.4)
    }

    #[test]
    fn test_dims_round_up() {
        let g = grid();
        assert_eq!(g.dims(), UVec3::new(5, 3, 1));
        assert_eq!(g.cell_count(), 15);
        assert_eq!(g.cells().len(), PARTICLE_BLOCK_SIZE);
    }

    #[test]
    fn test_world_to_cell_clamps() {
        let g = grid();
        assert_eq!(g.world_to_cell(Vec3::new(-3.0, 1.0, 0.0)), IVec3::new(0, 0, 0));
        assert_eq!(g.world_to_cell(Vec3::new(10.0, 5.0, 2.4)), IVec3::new(4, 2, 0));
        assert_eq!(g.cell_index(IVec3::new(4, 2, 0)), 14);
    }

    #[test]
    fn test_build_records_runs() {
        let mut g = grid();
        let sorted = vec![
            CellParticlePair::new(0, 4),
            CellParticlePair::new(0, 7),
            CellParticlePair::new(3, 1),
            CellParticlePair::new(9, 0),
            CellParticlePair::new(9, 2),
            CellParticlePair::new(9, 3),
            CellParticlePair::inactive(5),
            CellParticlePair::inactive(6),
        ];
        g.build(&sorted);
        assert_eq!(g.cell(0), GridCell { start: 0, end: 1 });
        assert_eq!(g.cell(3), GridCell { start: 2, end: 2 });
        assert_eq!(g.cell(9), GridCell { start: 3, end: 5 });
        assert!(g.cell(1).is_empty());

        g.clear();
        assert!(g.cells().iter().all(GridCell::is_empty));
    }

    #[test]
    fn test_neighbor_visit_covers_adjacent_cells() {
        let mut g = grid();
        let a = g.cell_index(IVec3::new(1, 1, 0));
        let b = g.cell_index(IVec3::new(2, 2, 0));
        let far = g.cell_index(IVec3::new(4, 0, 0));
        let mut sorted = vec![
            CellParticlePair::new(a, 0),
            CellParticlePair::new(b, 1),
            CellParticlePair::new(far, 2),
        ];
        sorted.sort_by_key(CellParticlePair::key);
        g.build(&sorted);

        let mut seen = Vec::new();
        g.for_each_neighbor(IVec3::new(1, 1, 0), |j| seen.push(sorted[j].particle));
        seen.sort();
        assert_eq!(seen, vec![0, 1]);
    }
}
