//! Bitonic sorting network over (cell id, particle index) pairs.
//!
//! The network is input independent: a fixed sequence of compare-exchange
//! passes, each one a full data-parallel map. Blocks smaller than
//! [`SORT_LOCAL_SIZE`] are sorted in place first; every wider merge pass then
//! reads one buffer and writes the other.

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use crate::constants::{SENTINEL_CELL, SORT_LOCAL_SIZE};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct CellParticlePair {
    pub cell: u32,
    pub particle: u32,
}

impl CellParticlePair {
    pub fn new(cell: u32, particle: u32) -> Self {
        Self { cell, particle }
    }

    /// Placeholder for a particle that is not live.
    pub fn inactive(particle: u32) -> Self {
        Self::new(SENTINEL_CELL, particle)
    }

    pub fn is_inactive(&self) -> bool {
        self.cell == SENTINEL_CELL
    }

    /// Cell first, particle index as tie-break. Inactive particles therefore
    /// keep their relative order at the tail.
    #[inline]
    pub fn key(&self) -> u64 {
        (u64::from(self.cell) << 32) | u64::from(self.particle)
    }
}

/// Sort `pairs[..len]` ascending by key. `len` must be a power of two.
///
/// The result is left in `pairs`; `scratch` is the ping-pong partner and is
/// resized as needed. Entries past `len` are not touched.
pub fn bitonic_sort(pairs: &mut Vec<CellParticlePair>, scratch: &mut Vec<CellParticlePair>, len: usize) {
    let len = len.min(pairs.len());
    if len < 2 {
        return;
    }
    debug_assert!(len.is_power_of_two(), "bitonic sort length {len} is not a power of two");

    // Swapping the two buffers must not disturb the untouched tail.
    scratch.resize(pairs.len(), CellParticlePair::default());
    scratch[len..].copy_from_slice(&pairs[len..]);

    sort_local_blocks(&mut pairs[..len]);

    let mut block = SORT_LOCAL_SIZE;
    while block <= len {
        let mut stride = block / 2;
        while stride > 0 {
            merge_pass(&pairs[..len], &mut scratch[..len], block, stride);
            std::mem::swap(pairs, scratch);
            stride /= 2;
        }
        block *= 2;
    }
}

/// All network stages with block size below `SORT_LOCAL_SIZE`, in place per
/// sub-block. Leaves alternating ascending/descending runs ready to merge.
fn sort_local_blocks(pairs: &mut [CellParticlePair]) {
    let local = SORT_LOCAL_SIZE.min(pairs.len());
    let last_block = (SORT_LOCAL_SIZE / 2).min(local);

    pairs
        .par_chunks_mut(local)
        .enumerate()
        .for_each(|(chunk, run)| {
            let base = chunk * local;
            let mut block = 2;
            while block <= last_block {
                let mut stride = block / 2;
                while stride > 0 {
                    for i in 0..run.len() {
                        let partner = i ^ stride;
                        if partner <= i || partner >= run.len() {
                            continue;
                        }
                        let ascending = (base + i) & block == 0;
                        if (run[i].key() > run[partner].key()) == ascending {
                            run.swap(i, partner);
                        }
                    }
                    stride /= 2;
                }
                block *= 2;
            }
        });
}

/// One compare-exchange pass: every lane picks the min or max of itself and
/// its partner `i ^ stride`.
fn merge_pass(src: &[CellParticlePair], dst: &mut [CellParticlePair], block: usize, stride: usize) {
    dst.par_iter_mut().enumerate().for_each(|(i, out)| {
        let partner = i ^ stride;
        let (a, b) = (src[i], src[partner]);
        let ascending = i & block == 0;
        let keep_min = ascending == (i < partner);
        *out = if (a.key() <= b.key()) == keep_min { a } else { b };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_sorted(pairs: &[CellParticlePair]) -> bool {
        pairs.windows(2).all(|w| w[0].key() <= w[1].key())
    }

    #[test]
    fn test_sorts_reversed_input() {
        for len in [2usize, 4, 8, 16, 32, 256] {
            let mut pairs: Vec<_> = (0..len as u32).rev().map(|i| CellParticlePair::new(i / 3, i)).collect();
            let mut scratch = Vec::new();
            bitonic_sort(&mut pairs, &mut scratch, len);
            assert!(is_sorted(&pairs), "len {len}");
        }
    }

    #[test]
    fn test_tail_beyond_len_is_untouched() {
        let mut pairs: Vec<_> = (0..16u32).map(|i| CellParticlePair::new(15 - i, i)).collect();
        pairs.extend((16..24u32).map(CellParticlePair::inactive));
        let tail = pairs[16..].to_vec();
        let mut scratch = Vec::new();
        bitonic_sort(&mut pairs, &mut scratch, 16);
        assert!(is_sorted(&pairs[..16]));
        assert_eq!(&pairs[16..], &tail[..]);
    }

    #[test]
    fn test_inactive_pairs_sort_last_in_index_order() {
        let mut pairs = vec![
            CellParticlePair::inactive(1),
            CellParticlePair::new(5, 3),
            CellParticlePair::inactive(0),
            CellParticlePair::new(2, 2),
        ];
        let mut scratch = Vec::new();
        bitonic_sort(&mut pairs, &mut scratch, 4);
        assert_eq!(
            pairs,
            vec![
                CellParticlePair::new(2, 2),
                CellParticlePair::new(5, 3),
                CellParticlePair::inactive(0),
                CellParticlePair::inactive(1),
            ]
        );
    }
}
