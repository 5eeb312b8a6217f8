//! Cell list algorithm for O(N) neighbour search
//!
//! Partitions the bounding box of a point set into a regular grid of bins at
//! least `radius` wide along every axis, so all points within `radius` of a
//! query lie in its bin or one of the (up to) 26 adjacent bins. Each bin keeps
//! its points as a singly linked list (`head` per bin, `next` per point).
//!
//! Periodicity is not handled here: callers insert periodic images as
//! ordinary points, so the stencil never wraps around the grid.

use crate::structure::Vec3;

/// Upper bound on the number of bins, relative to the number of points
const BINS_PER_POINT: usize = 8;
/// Bin count always allowed regardless of the point count
const MIN_BIN_BUDGET: usize = 1 << 12;

/// Cell list for spatial hashing
#[derive(Debug, Clone)]
pub struct CellList {
    /// Lower corner of the grid
    origin: Vec3,
    bin_width: Vec3,
    n_bins: [usize; 3],
    /// First point of each bin
    head: Vec<Option<usize>>,
    /// Next point in the same bin
    next: Vec<Option<usize>>,
    /// Linear bin of each point
    point_bins: Vec<usize>,
}

impl CellList {
    /// Build a cell list from coordinates
    ///
    /// # Arguments
    /// * `points` - Cartesian coordinates
    /// * `radius` - Minimum bin width, must be positive
    pub fn new(points: &[Vec3], radius: f64) -> Self {
        debug_assert!(radius > 0.0, "cell list radius must be positive");

        let (origin, extent) = bounding_box(points);

        let mut n_bins = [1usize; 3];
        for d in 0..3 {
            n_bins[d] = ((extent[d] / radius).floor() as usize).max(1);
        }
        cap_bin_count(&mut n_bins, points.len());

        let bin_width = Vec3::from_fn(|d, _| (extent[d] / n_bins[d] as f64).max(radius));
        let total = n_bins[0] * n_bins[1] * n_bins[2];

        let mut cell_list = Self {
            origin,
            bin_width,
            n_bins,
            head: vec![None; total],
            next: vec![None; points.len()],
            point_bins: Vec::with_capacity(points.len()),
        };

        for point in points {
            let bin = cell_list.bin_index(point);
            cell_list.point_bins.push(bin);
        }

        // reverse insertion keeps each bin's list in ascending point order
        for idx in (0..points.len()).rev() {
            let bin = cell_list.point_bins[idx];
            cell_list.next[idx] = cell_list.head[bin];
            cell_list.head[bin] = Some(idx);
        }

        cell_list
    }

    pub fn n_bins(&self) -> [usize; 3] {
        self.n_bins
    }

    /// Total number of bins in the grid
    pub fn nb_bins(&self) -> usize {
        self.head.len()
    }

    pub fn bin_width(&self) -> Vec3 {
        self.bin_width
    }

    /// Grid coordinates of a position, clamped to the grid
    pub fn bin_coords(&self, position: &Vec3) -> [usize; 3] {
        let mut coords = [0usize; 3];
        for d in 0..3 {
            let c = ((position[d] - self.origin[d]) / self.bin_width[d]).floor();
            coords[d] = if c <= 0.0 {
                0
            } else {
                (c as usize).min(self.n_bins[d] - 1)
            };
        }
        coords
    }

    /// Linear bin id of a position: `x + nx * (y + ny * z)`
    pub fn bin_index(&self, position: &Vec3) -> usize {
        self.linear_index(self.bin_coords(position))
    }

    /// Bin holding the point with the given index
    pub fn bin_of(&self, point: usize) -> usize {
        self.point_bins[point]
    }

    fn linear_index(&self, coords: [usize; 3]) -> usize {
        coords[0] + self.n_bins[0] * (coords[1] + self.n_bins[1] * coords[2])
    }

    fn grid_coords(&self, bin: usize) -> [usize; 3] {
        let nx = self.n_bins[0];
        let ny = self.n_bins[1];
        [bin % nx, (bin / nx) % ny, bin / (nx * ny)]
    }

    /// The bin itself and its adjacent bins, in ascending order
    ///
    /// 27 bins in the interior of the grid, fewer at its faces.
    pub fn neighbour_bins(&self, bin: usize) -> Vec<usize> {
        let c = self.grid_coords(bin);
        let lo = |d: usize| c[d].saturating_sub(1);
        let hi = |d: usize| (c[d] + 1).min(self.n_bins[d] - 1);

        let mut bins = Vec::with_capacity(27);
        for z in lo(2)..=hi(2) {
            for y in lo(1)..=hi(1) {
                for x in lo(0)..=hi(0) {
                    bins.push(self.linear_index([x, y, z]));
                }
            }
        }
        bins
    }

    /// Points stored in a bin, walking its linked list lazily
    pub fn atoms_in_bin(&self, bin: usize) -> BinIter<'_> {
        BinIter {
            next: &self.next,
            current: self.head.get(bin).copied().flatten(),
        }
    }

    /// Points in the bin of `point` and its adjacent bins, `point` included
    pub fn candidates(&self, point: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbour_bins(self.bin_of(point))
            .into_iter()
            .flat_map(move |bin| self.atoms_in_bin(bin))
    }
}

/// Iterator over the linked list of one bin
pub struct BinIter<'a> {
    next: &'a [Option<usize>],
    current: Option<usize>,
}

impl Iterator for BinIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let idx = self.current?;
        self.current = self.next[idx];
        Some(idx)
    }
}

fn bounding_box(points: &[Vec3]) -> (Vec3, Vec3) {
    if points.is_empty() {
        return (Vec3::zeros(), Vec3::zeros());
    }

    let mut min_coords = Vec3::repeat(f64::INFINITY);
    let mut max_coords = Vec3::repeat(f64::NEG_INFINITY);
    for p in points {
        min_coords = min_coords.inf(p);
        max_coords = max_coords.sup(p);
    }
    (min_coords, max_coords - min_coords)
}

/// Coarsen sparse grids so memory stays proportional to the point count
///
/// Counts are only ever lowered, so the width >= radius guarantee is kept.
/// The product is taken in `f64`: far apart points give per-axis counts
/// whose product does not fit in `usize`.
fn cap_bin_count(n_bins: &mut [usize; 3], nb_points: usize) {
    let budget = nb_points.saturating_mul(BINS_PER_POINT).max(MIN_BIN_BUDGET) as f64;
    let total: f64 = n_bins.iter().map(|&n| n as f64).product();
    if total <= budget {
        return;
    }

    // share the budget evenly, smallest axes first so they keep their bins
    let mut axes = [0usize, 1, 2];
    axes.sort_by_key(|&d| n_bins[d]);
    let mut remaining = budget;
    for (rank, &d) in axes.iter().enumerate() {
        let share = remaining.powf(1.0 / (3 - rank) as f64).floor().max(1.0);
        let n = (n_bins[d] as f64).min(share);
        n_bins[d] = n as usize;
        remaining = (remaining / n).max(1.0);
    }
    log::trace!("Coarsened cell list grid to {:?}", n_bins);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distances::{euclidean_distance_squared, pairs_within_cutoff};

    fn points(coords: &[[f64; 3]]) -> Vec<Vec3> {
        coords.iter().map(|c| Vec3::from(*c)).collect()
    }

    #[test]
    fn test_cell_list_basic() {
        let coords = points(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [10.0, 10.0, 10.0], // Far away
        ]);

        let cell_list = CellList::new(&coords, 2.0);

        let neighbours: Vec<usize> = cell_list
            .candidates(0)
            .filter(|&idx| euclidean_distance_squared(&coords[0], &coords[idx]) <= 1.5 * 1.5)
            .collect();

        assert!(neighbours.contains(&0));
        assert!(neighbours.contains(&1));
        assert!(neighbours.contains(&2));
        assert!(!neighbours.contains(&3)); // Too far
    }

    #[test]
    fn test_grid_dimensions() {
        let coords = points(&[[0.0, 0.0, 0.0], [10.0, 3.0, 0.5]]);
        let cell_list = CellList::new(&coords, 2.0);

        assert_eq!(cell_list.n_bins(), [5, 1, 1]);
        assert_eq!(cell_list.nb_bins(), 5);
        let w = cell_list.bin_width();
        assert!((w[0] - 2.0).abs() < 1e-12);
        assert!((w[1] - 3.0).abs() < 1e-12);
        // extent below the radius still yields a full-width bin
        assert!((w[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_bin_index_clamps_upper_edge() {
        let coords = points(&[[0.0, 0.0, 0.0], [4.0, 0.0, 0.0]]);
        let cell_list = CellList::new(&coords, 2.0);

        assert_eq!(cell_list.n_bins(), [2, 1, 1]);
        assert_eq!(cell_list.bin_of(0), 0);
        assert_eq!(cell_list.bin_of(1), 1);
        assert_eq!(cell_list.bin_index(&Vec3::new(-5.0, 0.0, 0.0)), 0);
    }

    #[test]
    fn test_neighbour_bins_stencil() {
        let coords = points(&[[0.0, 0.0, 0.0], [10.0, 10.0, 10.0]]);
        let cell_list = CellList::new(&coords, 2.0);
        assert_eq!(cell_list.n_bins(), [5, 5, 5]);

        // corner bin: 2 x 2 x 2
        assert_eq!(cell_list.neighbour_bins(0).len(), 8);
        // interior bin: full stencil
        let centre = cell_list.bin_index(&Vec3::new(5.0, 5.0, 5.0));
        let stencil = cell_list.neighbour_bins(centre);
        assert_eq!(stencil.len(), 27);
        assert!(stencil.windows(2).all(|w| w[0] < w[1]));
        assert!(stencil.contains(&centre));
    }

    #[test]
    fn test_linked_lists_cover_all_points() {
        let coords = points(&[
            [0.1, 0.1, 0.1],
            [0.2, 0.1, 0.1],
            [3.0, 3.0, 3.0],
            [0.3, 0.1, 0.1],
        ]);
        let cell_list = CellList::new(&coords, 1.0);

        let first_bin = cell_list.bin_of(0);
        let in_first: Vec<usize> = cell_list.atoms_in_bin(first_bin).collect();
        assert_eq!(in_first, vec![0, 1, 3]);

        let mut all: Vec<usize> = (0..cell_list.nb_bins())
            .flat_map(|bin| cell_list.atoms_in_bin(bin))
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_candidates_match_brute_force() {
        // deterministic pseudo-random cloud
        let mut state = 12345u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        let coords: Vec<Vec3> = (0..200)
            .map(|_| Vec3::new(next() * 12.0, next() * 7.0, next() * 9.0))
            .collect();

        let cutoff = 1.7;
        let cell_list = CellList::new(&coords, cutoff);
        let cutoff_sq = cutoff * cutoff;

        let mut binned = Vec::new();
        for i in 0..coords.len() {
            for j in cell_list.candidates(i) {
                if i < j && euclidean_distance_squared(&coords[i], &coords[j]) <= cutoff_sq {
                    binned.push((i, j));
                }
            }
        }
        binned.sort_unstable();

        assert_eq!(binned, pairs_within_cutoff(&coords, cutoff));
    }

    #[test]
    fn test_sparse_grid_is_coarsened() {
        let coords = points(&[[0.0, 0.0, 0.0], [1000.0, 1000.0, 1000.0]]);
        let cell_list = CellList::new(&coords, 1.0);
        assert!(cell_list.nb_bins() <= MIN_BIN_BUDGET);
        assert!(cell_list.bin_width().iter().all(|&w| w >= 1.0));
    }

    #[test]
    fn test_far_apart_fragments() {
        let coords = points(&[
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [1e7, 1e7, 1e7],
            [1e7, 1e7, 1e7 + 1.0],
        ]);
        let cell_list = CellList::new(&coords, 1.5);
        assert!(cell_list.nb_bins() <= MIN_BIN_BUDGET);
        assert!(cell_list.bin_width().iter().all(|&w| w >= 1.5));

        let close: Vec<(usize, usize)> = (0..coords.len())
            .flat_map(|i| cell_list.candidates(i).map(move |j| (i, j)))
            .filter(|&(i, j)| i < j && euclidean_distance_squared(&coords[i], &coords[j]) <= 1.5 * 1.5)
            .collect();
        assert_eq!(close, vec![(0, 1), (2, 3)]);
    }

    #[test]
    fn test_flat_grid_stays_within_budget() {
        // two long axes and a thin one
        let coords = points(&[[0.0, 0.0, 0.0], [1e6, 1e6, 0.5]]);
        let cell_list = CellList::new(&coords, 1.0);
        assert_eq!(cell_list.n_bins()[2], 1);
        assert!(cell_list.nb_bins() <= MIN_BIN_BUDGET);
    }

    #[test]
    fn test_empty() {
        let cell_list = CellList::new(&[], 1.0);
        assert_eq!(cell_list.nb_bins(), 1);
        assert_eq!(cell_list.atoms_in_bin(0).count(), 0);
    }
}
