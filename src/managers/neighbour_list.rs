//! Neighbour-list adaptor: candidate pairs from spatial binning
//!
//! Periodic boundaries are handled by explicit ghost atoms: real atoms are
//! first folded into the cell, then every lattice image of a real atom that
//! can fall within the search radius of the real atoms is appended to the
//! atom table, and all atoms are binned together.
//! Pairs are accepted on the search radius, an upper bound of the cutoff;
//! a `StrictCutoff` on top applies the exact distance.

use nalgebra::Matrix3;

use super::{next_revision, AtomTable, ClusterLayer, ManagerError, StructureManager};
use crate::config::{NeighbourListParams, NeighbourListType};
use crate::geometry::cell_list::CellList;
use crate::geometry::distances::{euclidean_distance_squared, max_displacement};
use crate::structure::{AtomicStructure, Lattice, Vec3};

/// Slack on fractional image bounds
const FRACTIONAL_TOLERANCE: f64 = 1e-9;
/// Farthest an atom may be stored from the cell, in cells
const MAX_FOLD: f64 = (1 << 24) as f64;

/// State of the last full build, used to decide whether it can be reused
#[derive(Debug, Clone)]
struct BuildSnapshot {
    positions: Vec<Vec3>,
    cell: Matrix3<f64>,
    pbc: [bool; 3],
    atom_types: Vec<i32>,
    lattice: Lattice,
}

pub struct NeighbourList {
    parent: Box<dyn StructureManager>,
    params: NeighbourListParams,
    stack_depth: usize,
    atoms: AtomTable,
    /// Own order-1 layer, only used when ghosts are centers
    centers: ClusterLayer,
    pairs: ClusterLayer,
    search_radius: f64,
    snapshot: Option<BuildSnapshot>,
    revision: u64,
    updated: bool,
}

impl NeighbourList {
    /// Stack a neighbour list on top of a manager of atoms
    ///
    /// # Arguments
    /// * `parent` - manager providing order-1 clusters only
    /// * `params` - cutoff, skin and list conventions
    pub fn new(parent: Box<dyn StructureManager>, params: NeighbourListParams) -> Result<Self, ManagerError> {
        params.validate()?;
        if parent.max_order() != 1 {
            return Err(ManagerError::Configuration(format!(
                "a neighbour list needs a manager of atoms below it, '{}' provides order {}",
                parent.name(),
                parent.max_order()
            )));
        }

        let stack_depth = parent.stack_depth() + 1;
        Ok(Self {
            parent,
            search_radius: params.interaction_radius(),
            params,
            stack_depth,
            atoms: AtomTable::default(),
            centers: ClusterLayer::new(1, stack_depth),
            pairs: ClusterLayer::new(2, stack_depth),
            snapshot: None,
            revision: 0,
            updated: false,
        })
    }

    pub fn params(&self) -> &NeighbourListParams {
        &self.params
    }

    pub fn parent(&self) -> &dyn StructureManager {
        self.parent.as_ref()
    }

    /// Number of ghost atoms generated by the last build
    pub fn nb_ghosts(&self) -> usize {
        self.atoms.n_ghosts()
    }

    /// True if the current structure only moved within half the skin
    fn can_reuse(&self) -> bool {
        if self.params.skin <= 0.0 {
            return false;
        }
        let Some(snapshot) = &self.snapshot else {
            return false;
        };

        let structure = self.parent.structure();
        if snapshot.cell != *structure.cell()
            || snapshot.pbc != structure.pbc()
            || snapshot.atom_types != structure.atom_types()
        {
            return false;
        }

        match max_displacement(&snapshot.positions, structure.positions()) {
            Some(displacement) => displacement <= 0.5 * self.params.skin,
            None => false,
        }
    }

    /// Move real and ghost atoms to the current positions, keeping the topology
    fn refresh(&mut self) {
        let structure = self.parent.structure();
        if let Some(snapshot) = &self.snapshot {
            let lattice = &snapshot.lattice;
            self.atoms
                .refresh_positions(structure, |shift| lattice.shift_vector(shift));
        }
        log::trace!("Neighbour list reused, positions refreshed");
    }

    fn rebuild(&mut self) -> Result<(), ManagerError> {
        let structure = self.parent.structure();
        let lattice = structure
            .lattice()
            .map_err(|e| ManagerError::Geometry(e.to_string()))?;
        let mut atoms = AtomTable::from_structure(structure);
        let folded = fold_into_cell(&mut atoms, structure, &lattice)?;
        let radius = search_radius(
            &atoms.positions()[..atoms.n_real()],
            structure,
            self.params.interaction_radius(),
        );
        add_ghosts(&mut atoms, structure, &lattice, &folded, radius, self.params.max_image_layers)?;

        let center_atoms: Vec<usize> = if self.params.consider_ghost_neighbours {
            (0..atoms.len()).collect()
        } else {
            let layer = self.parent.layer(1).ok_or_else(|| {
                ManagerError::Precondition(format!("'{}' has no atoms", self.parent.name()))
            })?;
            (0..layer.len()).map(|i| layer.cluster_atoms(i)[0]).collect()
        };

        let cells = CellList::new(atoms.positions(), radius);
        let pairs = build_pairs(
            &atoms,
            &cells,
            &center_atoms,
            radius,
            self.params.list_type,
            self.stack_depth,
        );

        let mut centers = ClusterLayer::new(1, self.stack_depth);
        if self.params.consider_ghost_neighbours {
            for &atom in &center_atoms {
                centers.push_cluster(&[atom]);
            }
            centers.close_parent();
        }

        log::debug!(
            "Neighbour list: {} atoms, {} ghosts, {} pairs, search radius {:.4}, bins {:?}",
            atoms.n_real(),
            atoms.n_ghosts(),
            pairs.len(),
            radius,
            cells.n_bins()
        );

        self.snapshot = Some(BuildSnapshot {
            positions: structure.positions().to_vec(),
            cell: *structure.cell(),
            pbc: structure.pbc(),
            atom_types: structure.atom_types().to_vec(),
            lattice,
        });
        self.atoms = atoms;
        self.centers = centers;
        self.pairs = pairs;
        self.search_radius = radius;
        Ok(())
    }
}

/// Search radius for real atoms placed at `positions` in a structure's cell
///
/// The reference box spans the atoms and the periodic cell vectors; it is
/// binned with `radius` as the minimum width, so the result is never below
/// `radius`.
pub fn search_radius(positions: &[Vec3], structure: &AtomicStructure, radius: f64) -> f64 {
    let mut points = positions.to_vec();
    if structure.is_periodic() {
        let cell = structure.cell();
        let pbc = structure.pbc();
        for mask in 0..8usize {
            let mut corner = Vec3::zeros();
            for d in 0..3 {
                if pbc[d] && mask & (1 << d) != 0 {
                    corner += cell.column(d).into_owned();
                }
            }
            points.push(corner);
        }
    }

    if points.is_empty() {
        return radius;
    }

    let mut lo = Vec3::repeat(f64::INFINITY);
    let mut hi = Vec3::repeat(f64::NEG_INFINITY);
    for p in &points {
        lo = lo.inf(p);
        hi = hi.sup(p);
    }

    (0..3)
        .map(|d| {
            let length = hi[d] - lo[d];
            let n = ((length / radius).floor() as usize).max(1);
            (length / n as f64).max(radius)
        })
        .fold(f64::INFINITY, f64::min)
}

/// Real atoms in the cell frame
struct FoldedAtoms {
    /// Fractional coordinates, in [0, 1) along periodic axes
    fractional: Vec<Vec3>,
    /// Lattice shift taking each wrapped position back to the stored one
    folds: Vec<[i32; 3]>,
}

/// Move every real atom stored outside the cell to its image inside it
fn fold_into_cell(
    atoms: &mut AtomTable,
    structure: &AtomicStructure,
    lattice: &Lattice,
) -> Result<FoldedAtoms, ManagerError> {
    let mut folded = FoldedAtoms {
        fractional: Vec::with_capacity(structure.len()),
        folds: Vec::with_capacity(structure.len()),
    };
    if !structure.is_periodic() {
        return Ok(folded);
    }

    let pbc = structure.pbc();
    let mut n_folded = 0;
    for (idx, p) in structure.positions().iter().enumerate() {
        let mut f = lattice.to_fractional(p);
        let mut fold = [0i32; 3];
        for d in 0..3 {
            if !pbc[d] {
                continue;
            }
            let cells = (f[d] + FRACTIONAL_TOLERANCE).floor();
            if cells.abs() > MAX_FOLD {
                return Err(ManagerError::Geometry(format!(
                    "atom {} lies {} cells away along cell vector {}",
                    idx, cells, d
                )));
            }
            fold[d] = cells as i32;
            f[d] -= cells;
        }

        if fold != [0; 3] {
            let back = [-fold[0], -fold[1], -fold[2]];
            atoms.fold_real(idx, back, p + lattice.shift_vector(back));
            n_folded += 1;
        }
        folded.fractional.push(f);
        folded.folds.push(fold);
    }

    if n_folded > 0 {
        log::debug!("Folded {} atoms stored outside the cell", n_folded);
    }
    Ok(folded)
}

/// Append the periodic images that can be within `radius` of a real atom
///
/// Images are generated shift by shift in lexicographic order (zero shift
/// skipped), atoms by index within a shift. The image bounds come from the
/// folded atoms, so the ghost count does not depend on where atoms were
/// stored.
fn add_ghosts(
    atoms: &mut AtomTable,
    structure: &AtomicStructure,
    lattice: &Lattice,
    folded: &FoldedAtoms,
    radius: f64,
    max_layers: u32,
) -> Result<(), ManagerError> {
    if !structure.is_periodic() || structure.is_empty() {
        return Ok(());
    }

    let pbc = structure.pbc();
    let fractional = &folded.fractional;
    let widths = lattice.perpendicular_widths();

    let mut lo = [0.0; 3];
    let mut hi = [0.0; 3];
    let mut pad = [0.0; 3];
    let mut bounds = [0i32; 3];
    for d in 0..3 {
        if !pbc[d] {
            continue;
        }
        lo[d] = fractional.iter().map(|f| f[d]).fold(f64::INFINITY, f64::min);
        hi[d] = fractional.iter().map(|f| f[d]).fold(f64::NEG_INFINITY, f64::max);
        pad[d] = radius / widths[d];

        let layers = pad[d].ceil();
        if layers > max_layers as f64 {
            return Err(ManagerError::Geometry(format!(
                "search radius {:.4} needs {} periodic image layers along cell vector {}, the limit is {}",
                radius, layers, d, max_layers
            )));
        }
        bounds[d] = (hi[d] - lo[d] + pad[d] + FRACTIONAL_TOLERANCE).floor() as i32;
    }

    for s0 in -bounds[0]..=bounds[0] {
        for s1 in -bounds[1]..=bounds[1] {
            for s2 in -bounds[2]..=bounds[2] {
                let shift = [s0, s1, s2];
                if shift == [0; 3] {
                    continue;
                }
                for (idx, f) in fractional.iter().enumerate() {
                    let inside = (0..3).all(|d| {
                        if !pbc[d] {
                            return true;
                        }
                        let x = f[d] + shift[d] as f64;
                        x >= lo[d] - pad[d] - FRACTIONAL_TOLERANCE && x <= hi[d] + pad[d] + FRACTIONAL_TOLERANCE
                    });
                    if inside {
                        let fold = folded.folds[idx];
                        let image = [shift[0] - fold[0], shift[1] - fold[1], shift[2] - fold[2]];
                        atoms.push_ghost(idx, image, structure.position(idx) + lattice.shift_vector(image));
                    }
                }
            }
        }
    }

    log::trace!("Generated {} ghosts, shift bounds {:?}", atoms.n_ghosts(), bounds);
    Ok(())
}

/// Candidate pairs of every center, neighbours sorted by atom key
fn build_pairs(
    atoms: &AtomTable,
    cells: &CellList,
    center_atoms: &[usize],
    radius: f64,
    list_type: NeighbourListType,
    depth: usize,
) -> ClusterLayer {
    let radius_sq = radius * radius;
    let mut pairs = ClusterLayer::new(2, depth);
    let mut neighbours = Vec::new();

    for &center in center_atoms {
        let key = atoms.sort_key(center);
        let position = atoms.position(center);

        neighbours.clear();
        neighbours.extend(cells.candidates(center).filter(|&j| {
            j != center
                && euclidean_distance_squared(&position, &atoms.position(j)) <= radius_sq
                && (list_type == NeighbourListType::Full || atoms.sort_key(j) > key)
        }));
        neighbours.sort_unstable_by_key(|&j| atoms.sort_key(j));

        for &j in &neighbours {
            pairs.push_cluster(&[center, j]);
        }
        pairs.close_parent();
    }

    pairs
}

impl StructureManager for NeighbourList {
    fn name(&self) -> &'static str {
        "neighbour_list"
    }

    fn update(&mut self, structure: Option<AtomicStructure>) -> Result<(), ManagerError> {
        self.updated = false;
        self.parent.update(structure)?;

        if self.can_reuse() {
            self.refresh();
        } else if let Err(e) = self.rebuild() {
            self.snapshot = None;
            log::warn!("Neighbour list update failed: {}", e);
            return Err(e);
        }

        self.revision = next_revision();
        self.updated = true;
        Ok(())
    }

    fn is_updated(&self) -> bool {
        self.updated
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    fn max_order(&self) -> usize {
        2
    }

    fn structure(&self) -> &AtomicStructure {
        self.parent.structure()
    }

    fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    fn layer(&self, order: usize) -> Option<&ClusterLayer> {
        match order {
            1 if self.params.consider_ghost_neighbours => Some(&self.centers),
            1 => self.parent.layer(1),
            2 => Some(&self.pairs),
            _ => None,
        }
    }

    fn search_radius(&self) -> Option<f64> {
        Some(self.search_radius)
    }

    fn interaction_cutoff(&self) -> Option<f64> {
        Some(self.params.interaction_radius())
    }

    fn list_type(&self) -> Option<NeighbourListType> {
        Some(self.params.list_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::distances::pairs_within_cutoff;
    use crate::managers::{clusters, CentersManager};
    use crate::structure::noising::rattle;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn build(structure: AtomicStructure, params: NeighbourListParams) -> NeighbourList {
        let mut nl = NeighbourList::new(Box::new(CentersManager::new(structure)), params).unwrap();
        nl.update(None).unwrap();
        nl
    }

    fn pair_set(nl: &NeighbourList) -> BTreeSet<(usize, usize)> {
        clusters(nl, 2)
            .unwrap()
            .map(|p| (p.atom_indices()[0], p.atom_indices()[1]))
            .collect()
    }

    fn random_cloud(n: usize, size: f64, seed: u64) -> AtomicStructure {
        let mut rng = StdRng::seed_from_u64(seed);
        let coords: Vec<[f64; 3]> = (0..n)
            .map(|_| [rng.gen::<f64>() * size, rng.gen::<f64>() * size, rng.gen::<f64>() * size])
            .collect();
        let types = (0..n).map(|i| 1 + (i % 3) as i32).collect();
        AtomicStructure::non_periodic(&coords, types).unwrap()
    }

    #[test]
    fn test_two_atoms_half_and_full() {
        let s = AtomicStructure::non_periodic(&[[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]], vec![1, 1]).unwrap();
        let half = build(
            s.clone(),
            NeighbourListParams::new(1.5).with_list_type(NeighbourListType::Half),
        );
        let full = build(s, NeighbourListParams::new(1.5));

        assert_eq!(half.nb_clusters(2), 1);
        assert_eq!(full.nb_clusters(2), 2);
        assert_eq!(half.nb_ghosts(), 0);
        assert_eq!(half.cluster_depth(2), Some(1));
        assert_eq!(half.cluster_depth(1), Some(0));
        assert_eq!(full.cluster_neighbour(1, 1, 0), Some(0));
    }

    #[test]
    fn test_single_atom_cubic_cell() {
        let s = AtomicStructure::from_coords(
            &[[0.0, 0.0, 0.0]],
            [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]],
            [true; 3],
            vec![14],
        )
        .unwrap();
        let nl = build(s, NeighbourListParams::new(1.5));

        assert_eq!(nl.search_radius(), Some(2.0));
        assert_eq!(nl.nb_ghosts(), 26);
        assert_eq!(nl.nb_clusters(2), 6);

        let mut shifts = Vec::new();
        for pair in clusters(&nl, 2).unwrap() {
            assert!((pair.distance().unwrap() - 2.0).abs() < 1e-12);
            let neighbour = pair.back();
            assert!(neighbour.is_ghost());
            assert_eq!(neighbour.real_index(), 0);
            assert_eq!(neighbour.atom_type(), 14);
            shifts.push(neighbour.shift());
        }
        // sorted by key, so by shift
        assert_eq!(
            shifts,
            vec![[-1, 0, 0], [0, -1, 0], [0, 0, -1], [0, 0, 1], [0, 1, 0], [1, 0, 0]]
        );
    }

    #[test]
    fn test_full_is_twice_half() {
        let s = random_cloud(60, 6.0, 7);
        let half = build(
            s.clone(),
            NeighbourListParams::new(1.8).with_list_type(NeighbourListType::Half),
        );
        let full = build(s, NeighbourListParams::new(1.8));

        assert_eq!(full.nb_clusters(2), 2 * half.nb_clusters(2));
        let full_pairs = pair_set(&full);
        for (i, j) in pair_set(&half) {
            assert!(i < j);
            assert!(full_pairs.contains(&(i, j)));
            assert!(full_pairs.contains(&(j, i)));
        }
    }

    #[test]
    fn test_candidates_cover_brute_force() {
        let s = rattle(&random_cloud(80, 8.0, 11), 0.05, 3).unwrap();
        let cutoff = 2.1;
        let nl = build(
            s.clone(),
            NeighbourListParams::new(cutoff).with_list_type(NeighbourListType::Half),
        );
        let candidates = pair_set(&nl);
        for pair in pairs_within_cutoff(s.positions(), cutoff) {
            assert!(candidates.contains(&pair), "missing pair {:?}", pair);
        }
        let radius = nl.search_radius().unwrap();
        for pair in clusters(&nl, 2).unwrap() {
            assert!(pair.distance().unwrap() <= radius + 1e-12);
        }
    }

    #[test]
    fn test_neighbours_sorted_and_deterministic() {
        let s = AtomicStructure::from_coords(
            &[[0.1, 0.2, 0.3], [1.4, 1.1, 0.9], [2.2, 0.4, 1.7]],
            [[3.0, 0.0, 0.0], [0.5, 3.0, 0.0], [0.0, 0.0, 3.0]],
            [true; 3],
            vec![1, 6, 8],
        )
        .unwrap();
        let params = NeighbourListParams::new(2.0).with_list_type(NeighbourListType::Half);
        let first = build(s.clone(), params.clone());
        let second = build(s, params);

        assert_eq!(first.layer(2), second.layer(2));
        assert_eq!(first.atoms(), second.atoms());

        for center in clusters(&first, 1).unwrap() {
            let keys: Vec<_> = center
                .children()
                .map(|p| first.atoms().sort_key(p.atom_indices()[1]))
                .collect();
            assert!(keys.windows(2).all(|w| w[0] < w[1]));
            assert!(keys.iter().all(|k| *k > first.atoms().sort_key(center.front().index())));
        }
    }

    #[test]
    fn test_periodic_half_list_counts_each_bond_once() {
        // simple cubic crystal: 6 nearest neighbours at 1.0 per atom
        let mut coords = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                for z in 0..3 {
                    coords.push([x as f64, y as f64, z as f64]);
                }
            }
        }
        let s = AtomicStructure::from_coords(
            &coords,
            [[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 3.0]],
            [true; 3],
            vec![26; 27],
        )
        .unwrap();
        let half = build(
            s.clone(),
            NeighbourListParams::new(1.1).with_list_type(NeighbourListType::Half),
        );
        let full = build(s, NeighbourListParams::new(1.1));

        let close = |nl: &NeighbourList| {
            clusters(nl, 2)
                .unwrap()
                .filter(|p| p.distance().unwrap() < 1.05)
                .count()
        };
        assert_eq!(close(&full), 27 * 6);
        assert_eq!(close(&half), 27 * 3);
    }

    #[test]
    fn test_slab_has_no_ghosts_along_open_axis() {
        let s = AtomicStructure::from_coords(
            &[[0.5, 0.5, 0.0], [0.5, 0.5, 5.0]],
            [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 0.0]],
            [true, true, false],
            vec![1, 1],
        )
        .unwrap();
        let nl = build(s, NeighbourListParams::new(2.5));
        // eight in-plane images per atom
        assert_eq!(nl.nb_ghosts(), 16);
        for tag in nl.atoms().tags() {
            assert_eq!(tag.shift()[2], 0);
        }
        // the two atoms are 5.0 apart along the open axis
        for pair in clusters(&nl, 2).unwrap() {
            assert_eq!(pair.front().real_index(), pair.back().real_index());
        }
    }

    #[test]
    fn test_too_many_image_layers() {
        let s = AtomicStructure::from_coords(
            &[[0.0, 0.0, 0.0]],
            [[0.5, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 5.0]],
            [true; 3],
            vec![1],
        )
        .unwrap();
        let params = NeighbourListParams::new(3.0);
        let mut nl = NeighbourList::new(Box::new(CentersManager::new(s)), params).unwrap();
        assert!(matches!(nl.update(None), Err(ManagerError::Geometry(_))));
        assert!(!nl.is_updated());
        assert!(matches!(clusters(&nl, 2), Err(ManagerError::Precondition(_))));
    }

    #[test]
    fn test_degenerate_periodic_axis() {
        let s = AtomicStructure::from_coords(
            &[[0.0, 0.0, 0.0]],
            [[2.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 2.0]],
            [true; 3],
            vec![1],
        )
        .unwrap();
        let mut nl = NeighbourList::new(Box::new(CentersManager::new(s)), NeighbourListParams::new(1.0)).unwrap();
        assert!(matches!(nl.update(None), Err(ManagerError::Geometry(_))));
    }

    #[test]
    fn test_requires_atom_manager() {
        let s = AtomicStructure::non_periodic(&[[0.0; 3]], vec![1]).unwrap();
        let nl = NeighbourList::new(Box::new(CentersManager::new(s)), NeighbourListParams::new(1.0)).unwrap();
        let err = NeighbourList::new(Box::new(nl), NeighbourListParams::new(1.0));
        assert!(matches!(err, Err(ManagerError::Configuration(_))));
    }

    #[test]
    fn test_skin_reuse_keeps_topology() {
        let s = random_cloud(40, 5.0, 5);
        let params = NeighbourListParams::new(1.5).with_skin(0.4);
        let mut nl = build(s.clone(), params);
        let pairs_before = nl.layer(2).cloned();
        let revision_before = nl.revision();

        // small move: reuse, positions follow
        let moved = rattle(&s, 0.01, 1).unwrap();
        let max_move = max_displacement(s.positions(), moved.positions()).unwrap();
        assert!(max_move <= 0.2);
        nl.update(Some(moved.clone())).unwrap();
        assert_eq!(nl.layer(2).cloned(), pairs_before);
        assert!(nl.revision() > revision_before);
        assert_eq!(nl.position(0), moved.position(0));

        // still a superset of the true neighbours
        let candidates = pair_set(&nl);
        for (i, j) in pairs_within_cutoff(moved.positions(), 1.5) {
            assert!(candidates.contains(&(i, j)));
        }

        // a large move forces a rebuild from the new positions
        let far = moved
            .with_positions(moved.positions().iter().map(|p| p * 2.0).collect())
            .unwrap();
        nl.update(Some(far.clone())).unwrap();
        let rebuilt = build(far, NeighbourListParams::new(1.5).with_skin(0.4));
        assert_eq!(nl.layer(2), rebuilt.layer(2));
    }

    #[test]
    fn test_atoms_stored_far_from_the_cell() {
        let cell = [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]];
        let crystal = |second: [f64; 3]| {
            AtomicStructure::from_coords(&[[0.0, 0.0, 0.0], second], cell, [true; 3], vec![1, 8]).unwrap()
        };
        let inside = build(crystal([1.0, 1.0, 1.0]), NeighbourListParams::new(1.8));
        let outside = build(crystal([81.0, 81.0, 81.0]), NeighbourListParams::new(1.8));

        assert_eq!(outside.nb_ghosts(), inside.nb_ghosts());
        assert_eq!(outside.nb_clusters(2), inside.nb_clusters(2));

        let distances = |nl: &NeighbourList| {
            let mut d: Vec<f64> = clusters(nl, 2).unwrap().map(|p| p.distance().unwrap()).collect();
            d.sort_by(|a, b| a.total_cmp(b));
            d
        };
        for (a, b) in distances(&inside).iter().zip(distances(&outside).iter()) {
            assert!((a - b).abs() < 1e-9);
        }

        // the folded atom and its images keep shifts from the stored position
        let atoms = outside.atoms();
        assert_eq!(atoms.tag(1).shift(), [-40, -40, -40]);
        let stored = outside.structure().position(1);
        for (idx, tag) in atoms.tags().iter().enumerate() {
            if tag.real_index() == 1 {
                let s = tag.shift();
                let expected = stored + Vec3::new(2.0 * s[0] as f64, 2.0 * s[1] as f64, 2.0 * s[2] as f64);
                assert!((atoms.position(idx) - expected).norm() < 1e-9);
            }
        }
        assert_eq!(atoms.tag(0).shift(), [0; 3]);
    }

    #[test]
    fn test_ghost_centers() {
        let s = AtomicStructure::from_coords(
            &[[0.0, 0.0, 0.0]],
            [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]],
            [true; 3],
            vec![1],
        )
        .unwrap();
        let nl = build(s, NeighbourListParams::new(1.5).with_ghost_neighbours(true));

        assert_eq!(nl.size(), 27);
        assert_eq!(nl.cluster_depth(1), Some(1));
        let ghost_center = clusters(&nl, 1).unwrap().nth(1).unwrap();
        assert!(ghost_center.front().is_ghost());
        // the first real atom still sees its six images
        let real_center = clusters(&nl, 1).unwrap().next().unwrap();
        assert_eq!(real_center.nb_children(), 6);
    }
}
