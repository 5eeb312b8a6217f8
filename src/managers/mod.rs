//! Structure managers and adaptors
//!
//! A stack starts from a `CentersManager` (order-1 clusters, the atoms) and is
//! extended by adaptors that each wrap the previous layer: a `NeighbourList`
//! adds candidate pairs and periodic ghost atoms, a `StrictCutoff` filters
//! them by exact distance and can lift them to triplets. Every layer exposes
//! the same `StructureManager` interface, so consumers never need to know how
//! deep the stack is.
//!
//! Clusters of order K are stored per layer in a `ClusterLayer`: a flat list
//! of atom tuples grouped by their parent cluster of order K-1. The position
//! of a cluster in that list is its global index, the key into `Property`
//! caches.

pub mod centers;
pub mod cluster;
pub mod neighbour_list;
pub mod property;
pub mod species;
pub mod stack;
pub mod strict;

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::config::NeighbourListType;
use crate::structure::{AtomicStructure, StructureError, Vec3};

pub use centers::CentersManager;
pub use cluster::{centers, clusters, AtomRef, ClusterIter, ClusterRef};
pub use neighbour_list::NeighbourList;
pub use property::{Property, PropertyStore};
pub use species::SpeciesPartition;
pub use stack::{make_manager, ManagerStack};
pub use strict::StrictCutoff;

/// Errors surfaced by managers, adaptors and property caches
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManagerError {
    /// Invalid adaptor parameters or an unsupported cluster order
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cutoff and cell are incompatible
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Programming error: stale or unfilled data was requested
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Invalid structure: {0}")]
    InvalidStructure(#[from] StructureError),
}

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Fresh, process-wide unique revision stamp for a rebuilt topology
pub(crate) fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// Identity of an atom seen by a manager
///
/// Ghosts are periodic images; species and other per-atom data are looked up
/// through the real atom. Shifts are lattice translations from the position
/// stored in the structure. A neighbour list folds real atoms into the cell,
/// so a real atom carries a non-zero shift when it was stored outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomTag {
    Real { index: usize, shift: [i32; 3] },
    Ghost { real: usize, shift: [i32; 3] },
}

impl AtomTag {
    /// A real atom at its stored position
    pub fn real(index: usize) -> Self {
        AtomTag::Real { index, shift: [0; 3] }
    }

    pub fn real_index(&self) -> usize {
        match *self {
            AtomTag::Real { index, .. } => index,
            AtomTag::Ghost { real, .. } => real,
        }
    }

    /// Lattice shift from the stored position of the real atom
    pub fn shift(&self) -> [i32; 3] {
        match *self {
            AtomTag::Real { shift, .. } | AtomTag::Ghost { shift, .. } => shift,
        }
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self, AtomTag::Ghost { .. })
    }

    /// Total order used for half lists and deterministic neighbour ordering
    pub fn sort_key(&self) -> (usize, [i32; 3]) {
        (self.real_index(), self.shift())
    }
}

/// Real atoms followed by their ghost images
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomTable {
    tags: Vec<AtomTag>,
    positions: Vec<Vec3>,
    types: Vec<i32>,
    n_real: usize,
}

impl AtomTable {
    pub fn from_structure(structure: &AtomicStructure) -> Self {
        Self {
            tags: (0..structure.len()).map(AtomTag::real).collect(),
            positions: structure.positions().to_vec(),
            types: structure.atom_types().to_vec(),
            n_real: structure.len(),
        }
    }

    /// Move real atom `index` to its image `shift` away from the stored position
    pub(crate) fn fold_real(&mut self, index: usize, shift: [i32; 3], position: Vec3) {
        self.tags[index] = AtomTag::Real { index, shift };
        self.positions[index] = position;
    }

    pub(crate) fn push_ghost(&mut self, real: usize, shift: [i32; 3], position: Vec3) {
        self.tags.push(AtomTag::Ghost { real, shift });
        self.positions.push(position);
        self.types.push(self.types[real]);
    }

    /// Recompute every position from the structure, keeping tags and order
    pub(crate) fn refresh_positions(&mut self, structure: &AtomicStructure, shift: impl Fn([i32; 3]) -> Vec3) {
        for (tag, position) in self.tags.iter().zip(self.positions.iter_mut()) {
            *position = structure.position(tag.real_index()) + shift(tag.shift());
        }
    }

    /// Real plus ghost atoms
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn n_real(&self) -> usize {
        self.n_real
    }

    pub fn n_ghosts(&self) -> usize {
        self.tags.len() - self.n_real
    }

    pub fn tag(&self, index: usize) -> AtomTag {
        self.tags[index]
    }

    pub fn tags(&self) -> &[AtomTag] {
        &self.tags
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.positions[index]
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn atom_type(&self, index: usize) -> i32 {
        self.types[index]
    }

    pub fn sort_key(&self, index: usize) -> (usize, [i32; 3]) {
        self.tags[index].sort_key()
    }
}

/// Clusters of one order, grouped by parent cluster
///
/// `atoms` holds `order` atom indices per cluster. The clusters of parent
/// `p` (a cluster of order - 1, or the whole manager for order 1) occupy
/// `parent_offsets[p]..parent_offsets[p + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLayer {
    order: usize,
    depth: usize,
    atoms: Vec<usize>,
    parent_offsets: Vec<usize>,
}

impl ClusterLayer {
    pub fn new(order: usize, depth: usize) -> Self {
        debug_assert!(order >= 1);
        Self {
            order,
            depth,
            atoms: Vec::new(),
            parent_offsets: vec![0],
        }
    }

    /// Append a cluster to the parent currently being filled
    pub(crate) fn push_cluster(&mut self, atoms: &[usize]) {
        debug_assert_eq!(atoms.len(), self.order);
        self.atoms.extend_from_slice(atoms);
    }

    /// Close the current parent; the next pushes belong to the next parent
    pub(crate) fn close_parent(&mut self) {
        self.parent_offsets.push(self.len());
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of clusters
    pub fn len(&self) -> usize {
        self.atoms.len() / self.order
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn cluster_atoms(&self, index: usize) -> &[usize] {
        &self.atoms[index * self.order..(index + 1) * self.order]
    }

    /// Global indices of the clusters grown from parent cluster `parent`
    pub fn children_of(&self, parent: usize) -> Range<usize> {
        match (self.parent_offsets.get(parent), self.parent_offsets.get(parent + 1)) {
            (Some(&start), Some(&end)) => start..end,
            _ => 0..0,
        }
    }
}

/// Common interface of the base manager and every adaptor
///
/// Adaptors own their parent (`Box<dyn StructureManager>`) and forward the
/// orders they do not change.
pub trait StructureManager: Send {
    /// Short identifier used in logs and errors
    fn name(&self) -> &'static str;

    /// Rebuild the whole stack up to this layer
    ///
    /// `Some(structure)` replaces the structure, `None` rebuilds from the
    /// current one. On error the layer stays "not updated".
    fn update(&mut self, structure: Option<AtomicStructure>) -> Result<(), ManagerError>;

    fn is_updated(&self) -> bool;

    /// Stamp of the last successful update
    fn revision(&self) -> u64;

    /// Number of adaptor layers below and including this one
    fn stack_depth(&self) -> usize;

    /// Highest cluster order available
    fn max_order(&self) -> usize;

    fn structure(&self) -> &AtomicStructure;

    /// Real atoms and, above a neighbour list, ghost atoms
    fn atoms(&self) -> &AtomTable;

    /// Clusters of the given order, `None` above `max_order`
    fn layer(&self, order: usize) -> Option<&ClusterLayer>;

    /// Radius of the candidate neighbour search, if a neighbour list is present
    fn search_radius(&self) -> Option<f64> {
        None
    }

    /// Distance below which the pairs of this layer are guaranteed complete
    ///
    /// Known at construction, before any update.
    fn interaction_cutoff(&self) -> Option<f64> {
        None
    }

    fn list_type(&self) -> Option<NeighbourListType> {
        None
    }

    /// Exact pair distances, published by a strict cutoff
    fn pair_distances(&self) -> Option<&Property<f64>> {
        None
    }

    /// Unit vectors from center to neighbour, published by a strict cutoff
    fn pair_directions(&self) -> Option<&Property<Vec3>> {
        None
    }

    /// Number of centers (order-1 clusters)
    fn size(&self) -> usize {
        self.nb_clusters(1)
    }

    fn nb_clusters(&self, order: usize) -> usize {
        self.layer(order).map_or(0, ClusterLayer::len)
    }

    fn cluster_depth(&self, order: usize) -> Option<usize> {
        self.layer(order).map(ClusterLayer::depth)
    }

    fn position(&self, atom: usize) -> Vec3 {
        self.atoms().position(atom)
    }

    fn atom_type(&self, atom: usize) -> i32 {
        self.atoms().atom_type(atom)
    }

    /// Atom added by the `j`-th child of cluster `index` of order `order`
    ///
    /// For an atom this is its `j`-th neighbour, for a pair the third atom
    /// of its `j`-th triplet.
    fn cluster_neighbour(&self, order: usize, index: usize, j: usize) -> Option<usize> {
        let children = self.layer(order + 1)?;
        let range = children.children_of(index);
        if j >= range.len() {
            return None;
        }
        children.cluster_atoms(range.start + j).last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_tag_ordering() {
        let real = AtomTag::real(1);
        let below = AtomTag::Ghost {
            real: 1,
            shift: [0, 0, -1],
        };
        let above = AtomTag::Ghost {
            real: 1,
            shift: [0, 1, -1],
        };
        assert!(below.sort_key() < real.sort_key());
        assert!(real.sort_key() < above.sort_key());
        assert!(AtomTag::real(0).sort_key() < below.sort_key());
        let folded = AtomTag::Real {
            index: 1,
            shift: [0, 0, -1],
        };
        assert_eq!(folded.shift(), [0, 0, -1]);
        assert!(!folded.is_ghost());
        assert_eq!(above.real_index(), 1);
        assert!(above.is_ghost() && !real.is_ghost());
    }

    #[test]
    fn test_cluster_layer_offsets() {
        let mut layer = ClusterLayer::new(2, 1);
        layer.push_cluster(&[0, 1]);
        layer.push_cluster(&[0, 2]);
        layer.close_parent();
        layer.close_parent();
        layer.push_cluster(&[2, 0]);
        layer.close_parent();

        assert_eq!(layer.len(), 3);
        assert_eq!(layer.children_of(0), 0..2);
        assert_eq!(layer.children_of(1), 2..2);
        assert_eq!(layer.children_of(2), 2..3);
        assert_eq!(layer.children_of(7), 0..0);
        assert_eq!(layer.cluster_atoms(2), &[2, 0]);
    }

    #[test]
    fn test_atom_table_ghosts_share_type() {
        let s = AtomicStructure::non_periodic(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]], vec![1, 8]).unwrap();
        let mut atoms = AtomTable::from_structure(&s);
        atoms.push_ghost(1, [1, 0, 0], Vec3::new(3.0, 0.0, 0.0));

        assert_eq!(atoms.len(), 3);
        assert_eq!(atoms.n_real(), 2);
        assert_eq!(atoms.n_ghosts(), 1);
        assert_eq!(atoms.atom_type(2), 8);
        assert_eq!(atoms.tag(2).real_index(), 1);

        atoms.fold_real(0, [-1, 0, 0], Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(atoms.tag(0).shift(), [-1, 0, 0]);

        atoms.refresh_positions(&s, |shift| Vec3::new(2.0 * shift[0] as f64, 0.0, 0.0));
        assert_eq!(atoms.position(0), Vec3::new(-2.0, 0.0, 0.0));
        assert_eq!(atoms.position(1), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(atoms.position(2), Vec3::new(3.0, 0.0, 0.0));
    }
}
