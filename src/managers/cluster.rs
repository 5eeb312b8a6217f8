//! Cluster handles and iteration
//!
//! `ClusterRef` is a cheap copyable view of one cluster: its order is a
//! runtime value, its atoms and depth come from the manager's cluster
//! layers. Iterating a cluster yields its children one order higher, so
//! nested loops walk centers, then pairs, then triplets:
//!
//! ```ignore
//! for center in centers(manager)? {
//!     for pair in center {
//!         for triplet in pair { /* ... */ }
//!     }
//! }
//! ```

use std::fmt;
use std::ops::Range;

use super::{AtomTag, ClusterLayer, ManagerError, StructureManager};
use crate::geometry::distances::{euclidean_distance, unit_direction};
use crate::structure::Vec3;

/// One atom of a cluster, real or ghost
#[derive(Clone, Copy)]
pub struct AtomRef<'a> {
    manager: &'a dyn StructureManager,
    index: usize,
}

impl<'a> AtomRef<'a> {
    /// Index in the manager's atom table
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tag(&self) -> AtomTag {
        self.manager.atoms().tag(self.index)
    }

    pub fn is_ghost(&self) -> bool {
        self.tag().is_ghost()
    }

    /// Index of the real atom this atom is (an image of)
    pub fn real_index(&self) -> usize {
        self.tag().real_index()
    }

    pub fn shift(&self) -> [i32; 3] {
        self.tag().shift()
    }

    pub fn position(&self) -> Vec3 {
        self.manager.position(self.index)
    }

    pub fn atom_type(&self) -> i32 {
        self.manager.atom_type(self.index)
    }
}

impl fmt::Debug for AtomRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomRef")
            .field("index", &self.index)
            .field("tag", &self.tag())
            .finish()
    }
}

/// View of one cluster of a manager
#[derive(Clone, Copy)]
pub struct ClusterRef<'a> {
    manager: &'a dyn StructureManager,
    layer: &'a ClusterLayer,
    index: usize,
}

impl<'a> ClusterRef<'a> {
    /// Cluster `index` of the given order
    pub fn new(manager: &'a dyn StructureManager, order: usize, index: usize) -> Result<Self, ManagerError> {
        let layer = updated_layer(manager, order)?;
        if index >= layer.len() {
            return Err(ManagerError::Precondition(format!(
                "cluster {} out of range, '{}' has {} clusters of order {}",
                index,
                manager.name(),
                layer.len(),
                order
            )));
        }
        Ok(Self {
            manager,
            layer,
            index,
        })
    }

    pub fn manager(&self) -> &'a dyn StructureManager {
        self.manager
    }

    pub fn order(&self) -> usize {
        self.layer.order()
    }

    pub fn depth(&self) -> usize {
        self.layer.depth()
    }

    /// Dense index within the clusters of this order, the property key
    pub fn global_index(&self) -> usize {
        self.index
    }

    pub fn atom_indices(&self) -> &'a [usize] {
        self.layer.cluster_atoms(self.index)
    }

    pub fn atom(&self, k: usize) -> Option<AtomRef<'a>> {
        self.atom_indices().get(k).map(|&index| AtomRef {
            manager: self.manager,
            index,
        })
    }

    pub fn atoms(&self) -> impl Iterator<Item = AtomRef<'a>> + 'a {
        let manager = self.manager;
        self.atom_indices()
            .iter()
            .map(move |&index| AtomRef { manager, index })
    }

    /// The center atom
    pub fn front(&self) -> AtomRef<'a> {
        AtomRef {
            manager: self.manager,
            index: self.atom_indices()[0],
        }
    }

    /// The atom this cluster added to its parent
    pub fn back(&self) -> AtomRef<'a> {
        AtomRef {
            manager: self.manager,
            index: self.atom_indices()[self.order() - 1],
        }
    }

    /// Position of the last atom
    pub fn position(&self) -> Vec3 {
        self.back().position()
    }

    /// Type of the last atom
    pub fn atom_type(&self) -> i32 {
        self.back().atom_type()
    }

    pub fn atom_types(&self) -> Vec<i32> {
        self.atoms().map(|atom| atom.atom_type()).collect()
    }

    /// Distance between the two atoms of a pair
    ///
    /// Served from the strict-cutoff property when it describes these
    /// clusters, computed from positions otherwise.
    pub fn distance(&self) -> Result<f64, ManagerError> {
        self.require_pair("distance")?;
        if let Some(distances) = self.manager.pair_distances() {
            if distances.depth() == self.depth() {
                return distances.get(*self).copied();
            }
        }
        Ok(euclidean_distance(
            &self.front().position(),
            &self.back().position(),
        ))
    }

    /// Unit vector from the center to the neighbour of a pair
    pub fn direction(&self) -> Result<Vec3, ManagerError> {
        self.require_pair("direction")?;
        if let Some(directions) = self.manager.pair_directions() {
            if directions.depth() == self.depth() {
                return directions.get(*self).copied();
            }
        }
        Ok(unit_direction(&self.front().position(), &self.back().position()))
    }

    fn require_pair(&self, what: &str) -> Result<(), ManagerError> {
        if self.order() != 2 {
            return Err(ManagerError::Configuration(format!(
                "{} is only defined for pairs, got a cluster of order {}",
                what,
                self.order()
            )));
        }
        Ok(())
    }

    /// Number of clusters one order higher grown from this one
    pub fn nb_children(&self) -> usize {
        self.manager
            .layer(self.order() + 1)
            .map_or(0, |children| children.children_of(self.index).len())
    }

    /// Clusters one order higher grown from this one
    pub fn children(&self) -> ClusterIter<'a> {
        match self.manager.layer(self.order() + 1) {
            Some(children) => ClusterIter {
                manager: self.manager,
                layer: Some(children),
                range: children.children_of(self.index),
            },
            None => ClusterIter::empty(self.manager),
        }
    }
}

impl<'a> IntoIterator for ClusterRef<'a> {
    type Item = ClusterRef<'a>;
    type IntoIter = ClusterIter<'a>;

    fn into_iter(self) -> ClusterIter<'a> {
        self.children()
    }
}

impl fmt::Debug for ClusterRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterRef")
            .field("order", &self.order())
            .field("depth", &self.depth())
            .field("index", &self.index)
            .field("atoms", &self.atom_indices())
            .finish()
    }
}

/// Forward iterator over a contiguous run of clusters of one order
#[derive(Clone)]
pub struct ClusterIter<'a> {
    manager: &'a dyn StructureManager,
    layer: Option<&'a ClusterLayer>,
    range: Range<usize>,
}

impl<'a> ClusterIter<'a> {
    fn empty(manager: &'a dyn StructureManager) -> Self {
        Self {
            manager,
            layer: None,
            range: 0..0,
        }
    }
}

impl<'a> Iterator for ClusterIter<'a> {
    type Item = ClusterRef<'a>;

    fn next(&mut self) -> Option<ClusterRef<'a>> {
        let layer = self.layer?;
        let index = self.range.next()?;
        Some(ClusterRef {
            manager: self.manager,
            layer,
            index,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.layer.is_some() { self.range.len() } else { 0 };
        (n, Some(n))
    }
}

impl ExactSizeIterator for ClusterIter<'_> {}

fn updated_layer<'a>(manager: &'a dyn StructureManager, order: usize) -> Result<&'a ClusterLayer, ManagerError> {
    if !manager.is_updated() {
        return Err(ManagerError::Precondition(format!(
            "manager '{}' is not updated",
            manager.name()
        )));
    }
    manager.layer(order).ok_or_else(|| {
        ManagerError::Configuration(format!(
            "manager '{}' provides clusters up to order {}, requested order {}",
            manager.name(),
            manager.max_order(),
            order
        ))
    })
}

/// All clusters of the given order, in global index order
pub fn clusters<'a>(manager: &'a dyn StructureManager, order: usize) -> Result<ClusterIter<'a>, ManagerError> {
    if order == 0 {
        return Err(ManagerError::Configuration(
            "cluster orders start at 1".to_string(),
        ));
    }
    let layer = updated_layer(manager, order)?;
    Ok(ClusterIter {
        manager,
        layer: Some(layer),
        range: 0..layer.len(),
    })
}

/// Order-1 clusters
pub fn centers<'a>(manager: &'a dyn StructureManager) -> Result<ClusterIter<'a>, ManagerError> {
    clusters(manager, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NeighbourListParams, NeighbourListType, StrictParams};
    use crate::managers::{CentersManager, NeighbourList, StrictCutoff};
    use crate::structure::AtomicStructure;

    fn water() -> AtomicStructure {
        AtomicStructure::from_symbols(
            &[[0.0, 0.0, 0.0], [0.96, 0.0, 0.0], [-0.24, 0.93, 0.0]],
            [[0.0; 3]; 3],
            [false; 3],
            &["O", "H", "H"],
        )
        .unwrap()
    }

    // all three distances are below 1.6, only the O-H bonds below 1.0
    fn strict_stack(list_type: NeighbourListType, cutoff: f64) -> StrictCutoff {
        let centers = Box::new(CentersManager::new(water()));
        let nl = NeighbourList::new(centers, NeighbourListParams::new(cutoff).with_list_type(list_type)).unwrap();
        let mut strict = StrictCutoff::new(Box::new(nl), StrictParams::new(cutoff).with_triplets()).unwrap();
        strict.update(None).unwrap();
        strict
    }

    #[test]
    fn test_nested_iteration_matches_counts() {
        let strict = strict_stack(NeighbourListType::Full, 1.6);
        let mut n_pairs = 0;
        let mut n_triplets = 0;
        for center in centers(&strict).unwrap() {
            assert_eq!(center.order(), 1);
            for pair in center {
                assert_eq!(pair.front().index(), center.front().index());
                n_pairs += 1;
                for triplet in pair {
                    assert_eq!(&triplet.atom_indices()[..2], pair.atom_indices());
                    n_triplets += 1;
                }
            }
        }
        assert_eq!(n_pairs, strict.nb_clusters(2));
        assert_eq!(n_triplets, strict.nb_clusters(3));
        assert_eq!(n_pairs, 6);
        // every center sees the other two atoms in either order
        assert_eq!(n_triplets, 6);
    }

    #[test]
    fn test_pair_accessors() {
        let strict = strict_stack(NeighbourListType::Half, 1.0);
        let first = clusters(&strict, 2).unwrap().next().unwrap();
        assert_eq!(first.atom_indices(), &[0, 1]);
        assert_eq!(first.atom_types(), vec![8, 1]);
        assert_eq!(first.atom_type(), 1);
        assert!((first.distance().unwrap() - 0.96).abs() < 1e-12);
        assert!((first.direction().unwrap() - Vec3::x()).norm() < 1e-12);
        assert!(!first.back().is_ghost());

        let center = centers(&strict).unwrap().next().unwrap();
        assert!(matches!(center.distance(), Err(ManagerError::Configuration(_))));
        assert_eq!(center.nb_children(), 2);
    }

    #[test]
    fn test_unsupported_order_and_stale_manager() {
        let strict = strict_stack(NeighbourListType::Half, 1.0);
        assert!(matches!(clusters(&strict, 4), Err(ManagerError::Configuration(_))));
        assert!(matches!(clusters(&strict, 0), Err(ManagerError::Configuration(_))));
        assert!(ClusterRef::new(&strict, 2, 99).is_err());

        let fresh = CentersManager::new(water());
        assert!(matches!(centers(&fresh), Err(ManagerError::Precondition(_))));
    }

    #[test]
    fn test_exact_size() {
        let strict = strict_stack(NeighbourListType::Full, 1.0);
        let iter = clusters(&strict, 2).unwrap();
        assert_eq!(iter.len(), 4);
        let center = ClusterRef::new(&strict, 1, 0).unwrap();
        assert_eq!(center.children().len(), 2);
    }
}
