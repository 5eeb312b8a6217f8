//! Base manager: atoms as order-1 clusters

use super::{next_revision, AtomTable, ClusterLayer, ManagerError, StructureManager};
use crate::structure::AtomicStructure;

/// Bottom of every stack
///
/// Owns the structure and exposes each atom as a center. Ghost atoms never
/// appear here.
#[derive(Debug, Clone)]
pub struct CentersManager {
    structure: AtomicStructure,
    atoms: AtomTable,
    centers: ClusterLayer,
    revision: u64,
    updated: bool,
}

impl CentersManager {
    /// Wrap a structure; call `update` before reading clusters
    pub fn new(structure: AtomicStructure) -> Self {
        Self {
            structure,
            atoms: AtomTable::default(),
            centers: ClusterLayer::new(1, 0),
            revision: 0,
            updated: false,
        }
    }

    fn rebuild(&mut self) {
        if self.structure.is_empty() {
            log::warn!("Updating a manager with an empty structure");
        }

        self.atoms = AtomTable::from_structure(&self.structure);
        let mut centers = ClusterLayer::new(1, 0);
        for idx in 0..self.structure.len() {
            centers.push_cluster(&[idx]);
        }
        centers.close_parent();
        self.centers = centers;
        self.revision = next_revision();
        self.updated = true;

        log::trace!("Centers rebuilt: {} atoms", self.structure.len());
    }
}

impl StructureManager for CentersManager {
    fn name(&self) -> &'static str {
        "centers"
    }

    fn update(&mut self, structure: Option<AtomicStructure>) -> Result<(), ManagerError> {
        if let Some(structure) = structure {
            self.structure = structure;
        }
        self.rebuild();
        Ok(())
    }

    fn is_updated(&self) -> bool {
        self.updated
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn stack_depth(&self) -> usize {
        0
    }

    fn max_order(&self) -> usize {
        1
    }

    fn structure(&self) -> &AtomicStructure {
        &self.structure
    }

    fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    fn layer(&self, order: usize) -> Option<&ClusterLayer> {
        (order == 1).then_some(&self.centers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::centers;

    #[test]
    fn test_centers_follow_structure() {
        let s = AtomicStructure::non_periodic(&[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]], vec![6, 8]).unwrap();
        let mut manager = CentersManager::new(s);
        assert!(!manager.is_updated());
        manager.update(None).unwrap();

        assert_eq!(manager.size(), 2);
        assert_eq!(manager.nb_clusters(2), 0);
        assert_eq!(manager.cluster_depth(1), Some(0));

        let types: Vec<i32> = centers(&manager).unwrap().map(|c| c.atom_type()).collect();
        assert_eq!(types, vec![6, 8]);
        let last = centers(&manager).unwrap().last().unwrap();
        assert_eq!(last.position(), crate::structure::Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(last.nb_children(), 0);
    }

    #[test]
    fn test_update_replaces_structure_and_revision() {
        let s = AtomicStructure::non_periodic(&[[0.0; 3]], vec![1]).unwrap();
        let mut manager = CentersManager::new(s);
        manager.update(None).unwrap();
        let first = manager.revision();

        let bigger = AtomicStructure::non_periodic(&[[0.0; 3], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]], vec![1, 1, 1])
            .unwrap();
        manager.update(Some(bigger)).unwrap();
        assert_eq!(manager.size(), 3);
        assert!(manager.revision() > first);
    }

    #[test]
    fn test_empty_structure() {
        let s = AtomicStructure::non_periodic(&[], vec![]).unwrap();
        let mut manager = CentersManager::new(s);
        manager.update(None).unwrap();
        assert_eq!(manager.size(), 0);
        assert_eq!(centers(&manager).unwrap().count(), 0);
    }
}
