//! Grouping of clusters by species combination

use std::collections::BTreeMap;

use super::{clusters, ClusterRef, ManagerError, StructureManager};

/// Global indices of the clusters of one order, keyed by their ordered
/// tuple of atom types
///
/// Bound to the manager revision it was built from; `refresh` rebuilds it
/// after an update.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesPartition {
    order: usize,
    revision: u64,
    groups: BTreeMap<Vec<i32>, Vec<usize>>,
}

impl SpeciesPartition {
    pub fn new(manager: &dyn StructureManager, order: usize) -> Result<Self, ManagerError> {
        let mut groups: BTreeMap<Vec<i32>, Vec<usize>> = BTreeMap::new();
        for cluster in clusters(manager, order)? {
            groups
                .entry(cluster.atom_types())
                .or_default()
                .push(cluster.global_index());
        }

        log::trace!(
            "Order-{} clusters split into {} species combinations",
            order,
            groups.len()
        );

        Ok(Self {
            order,
            revision: manager.revision(),
            groups,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of distinct species combinations
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// True if built from the manager's current update
    pub fn is_current(&self, manager: &dyn StructureManager) -> bool {
        manager.is_updated() && manager.revision() == self.revision
    }

    /// Rebuild if the manager was updated since
    pub fn refresh(&mut self, manager: &dyn StructureManager) -> Result<(), ManagerError> {
        if !self.is_current(manager) {
            *self = Self::new(manager, self.order)?;
        }
        Ok(())
    }

    /// Global indices of the clusters with exactly these species, in order
    pub fn get(&self, species: &[i32]) -> Option<&[usize]> {
        self.groups.get(species).map(Vec::as_slice)
    }

    /// Species combinations present, sorted
    pub fn combinations(&self) -> impl Iterator<Item = &[i32]> {
        self.groups.keys().map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[i32], &[usize])> {
        self.groups.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Cluster handles for one species combination
    pub fn clusters<'a>(
        &self,
        manager: &'a dyn StructureManager,
        species: &[i32],
    ) -> Result<Vec<ClusterRef<'a>>, ManagerError> {
        if !self.is_current(manager) {
            return Err(ManagerError::Precondition(
                "species partition was built for a previous update".to_string(),
            ));
        }
        self.get(species)
            .unwrap_or(&[])
            .iter()
            .map(|&index| ClusterRef::new(manager, self.order, index))
            .collect()
    }
}
