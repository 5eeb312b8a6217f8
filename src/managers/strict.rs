//! Strict-cutoff adaptor: exact distance filter and triplet lift
//!
//! Keeps the parent pairs whose distance is within the cutoff and publishes
//! their distances and unit directions as properties. Parent triplets are
//! kept only when all three distances pass; without parent triplets and with
//! `max_order = 3`, triplets are built from the retained pairs.

use super::{next_revision, AtomTable, ClusterLayer, ManagerError, Property, StructureManager};
use crate::config::{NeighbourListType, StrictParams};
use crate::geometry::distances::{euclidean_distance, unit_direction};
use crate::structure::{AtomicStructure, Vec3};

/// Name of the pair-distance property published by the adaptor
pub const DISTANCE_PROPERTY: &str = "distance";
/// Name of the pair-direction property published by the adaptor
pub const DIRECTION_PROPERTY: &str = "direction";

pub struct StrictCutoff {
    parent: Box<dyn StructureManager>,
    params: StrictParams,
    stack_depth: usize,
    pairs: ClusterLayer,
    triplets: Option<ClusterLayer>,
    distances: Property<f64>,
    directions: Property<Vec3>,
    revision: u64,
    updated: bool,
}

impl StrictCutoff {
    pub fn new(parent: Box<dyn StructureManager>, params: StrictParams) -> Result<Self, ManagerError> {
        params.validate()?;
        if parent.max_order() < 2 {
            return Err(ManagerError::Configuration(format!(
                "a strict cutoff needs pairs below it, '{}' provides order {}",
                parent.name(),
                parent.max_order()
            )));
        }
        if parent.max_order() > 3 {
            return Err(ManagerError::Configuration(format!(
                "cluster orders above 3 are not supported, '{}' provides order {}",
                parent.name(),
                parent.max_order()
            )));
        }
        if let Some(limit) = parent.interaction_cutoff() {
            if params.cutoff > limit {
                return Err(ManagerError::Configuration(format!(
                    "strict cutoff {} exceeds the neighbour search cutoff {} of '{}'",
                    params.cutoff,
                    limit,
                    parent.name()
                )));
            }
        }

        let stack_depth = parent.stack_depth() + 1;
        Ok(Self {
            parent,
            params,
            stack_depth,
            pairs: ClusterLayer::new(2, stack_depth),
            triplets: None,
            distances: Property::new(DISTANCE_PROPERTY, 2, stack_depth),
            directions: Property::new(DIRECTION_PROPERTY, 2, stack_depth),
            revision: 0,
            updated: false,
        })
    }

    pub fn params(&self) -> &StrictParams {
        &self.params
    }

    pub fn cutoff(&self) -> f64 {
        self.params.cutoff
    }

    fn rebuild(&mut self) -> Result<(), ManagerError> {
        let parent = self.parent.as_ref();
        let atoms = parent.atoms();
        let cutoff = self.params.cutoff;
        let depth = self.stack_depth;

        let parent_pairs = parent.layer(2).ok_or_else(|| {
            ManagerError::Precondition(format!("'{}' has no pairs", parent.name()))
        })?;
        let nb_centers = parent.nb_clusters(1);

        // parent index of every retained pair
        let mut kept = Vec::new();
        let mut pairs = ClusterLayer::new(2, depth);
        let mut distances = Vec::new();
        let mut directions = Vec::new();

        for center in 0..nb_centers {
            for parent_index in parent_pairs.children_of(center) {
                let ij = parent_pairs.cluster_atoms(parent_index);
                let (ri, rj) = (atoms.position(ij[0]), atoms.position(ij[1]));
                let distance = euclidean_distance(&ri, &rj);
                if distance <= cutoff {
                    kept.push(parent_index);
                    pairs.push_cluster(ij);
                    distances.push(distance);
                    directions.push(unit_direction(&ri, &rj));
                }
            }
            pairs.close_parent();
        }

        let triplets = match parent.layer(3) {
            Some(parent_triplets) => Some(filter_triplets(
                atoms,
                parent_triplets,
                &kept,
                cutoff,
                depth,
            )),
            None if self.params.max_order == 3 => {
                let list_type = parent.list_type().unwrap_or_default();
                Some(lift_triplets(atoms, &pairs, nb_centers, list_type, cutoff, depth))
            }
            None => None,
        };

        log::debug!(
            "Strict cutoff {:.4}: kept {} of {} pairs{}",
            cutoff,
            pairs.len(),
            parent_pairs.len(),
            match &triplets {
                Some(t) => format!(", {} triplets", t.len()),
                None => String::new(),
            }
        );

        let revision = next_revision();
        self.distances = Property::from_values(DISTANCE_PROPERTY, 2, depth, distances, revision);
        self.directions = Property::from_values(DIRECTION_PROPERTY, 2, depth, directions, revision);
        self.pairs = pairs;
        self.triplets = triplets;
        self.revision = revision;
        Ok(())
    }
}

/// Keep parent triplets whose parent pair survived and whose three
/// distances are within the cutoff
fn filter_triplets(
    atoms: &AtomTable,
    parent_triplets: &ClusterLayer,
    kept: &[usize],
    cutoff: f64,
    depth: usize,
) -> ClusterLayer {
    let mut triplets = ClusterLayer::new(3, depth);
    for &parent_index in kept {
        for t in parent_triplets.children_of(parent_index) {
            let ijk = parent_triplets.cluster_atoms(t);
            let within = |a: usize, b: usize| {
                euclidean_distance(&atoms.position(ijk[a]), &atoms.position(ijk[b])) <= cutoff
            };
            if within(0, 1) && within(0, 2) && within(1, 2) {
                triplets.push_cluster(ijk);
            }
        }
        triplets.close_parent();
    }
    triplets
}

/// Triplets (i, j, k) from two retained pairs (i, j), (i, k) of the same
/// center with |r_jk| within the cutoff
fn lift_triplets(
    atoms: &AtomTable,
    pairs: &ClusterLayer,
    nb_centers: usize,
    list_type: NeighbourListType,
    cutoff: f64,
    depth: usize,
) -> ClusterLayer {
    let mut triplets = ClusterLayer::new(3, depth);

    for center in 0..nb_centers {
        let range = pairs.children_of(center);
        for p in range.clone() {
            let ij = pairs.cluster_atoms(p);
            let (i, j) = (ij[0], ij[1]);
            let rj = atoms.position(j);
            let key_j = atoms.sort_key(j);

            for q in range.clone() {
                let k = pairs.cluster_atoms(q)[1];
                if k == j {
                    continue;
                }
                if list_type == NeighbourListType::Half && atoms.sort_key(k) <= key_j {
                    continue;
                }
                if euclidean_distance(&rj, &atoms.position(k)) <= cutoff {
                    triplets.push_cluster(&[i, j, k]);
                }
            }
            triplets.close_parent();
        }
    }
    triplets
}

impl StructureManager for StrictCutoff {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn update(&mut self, structure: Option<AtomicStructure>) -> Result<(), ManagerError> {
        self.updated = false;
        self.parent.update(structure)?;

        // checked against the interaction cutoff in `new`, which bounds the search radius from below
        debug_assert!(self
            .parent
            .search_radius()
            .map_or(true, |radius| self.params.cutoff <= radius));

        self.rebuild()?;
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
        if self.parent.max_order() >= 3 || self.params.max_order == 3 {
            3
        } else {
            2
        }
    }

    fn structure(&self) -> &AtomicStructure {
        self.parent.structure()
    }

    fn atoms(&self) -> &AtomTable {
        self.parent.atoms()
    }

    fn layer(&self, order: usize) -> Option<&ClusterLayer> {
        match order {
            1 => self.parent.layer(1),
            2 => Some(&self.pairs),
            3 => self.triplets.as_ref(),
            _ => None,
        }
    }

    fn search_radius(&self) -> Option<f64> {
        self.parent.search_radius()
    }

    fn interaction_cutoff(&self) -> Option<f64> {
        Some(self.params.cutoff)
    }

    fn list_type(&self) -> Option<NeighbourListType> {
        self.parent.list_type()
    }

    fn pair_distances(&self) -> Option<&Property<f64>> {
        Some(&self.distances)
    }

    fn pair_directions(&self) -> Option<&Property<Vec3>> {
        Some(&self.directions)
    }
}
