//! Featurize: structural scaffolding for atomic-environment descriptors
//!
//! Turns an atomic structure (positions, lattice, periodic flags, atom types)
//! into ordered, periodicity-aware clusters of atoms (centers, pairs,
//! triplets) and stores per-cluster values in dense property caches.
//!
//! A typical pipeline stacks a neighbour list and a strict cutoff on top of
//! the atoms:
//!
//! ```ignore
//! use featurize::config::{AdaptorConfig, NeighbourListParams, StrictParams};
//! use featurize::managers::make_manager;
//!
//! let stack = make_manager(structure, &[
//!     AdaptorConfig::NeighbourList(NeighbourListParams::new(3.5)),
//!     AdaptorConfig::Strict(StrictParams::new(3.5)),
//! ])?;
//! for center in stack.centers()? {
//!     for pair in center {
//!         let r = pair.distance()?;
//!     }
//! }
//! ```
//!
//! Logging goes through the `log` facade; install any logger to see build
//! statistics.

pub mod chem;
pub mod config;
pub mod geometry;
pub mod managers;
pub mod structure;

pub use config::{AdaptorConfig, NeighbourListParams, NeighbourListType, StrictParams};
pub use managers::{
    centers, clusters, make_manager, AtomRef, ClusterRef, ManagerError, ManagerStack, Property, PropertyStore,
    SpeciesPartition, StructureManager,
};
pub use structure::{AtomicStructure, StructureError, Vec3};
