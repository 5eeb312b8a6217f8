//! Geometry operations on atomic positions
//!
//! Distance helpers and the cell list used for binned neighbour search.

pub mod cell_list;
pub mod distances;

pub use cell_list::CellList;
pub use distances::{euclidean_distance, euclidean_distance_squared, unit_direction};
