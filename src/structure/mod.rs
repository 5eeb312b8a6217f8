//! Core data structures for atomic configurations
//!
//! An `AtomicStructure` is the immutable input of a manager stack: positions,
//! lattice, periodic flags and one integer type per atom. Structures are
//! replaced wholesale on update, never patched in place.

pub mod lattice;
pub mod noising;

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use crate::chem::elements::atomic_number;

pub use lattice::Lattice;

/// Cartesian 3-vector used for positions, shifts and directions
pub type Vec3 = Vector3<f64>;

/// Errors raised while assembling a structure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("Length mismatch: {positions} positions but {types} atom types")]
    LengthMismatch { positions: usize, types: usize },

    #[error("Non-finite coordinate for atom {0}")]
    NonFinitePosition(usize),

    #[error("Non-finite cell matrix")]
    NonFiniteCell,

    #[error("Unknown element symbol: {0}")]
    UnknownElement(String),

    #[error("Cell is singular along the periodic axes {0:?}")]
    SingularCell([bool; 3]),
}

/// Snapshot of an atomic configuration
///
/// The cell stores lattice vectors as *columns*. Columns of non-periodic axes
/// may be zero.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomicStructure {
    positions: Vec<Vec3>,
    cell: Matrix3<f64>,
    pbc: [bool; 3],
    atom_types: Vec<i32>,
}

impl AtomicStructure {
    /// Create a structure, checking that every atom has a type and that all
    /// coordinates are finite.
    pub fn new(
        positions: Vec<Vec3>,
        cell: Matrix3<f64>,
        pbc: [bool; 3],
        atom_types: Vec<i32>,
    ) -> Result<Self, StructureError> {
        if positions.len() != atom_types.len() {
            return Err(StructureError::LengthMismatch {
                positions: positions.len(),
                types: atom_types.len(),
            });
        }

        if let Some(idx) = positions
            .iter()
            .position(|p| !p.iter().all(|x| x.is_finite()))
        {
            return Err(StructureError::NonFinitePosition(idx));
        }

        if !cell.iter().all(|x| x.is_finite()) {
            return Err(StructureError::NonFiniteCell);
        }

        Ok(Self {
            positions,
            cell,
            pbc,
            atom_types,
        })
    }

    /// Build from plain arrays
    ///
    /// # Arguments
    /// * `coords` - (N, 3) Cartesian coordinates
    /// * `lattice` - three lattice vectors, one per row (ASE convention)
    /// * `pbc` - periodicity along each lattice vector
    /// * `atom_types` - one integer type per atom, usually the atomic number
    pub fn from_coords(
        coords: &[[f64; 3]],
        lattice: [[f64; 3]; 3],
        pbc: [bool; 3],
        atom_types: Vec<i32>,
    ) -> Result<Self, StructureError> {
        let positions = coords.iter().map(|c| Vec3::from(*c)).collect();
        let cell = Matrix3::from_columns(&[
            Vec3::from(lattice[0]),
            Vec3::from(lattice[1]),
            Vec3::from(lattice[2]),
        ]);
        Self::new(positions, cell, pbc, atom_types)
    }

    /// Isolated molecule or cluster: zero cell, no periodicity
    pub fn non_periodic(coords: &[[f64; 3]], atom_types: Vec<i32>) -> Result<Self, StructureError> {
        Self::from_coords(coords, [[0.0; 3]; 3], [false; 3], atom_types)
    }

    /// Build from element symbols, using atomic numbers as atom types
    pub fn from_symbols(
        coords: &[[f64; 3]],
        lattice: [[f64; 3]; 3],
        pbc: [bool; 3],
        symbols: &[&str],
    ) -> Result<Self, StructureError> {
        let atom_types = symbols
            .iter()
            .map(|s| atomic_number(s).ok_or_else(|| StructureError::UnknownElement(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_coords(coords, lattice, pbc, atom_types)
    }

    /// Same cell and types, new positions
    pub fn with_positions(&self, positions: Vec<Vec3>) -> Result<Self, StructureError> {
        Self::new(positions, self.cell, self.pbc, self.atom_types.clone())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.positions[index]
    }

    pub fn cell(&self) -> &Matrix3<f64> {
        &self.cell
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    /// True if at least one axis is periodic
    pub fn is_periodic(&self) -> bool {
        self.pbc.iter().any(|&p| p)
    }

    pub fn atom_types(&self) -> &[i32] {
        &self.atom_types
    }

    pub fn atom_type(&self, index: usize) -> i32 {
        self.atom_types[index]
    }

    /// Fractional frame for this cell
    pub fn lattice(&self) -> Result<Lattice, StructureError> {
        Lattice::new(&self.cell, self.pbc)
    }

    /// Copy with positions folded back into the cell along periodic axes
    pub fn wrapped(&self) -> Result<Self, StructureError> {
        if !self.is_periodic() {
            return Ok(self.clone());
        }

        let lattice = self.lattice()?;
        let positions = self
            .positions
            .iter()
            .map(|p| {
                let mut frac = lattice.to_fractional(p);
                for d in 0..3 {
                    if self.pbc[d] {
                        frac[d] -= frac[d].floor();
                    }
                }
                lattice.to_cartesian(&frac)
            })
            .collect();
        self.with_positions(positions)
    }
}
