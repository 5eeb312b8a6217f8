//! Fractional frame of a (partially) periodic cell
//!
//! Non-periodic axes may carry a zero or arbitrary cell column. They are
//! replaced by unit vectors orthogonal to the periodic lattice vectors so the
//! frame is always invertible; only the periodic components of a fractional
//! coordinate carry lattice meaning.

use nalgebra::Matrix3;

use super::{StructureError, Vec3};

const MIN_NORM: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    basis: Matrix3<f64>,
    inverse: Matrix3<f64>,
    pbc: [bool; 3],
}

impl Lattice {
    pub fn new(cell: &Matrix3<f64>, pbc: [bool; 3]) -> Result<Self, StructureError> {
        let basis = complete_basis(cell, pbc).ok_or(StructureError::SingularCell(pbc))?;
        let inverse = basis
            .try_inverse()
            .ok_or(StructureError::SingularCell(pbc))?;

        Ok(Self {
            basis,
            inverse,
            pbc,
        })
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn basis(&self) -> &Matrix3<f64> {
        &self.basis
    }

    pub fn to_fractional(&self, position: &Vec3) -> Vec3 {
        self.inverse * position
    }

    pub fn to_cartesian(&self, fractional: &Vec3) -> Vec3 {
        self.basis * fractional
    }

    /// Cartesian translation of an integer lattice shift
    pub fn shift_vector(&self, shift: [i32; 3]) -> Vec3 {
        let s = Vec3::new(shift[0] as f64, shift[1] as f64, shift[2] as f64);
        self.basis * s
    }

    /// Distance between consecutive lattice planes along each axis
    ///
    /// A Cartesian displacement of length `r` changes fractional coordinate
    /// `d` by at most `r / width[d]`.
    pub fn perpendicular_widths(&self) -> Vec3 {
        Vec3::from_fn(|d, _| 1.0 / self.inverse.row(d).norm())
    }
}

/// Replace non-periodic columns by unit vectors orthogonal to the periodic ones
fn complete_basis(cell: &Matrix3<f64>, pbc: [bool; 3]) -> Option<Matrix3<f64>> {
    let periodic: Vec<usize> = (0..3).filter(|&d| pbc[d]).collect();
    let free: Vec<usize> = (0..3).filter(|&d| !pbc[d]).collect();
    let mut columns = [
        cell.column(0).into_owned(),
        cell.column(1).into_owned(),
        cell.column(2).into_owned(),
    ];

    match periodic.len() {
        3 => {}
        2 => {
            let normal = columns[periodic[0]]
                .cross(&columns[periodic[1]])
                .try_normalize(MIN_NORM)?;
            columns[free[0]] = normal;
        }
        1 => {
            let a = columns[periodic[0]].try_normalize(MIN_NORM)?;
            // least aligned Cartesian axis keeps the cross product well conditioned
            let helper = (0..3)
                .map(|d| Vec3::ith(d, 1.0))
                .min_by(|x, y| {
                    x.dot(&a)
                        .abs()
                        .partial_cmp(&y.dot(&a).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or_else(Vec3::x);
            let u = a.cross(&helper).try_normalize(MIN_NORM)?;
            let v = a.cross(&u).try_normalize(MIN_NORM)?;
            columns[free[0]] = u;
            columns[free[1]] = v;
        }
        _ => {
            columns = [Vec3::x(), Vec3::y(), Vec3::z()];
        }
    }

    Some(Matrix3::from_columns(&columns))
}
