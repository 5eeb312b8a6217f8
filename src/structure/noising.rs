//! Coordinate noising for data augmentation and neighbour-list reuse checks

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use super::{AtomicStructure, StructureError, Vec3};

/// Gaussian rattle
///
/// Returns a copy of `structure` with i.i.d. Gaussian noise added to every
/// Cartesian coordinate. Cell, periodicity and types are unchanged.
///
/// # Arguments
/// * `structure` - Structure to perturb
/// * `std` - Standard deviation of the Gaussian noise
/// * `seed` - Random seed for reproducibility
pub fn rattle(
    structure: &AtomicStructure,
    std: f64,
    seed: u64,
) -> Result<AtomicStructure, StructureError> {
    if std <= 0.0 {
        return Ok(structure.clone());
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let positions = structure
        .positions()
        .iter()
        .map(|p| {
            let noise = Vec3::from_fn(|_, _| {
                // Box-Muller transform; 1 - u keeps the logarithm finite
                let u1: f64 = 1.0 - rng.gen::<f64>();
                let u2: f64 = rng.gen();
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            });
            p + noise * std
        })
        .collect();

    structure.with_positions(positions)
}
