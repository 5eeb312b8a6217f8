//! Distance calculations for atomic positions

use crate::structure::Vec3;

/// Compute the Euclidean distance between two 3D points
#[inline]
pub fn euclidean_distance(a: &Vec3, b: &Vec3) -> f64 {
    (b - a).norm()
}

/// Compute squared Euclidean distance (faster when only comparing distances)
#[inline]
pub fn euclidean_distance_squared(a: &Vec3, b: &Vec3) -> f64 {
    (b - a).norm_squared()
}

/// Unit vector pointing from `a` to `b`
///
/// Coincident points have no direction; the zero vector is returned.
#[inline]
pub fn unit_direction(a: &Vec3, b: &Vec3) -> Vec3 {
    let d = b - a;
    let r = d.norm();
    if r > 0.0 {
        d / r
    } else {
        Vec3::zeros()
    }
}

/// Largest displacement between two snapshots of the same atoms
///
/// Returns `None` if the snapshots differ in length.
pub fn max_displacement(before: &[Vec3], after: &[Vec3]) -> Option<f64> {
    if before.len() != after.len() {
        return None;
    }

    Some(
        before
            .iter()
            .zip(after)
            .map(|(a, b)| euclidean_distance(a, b))
            .fold(0.0, f64::max),
    )
}

/// All index pairs `(i, j)` with `i < j` closer than `cutoff`, by brute force
///
/// O(N²); used as the reference the binned search is checked against.
pub fn pairs_within_cutoff(positions: &[Vec3], cutoff: f64) -> Vec<(usize, usize)> {
    let cutoff_sq = cutoff * cutoff;
    let n = positions.len();
    let mut pairs = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            if euclidean_distance_squared(&positions[i], &positions[j]) <= cutoff_sq {
                pairs.push((i, j));
            }
        }
    }

    pairs
}
